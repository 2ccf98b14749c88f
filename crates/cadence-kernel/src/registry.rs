//! The sound registry.
//!
//! [`SoundRegistry`] owns the alias table, the context graph, the instance
//! pool and the fades list. It is the only thing that talks to the native
//! backend, the asset loader and the tick source. Asynchronous work comes
//! back in as events:
//!
//! - loader progress through [`SoundRegistry::handle_load_event`],
//! - native completions through [`SoundRegistry::poll_channels`],
//! - frame time through [`SoundRegistry::tick`],
//! - user gestures through [`SoundRegistry::handle_user_gesture`].
//!
//! One registry may be alive per thread. [`SoundRegistry::init`] refuses to
//! build a second one until the first is destroyed or dropped.

use std::cell::Cell;
use std::fmt;
use std::path::PathBuf;

use ahash::AHashMap;
use cadence_common::{BatchId, ChannelId, InstanceHandle, SoundError, SoundResult};
use tracing::{debug, error, info, trace, warn};

use crate::backend::{AudioBackend, PlatformCapabilities, StartParams};
use crate::config::{ContextConfig, RegistryConfig, DEFAULT_FADE_DURATION_MS};
use crate::context::{ContextGraph, SoundContext};
use crate::definition::{LoadState, SoundDefinition};
use crate::fade::{FadeOutcome, FadeParams, FadeScheduler, FadeState, FadeTarget};
use crate::guard::{GestureResponse, PlatformAudioGuard, SoundEvent};
use crate::instance::{InstancePool, PlaybackInstance};
use crate::loader::{AssetLoader, LoadBatch, LoadEvent, LoadRequest};
use crate::options::{Callback, PlayOptions};
use crate::tick::{Clock, SystemClock, TickSource};

thread_local! {
    static REGISTRY_ALIVE: Cell<bool> = const { Cell::new(false) };
}

fn fire(callback: Option<Callback>) {
    if let Some(callback) = callback {
        callback();
    }
}

/// Central sound registry.
pub struct SoundRegistry<B: AudioBackend, L: AssetLoader, T: TickSource> {
    config: RegistryConfig,

    // === Collaborators ===
    backend: B,
    loader: L,
    ticker: T,
    clock: Box<dyn Clock>,

    // === Platform ===
    capabilities: PlatformCapabilities,
    /// Extension appended to every source path.
    extension: Option<String>,
    guard: PlatformAudioGuard,
    events: Vec<SoundEvent>,
    muted: bool,

    // === Sounds ===
    sounds: AHashMap<String, SoundDefinition>,
    contexts: ContextGraph,
    pool: InstancePool,
    fades: FadeScheduler,
    /// Routes native completions back to their instance.
    channels: AHashMap<ChannelId, InstanceHandle>,
    /// Preload callbacks waiting for their batch to finish.
    batch_callbacks: AHashMap<BatchId, Callback>,
    next_batch: BatchId,
}

impl<B: AudioBackend, L: AssetLoader, T: TickSource> fmt::Debug for SoundRegistry<B, L, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundRegistry")
            .field("sounds", &self.sounds.len())
            .field("contexts", &self.contexts.len())
            .field("instances_in_use", &self.pool.in_use())
            .field("fades", &self.fades.len())
            .field("extension", &self.extension)
            .field("capabilities", &self.capabilities)
            .field("muted", &self.muted)
            .finish_non_exhaustive()
    }
}

impl<B: AudioBackend, L: AssetLoader, T: TickSource> Drop for SoundRegistry<B, L, T> {
    fn drop(&mut self) {
        REGISTRY_ALIVE.with(|alive| alive.set(false));
    }
}

impl<B: AudioBackend, L: AssetLoader, T: TickSource> SoundRegistry<B, L, T> {
    /// Create the registry using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::AlreadyInitialized`] if a registry is already
    /// alive on this thread.
    pub fn init(config: RegistryConfig, backend: B, loader: L, ticker: T) -> SoundResult<Self> {
        Self::init_with_clock(config, backend, loader, ticker, Box::new(SystemClock::new()))
    }

    /// Create the registry with an explicit clock.
    ///
    /// Probes the backend's capabilities, picks the first preferred file type
    /// it supports and sets up the platform guard.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::AlreadyInitialized`] if a registry is already
    /// alive on this thread.
    pub fn init_with_clock(
        config: RegistryConfig,
        backend: B,
        loader: L,
        ticker: T,
        clock: Box<dyn Clock>,
    ) -> SoundResult<Self> {
        if REGISTRY_ALIVE.with(|alive| alive.replace(true)) {
            warn!("Sound registry already initialized on this thread");
            return Err(SoundError::AlreadyInitialized);
        }

        let capabilities = backend.capabilities();
        let (extension, guard) = if capabilities.available {
            let extension = config
                .preferred_types
                .iter()
                .find(|ext| backend.supports_type(ext.as_str()))
                .cloned();
            if extension.is_none() {
                warn!("None of the preferred file types {:?} is supported", config.preferred_types);
            }
            let guard = PlatformAudioGuard::new(
                capabilities,
                backend.is_running(),
                config.stale_context_threshold_ms,
                config.prevent_default_on_unmute,
                clock.now_ms(),
            );
            (extension, guard)
        } else {
            warn!("No native audio backend available; sound is disabled");
            (None, PlatformAudioGuard::inactive())
        };

        info!(
            "Sound registry initialized (file type: {})",
            extension.as_deref().unwrap_or("none")
        );

        Ok(Self {
            pool: InstancePool::with_capacity(config.pool_capacity),
            config,
            backend,
            loader,
            ticker,
            clock,
            capabilities,
            extension,
            guard,
            events: Vec::new(),
            muted: false,
            sounds: AHashMap::new(),
            contexts: ContextGraph::new(),
            fades: FadeScheduler::new(),
            channels: AHashMap::new(),
            batch_callbacks: AHashMap::new(),
            next_batch: BatchId::new(1),
        })
    }

    /// Stop everything, release every loaded source and free the
    /// per-thread registry slot.
    pub fn destroy(mut self) {
        info!("Destroying sound registry");
        self.stop_all();
        self.fades.clear(&mut self.ticker);
        self.batch_callbacks.clear();
        self.channels.clear();
        self.backend.remove_all_sources();
        for def in self.sounds.values_mut() {
            def.load_state = LoadState::Unloaded;
        }
    }

    // ============================================
    // Registration
    // ============================================

    /// Register a batch of sounds.
    ///
    /// Existing aliases are updated in place: their settings change while
    /// their load state and instances are kept. Sounds flagged for preload
    /// are submitted right away.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::Misconfigured`] when the config lists no sounds
    /// or an entry has no id. Valid entries are still registered.
    pub fn register_context(&mut self, config: ContextConfig) -> SoundResult<()> {
        if config.sounds.is_empty() {
            warn!("Ignoring sound registration without sounds");
            return Err(SoundError::Misconfigured("no sounds listed".to_string()));
        }

        let base = config.path.unwrap_or_default();
        let mut to_preload = Vec::new();
        let mut result = Ok(());

        for entry in config.sounds {
            let settings = entry.into_settings();
            if settings.id.is_empty() {
                warn!("Skipping sound entry without an id");
                result = Err(SoundError::Misconfigured("sound entry without an id".to_string()));
                continue;
            }

            let context = settings.context.clone().or_else(|| config.context.clone());
            let source_path = self.source_path_for(&base, settings.src.as_deref().unwrap_or(&settings.id));
            debug!("Registered sound '{}' -> {}", settings.id, source_path.display());

            let def = self
                .sounds
                .entry(settings.id.clone())
                .or_insert_with(|| SoundDefinition::new(settings.id.as_str(), PathBuf::new()));
            def.source_path = source_path;
            def.default_volume = settings.volume.unwrap_or(1.0).clamp(0.0, 1.0);
            def.default_loop = settings.looping.unwrap_or(false);

            let previous = std::mem::replace(&mut def.context, context.clone());
            if let Some(previous) = previous.filter(|prev| Some(prev) != context.as_ref()) {
                if let Some(old) = self.contexts.get_mut(&previous) {
                    old.remove_member(&settings.id);
                }
            }
            if let Some(name) = &context {
                self.contexts.get_or_create(name).add_member(&settings.id);
            }

            if config.preload || settings.preload.unwrap_or(false) {
                to_preload.push(settings.id);
            }
        }

        if !to_preload.is_empty() {
            if let Err(err) = self.preload(to_preload.as_slice(), None) {
                debug!("Registration preload incomplete: {}", err);
            }
        }
        result
    }

    /// Link `children` under `parent`, creating `parent` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::ContextCycle`] if a child would become its own
    /// ancestor. The other children are still linked.
    pub fn link_contexts<S: AsRef<str>>(&mut self, parent: &str, children: &[S]) -> SoundResult<()> {
        self.contexts.link(parent, children)
    }

    fn source_path_for(&self, base: &str, src: &str) -> PathBuf {
        let mut path = format!("{base}{src}");
        if let Some(ext) = &self.extension {
            path.push('.');
            path.push_str(ext);
        }
        PathBuf::from(path)
    }

    // ============================================
    // Playback
    // ============================================

    /// Play a sound.
    ///
    /// A loaded sound starts immediately. Otherwise the returned instance is
    /// pending: it starts once the load completes, and the first such request
    /// submits the load.
    ///
    /// # Errors
    ///
    /// - [`SoundError::Unsupported`] when there is no native backend.
    /// - [`SoundError::UnknownAlias`] when nothing is registered as `alias`.
    /// - [`SoundError::StartFailed`] when the backend refused to start.
    ///
    /// In every error case `on_complete` has already been called.
    pub fn play(&mut self, alias: &str, options: PlayOptions) -> SoundResult<InstanceHandle> {
        if !self.capabilities.available {
            debug!("Ignoring play of '{}': audio unsupported", alias);
            fire(options.on_complete);
            return Err(SoundError::Unsupported);
        }
        let Some(def) = self.sounds.get(alias) else {
            warn!("Cannot play unknown sound '{}'", alias);
            fire(options.on_complete);
            return Err(SoundError::UnknownAlias(alias.to_string()));
        };

        let load_state = def.load_state;
        let params = StartParams {
            interrupt: options.interrupt,
            delay_ms: options.delay_ms,
            offset_ms: options.offset_ms,
            loop_count: options.loop_count(def.default_loop),
            volume: options.volume.unwrap_or(def.default_volume).clamp(0.0, 1.0),
            pan: options.pan.clamp(-1.0, 1.0),
        };

        let handle = self.pool.acquire(None, alias, 0);
        if let Some(inst) = self.pool.get_mut(handle) {
            inst.current_volume = params.volume;
            inst.pan = params.pan;
            inst.on_complete = options.on_complete;
            inst.on_start = options.on_start;
        }

        match load_state {
            LoadState::Loaded => self.start_now(alias, handle, params),
            LoadState::Unloaded | LoadState::Loading => {
                if let Some(inst) = self.pool.get_mut(handle) {
                    inst.deferred = Some(params);
                }
                if let Some(def) = self.sounds.get_mut(alias) {
                    def.pending.push(handle);
                    def.play_after_load = true;
                }
                debug!("Queued '{}' until it loads", alias);

                if load_state == LoadState::Unloaded {
                    if let Err(err) = self.preload(&[alias], None) {
                        debug!("Preload for '{}' failed: {}", alias, err);
                    }
                }
                Ok(handle)
            },
        }
    }

    /// Stop every active instance of `alias` and drop its pending ones.
    ///
    /// Stopping does not call `on_complete`.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnknownAlias`] for an unregistered alias.
    pub fn stop(&mut self, alias: &str) -> SoundResult<()> {
        if !self.sounds.contains_key(alias) {
            warn!("Cannot stop unknown sound '{}'", alias);
            return Err(SoundError::UnknownAlias(alias.to_string()));
        }
        self.stop_definition(alias);
        Ok(())
    }

    /// Stop every registered sound.
    pub fn stop_all(&mut self) {
        debug!("Stopping all sounds");
        for alias in self.alias_list() {
            self.stop_definition(&alias);
        }
    }

    fn stop_definition(&mut self, alias: &str) {
        let Some(def) = self.sounds.get_mut(alias) else {
            return;
        };
        def.play_after_load = false;
        let handles = def.all_instances();
        if !handles.is_empty() {
            debug!("Stopping {} instance(s) of '{}'", handles.len(), alias);
        }
        for handle in handles.into_iter().rev() {
            self.halt(handle);
        }
    }

    /// Start the native channel for an acquired instance and activate it.
    fn start_now(&mut self, alias: &str, handle: InstanceHandle, params: StartParams) -> SoundResult<InstanceHandle> {
        if !self.launch(alias, handle, params) {
            let on_complete = self.pool.get_mut(handle).and_then(|inst| inst.on_complete.take());
            self.pool.release(handle);
            fire(on_complete);
            return Err(SoundError::StartFailed(alias.to_string()));
        }

        let length_ms = self.pool.get(handle).map_or(0, PlaybackInstance::length_ms);
        if let Some(def) = self.sounds.get_mut(alias) {
            def.active.push(handle);
            if def.cached_duration_ms.is_none() {
                def.cached_duration_ms = Some(length_ms);
            }
        }

        let on_start = self.pool.get_mut(handle).and_then(|inst| inst.on_start.take());
        fire(on_start);
        Ok(handle)
    }

    fn launch(&mut self, alias: &str, handle: InstanceHandle, params: StartParams) -> bool {
        let now = self.clock.now_ms();
        self.guard.recover_if_stale(now, &mut self.backend);

        let factor = self.factor_for_alias(alias);
        let Some(inst) = self.pool.get(handle) else {
            return false;
        };
        let native = StartParams {
            volume: inst.current_volume * factor,
            pan: inst.pan,
            ..params
        };

        let Some(channel) = self.backend.play(alias, &native) else {
            error!("Native playback failed to start for '{}'", alias);
            return false;
        };

        let length_ms = self.backend.channel_duration_ms(channel);
        if let Some(inst) = self.pool.get_mut(handle) {
            inst.set_channel(channel, length_ms);
        }
        self.channels.insert(channel, handle);
        self.guard.note_started();
        trace!("Started '{}' on channel {}", alias, channel.raw());
        true
    }

    /// Stop and release one instance without calling `on_complete`.
    fn halt(&mut self, handle: InstanceHandle) -> bool {
        let Some(inst) = self.pool.get(handle) else {
            return false;
        };
        let channel = inst.channel();
        let paused = inst.paused;
        let alias = inst.alias().map(str::to_string);

        if let Some(channel) = channel {
            self.backend.stop(channel);
            self.channels.remove(&channel);
            if !paused {
                let now = self.clock.now_ms();
                self.guard.note_stopped(now);
            }
        }
        if let Some(def) = alias.as_deref().and_then(|alias| self.sounds.get_mut(alias)) {
            def.forget(handle);
        }
        self.fades.untrack(handle, &mut self.ticker);
        self.pool.release(handle)
    }

    // ============================================
    // Pause / Resume
    // ============================================

    /// Pause every instance of `alias`, playing or pending.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnknownAlias`] for an unregistered alias.
    pub fn pause(&mut self, alias: &str) -> SoundResult<()> {
        self.pause_scoped(alias, false)
    }

    /// Resume instances of `alias` paused individually.
    ///
    /// Instances paused by [`pause_all`](Self::pause_all) stay paused.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnknownAlias`] for an unregistered alias.
    pub fn resume(&mut self, alias: &str) -> SoundResult<()> {
        self.resume_scoped(alias, false)
    }

    /// Pause every sound, marking the pause as global.
    pub fn pause_all(&mut self) {
        debug!("Pausing all sounds");
        for handles in self.instances_by_sound() {
            self.pause_instances(handles, true);
        }
    }

    /// Resume the instances paused by [`pause_all`](Self::pause_all).
    pub fn resume_all(&mut self) {
        debug!("Resuming all sounds");
        for handles in self.instances_by_sound() {
            self.resume_instances(handles, true);
        }
    }

    fn pause_scoped(&mut self, alias: &str, global: bool) -> SoundResult<()> {
        let Some(def) = self.sounds.get(alias) else {
            warn!("Cannot pause unknown sound '{}'", alias);
            return Err(SoundError::UnknownAlias(alias.to_string()));
        };
        let handles = def.all_instances();
        self.pause_instances(handles, global);
        Ok(())
    }

    fn resume_scoped(&mut self, alias: &str, global: bool) -> SoundResult<()> {
        let Some(def) = self.sounds.get(alias) else {
            warn!("Cannot resume unknown sound '{}'", alias);
            return Err(SoundError::UnknownAlias(alias.to_string()));
        };
        let handles = def.all_instances();
        self.resume_instances(handles, global);
        Ok(())
    }

    /// Instances of every sound, one list per sound.
    fn instances_by_sound(&self) -> Vec<Vec<InstanceHandle>> {
        self.sounds.values().map(SoundDefinition::all_instances).collect()
    }

    fn pause_instances(&mut self, handles: Vec<InstanceHandle>, global: bool) {
        for handle in handles.into_iter().rev() {
            if self.pause_handle(handle) {
                if let Some(inst) = self.pool.get_mut(handle) {
                    inst.globally_paused = global;
                }
            }
        }
    }

    fn resume_instances(&mut self, handles: Vec<InstanceHandle>, global: bool) {
        for handle in handles.into_iter().rev() {
            let matches = self
                .pool
                .get(handle)
                .is_some_and(|inst| inst.paused && inst.globally_paused == global);
            if matches {
                self.resume_handle(handle);
            }
        }
    }

    /// Pause one instance. Returns whether it was playing.
    fn pause_handle(&mut self, handle: InstanceHandle) -> bool {
        let Some(inst) = self.pool.get_mut(handle) else {
            return false;
        };
        if inst.paused {
            return false;
        }
        inst.paused = true;
        if let Some(channel) = inst.channel() {
            self.backend.pause(channel);
            let now = self.clock.now_ms();
            self.guard.note_stopped(now);
        }
        true
    }

    /// Resume one instance. Returns whether it was paused.
    fn resume_handle(&mut self, handle: InstanceHandle) -> bool {
        let Some(inst) = self.pool.get_mut(handle) else {
            return false;
        };
        if !inst.paused {
            return false;
        }
        inst.paused = false;
        inst.globally_paused = false;
        if let Some(channel) = inst.channel() {
            let now = self.clock.now_ms();
            self.guard.recover_if_stale(now, &mut self.backend);
            self.backend.resume(channel);
            self.guard.note_started();
        }
        true
    }

    // ============================================
    // Contexts
    // ============================================

    /// Pause every member of `name` and of its linked sub-contexts.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnknownContext`] for an unknown context.
    pub fn pause_context(&mut self, name: &str) -> SoundResult<()> {
        self.require_context(name)?;
        debug!("Pausing context '{}'", name);
        for handle in self.context_instances(name) {
            self.pause_handle(handle);
        }
        Ok(())
    }

    /// Resume every member of `name` and of its linked sub-contexts.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnknownContext`] for an unknown context.
    pub fn resume_context(&mut self, name: &str) -> SoundResult<()> {
        self.require_context(name)?;
        debug!("Resuming context '{}'", name);
        for handle in self.context_instances(name) {
            self.resume_handle(handle);
        }
        Ok(())
    }

    /// Stop every member of `name` and of its linked sub-contexts.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnknownContext`] for an unknown context.
    pub fn stop_context(&mut self, name: &str) -> SoundResult<()> {
        self.require_context(name)?;
        debug!("Stopping context '{}'", name);
        for alias in self.context_members(name) {
            self.stop_definition(&alias);
        }
        Ok(())
    }

    /// Mute or unmute `name` and every linked sub-context.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnknownContext`] for an unknown context.
    pub fn set_context_mute(&mut self, name: &str, muted: bool) -> SoundResult<()> {
        self.require_context(name)?;
        debug!("Setting context '{}' muted={}", name, muted);
        for context in self.contexts.walk(name) {
            if let Some(context) = self.contexts.get_mut(&context) {
                context.set_muted(muted);
            }
        }
        for handle in self.context_instances(name) {
            self.apply_volume(handle);
        }
        Ok(())
    }

    /// Set the volume multiplier of `name`.
    ///
    /// Only the context's direct members are affected; sub-contexts keep
    /// their own multiplier.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnknownContext`] for an unknown context.
    pub fn set_context_volume(&mut self, name: &str, volume: f32) -> SoundResult<()> {
        let Some(context) = self.contexts.get_mut(name) else {
            warn!("Unknown sound context '{}'", name);
            return Err(SoundError::UnknownContext(name.to_string()));
        };
        context.set_volume(volume);
        debug!("Set context '{}' volume to {:.2}", name, context.volume());

        let handles: Vec<InstanceHandle> = context
            .members()
            .iter()
            .filter_map(|alias| self.sounds.get(alias))
            .flat_map(|def| def.active.iter().copied())
            .collect();
        for handle in handles {
            self.apply_volume(handle);
        }
        Ok(())
    }

    fn require_context(&self, name: &str) -> SoundResult<()> {
        if self.contexts.contains(name) {
            Ok(())
        } else {
            warn!("Unknown sound context '{}'", name);
            Err(SoundError::UnknownContext(name.to_string()))
        }
    }

    /// Member aliases of `name` and its sub-contexts, each listed once.
    fn context_members(&self, name: &str) -> Vec<String> {
        let mut aliases: Vec<String> = Vec::new();
        for context in self.contexts.walk(name) {
            let Some(context) = self.contexts.get(&context) else {
                continue;
            };
            for alias in context.members() {
                if !aliases.contains(alias) {
                    aliases.push(alias.clone());
                }
            }
        }
        aliases
    }

    fn context_instances(&self, name: &str) -> Vec<InstanceHandle> {
        self.context_members(name)
            .iter()
            .filter_map(|alias| self.sounds.get(alias))
            .flat_map(SoundDefinition::all_instances)
            .collect()
    }

    fn factor_for_alias(&self, alias: &str) -> f32 {
        let context = self.sounds.get(alias).and_then(|def| def.context.as_deref());
        self.contexts.factor_for(context)
    }

    /// Push an instance's effective volume to its channel.
    fn apply_volume(&mut self, handle: InstanceHandle) {
        let Some(volume) = self.effective_volume(handle) else {
            return;
        };
        if let Some(channel) = self.pool.get(handle).and_then(PlaybackInstance::channel) {
            self.backend.set_volume(channel, volume);
        }
    }

    // ============================================
    // Loading
    // ============================================

    /// Load every listed alias that is still unloaded.
    ///
    /// `on_complete` runs once the whole batch has been reported, or right
    /// away when nothing needed loading.
    ///
    /// # Errors
    ///
    /// - [`SoundError::Unsupported`] when there is no native backend;
    ///   `on_complete` has been called.
    /// - [`SoundError::UnknownAlias`] naming the first unregistered alias.
    ///   The known aliases are still submitted.
    pub fn preload<S: AsRef<str>>(&mut self, aliases: &[S], on_complete: Option<Callback>) -> SoundResult<()> {
        if !self.capabilities.available {
            debug!("Ignoring preload: audio unsupported");
            fire(on_complete);
            return Err(SoundError::Unsupported);
        }

        let mut items = Vec::new();
        let mut unknown = None;
        for alias in aliases {
            let alias = alias.as_ref();
            match self.sounds.get_mut(alias) {
                None => {
                    warn!("Cannot preload unknown sound '{}'", alias);
                    unknown.get_or_insert_with(|| alias.to_string());
                },
                Some(def) if def.load_state == LoadState::Unloaded => {
                    def.load_state = LoadState::Loading;
                    items.push(LoadRequest {
                        alias: alias.to_string(),
                        source_path: def.source_path.clone(),
                    });
                },
                Some(_) => {},
            }
        }

        if items.is_empty() {
            trace!("Nothing to preload");
            fire(on_complete);
        } else {
            let id = self.next_batch;
            self.next_batch = id.next();
            if let Some(callback) = on_complete {
                self.batch_callbacks.insert(id, callback);
            }
            debug!("Submitting load batch {} with {} sound(s)", id.raw(), items.len());
            self.loader.submit(LoadBatch { id, items });
        }

        unknown.map_or(Ok(()), |alias| Err(SoundError::UnknownAlias(alias)))
    }

    /// Feed one loader event back into the registry.
    pub fn handle_load_event(&mut self, event: LoadEvent) {
        match event {
            LoadEvent::Loaded { alias, .. } => self.mark_loaded(&alias),
            LoadEvent::Failed { alias, reason, .. } => self.mark_failed(&alias, &reason),
            LoadEvent::BatchComplete { batch } => {
                if let Some(callback) = self.batch_callbacks.remove(&batch) {
                    debug!("Load batch {} complete", batch.raw());
                    callback();
                }
            },
        }
    }

    fn mark_loaded(&mut self, alias: &str) {
        let Some(def) = self.sounds.get_mut(alias) else {
            warn!("Load completed for unknown sound '{}'", alias);
            return;
        };
        if def.load_state == LoadState::Unloaded {
            debug!("Discarding load of '{}': unloaded while loading", alias);
            self.backend.remove_source(alias);
            return;
        }

        def.load_state = LoadState::Loaded;
        let pending = std::mem::take(&mut def.pending);
        let play = std::mem::replace(&mut def.play_after_load, false);
        debug!("Loaded '{}' ({} waiting)", alias, pending.len());

        for handle in pending {
            if play {
                self.start_deferred(alias, handle);
            } else {
                self.pool.release(handle);
            }
        }
    }

    fn start_deferred(&mut self, alias: &str, handle: InstanceHandle) {
        let Some(inst) = self.pool.get_mut(handle) else {
            return;
        };
        let params = inst.deferred.take().unwrap_or_default();
        let paused = inst.paused;

        if self.start_now(alias, handle, params).is_err() {
            return;
        }
        if paused {
            if let Some(channel) = self.pool.get(handle).and_then(PlaybackInstance::channel) {
                self.backend.pause(channel);
                let now = self.clock.now_ms();
                self.guard.note_stopped(now);
            }
        }
    }

    fn mark_failed(&mut self, alias: &str, reason: &str) {
        let Some(def) = self.sounds.get_mut(alias) else {
            warn!("Load failed for unknown sound '{}': {}", alias, reason);
            return;
        };
        warn!("{}", SoundError::LoadFailed {
            alias: alias.to_string(),
            reason: reason.to_string(),
        });

        def.load_state = LoadState::Unloaded;
        def.play_after_load = false;
        let pending = std::mem::take(&mut def.pending);
        for handle in pending {
            let on_complete = self.pool.get_mut(handle).and_then(|inst| inst.on_complete.take());
            self.pool.release(handle);
            fire(on_complete);
        }
    }

    /// Stop and unload the listed aliases. Aliases already unloaded and idle
    /// are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::UnknownAlias`] naming the last unregistered
    /// alias. The known aliases are still unloaded.
    pub fn unload<S: AsRef<str>>(&mut self, aliases: &[S]) -> SoundResult<()> {
        let mut result = Ok(());
        for alias in aliases {
            let alias = alias.as_ref();
            if self.sounds.contains_key(alias) {
                self.unload_definition(alias);
            } else {
                warn!("Cannot unload unknown sound '{}'", alias);
                result = Err(SoundError::UnknownAlias(alias.to_string()));
            }
        }
        result
    }

    /// Stop and unload every registered sound.
    pub fn unload_all(&mut self) {
        debug!("Unloading all sounds");
        for alias in self.alias_list() {
            self.unload_definition(&alias);
        }
    }

    fn unload_definition(&mut self, alias: &str) {
        let Some(def) = self.sounds.get(alias) else {
            return;
        };
        if def.load_state == LoadState::Unloaded && !def.is_playing() {
            trace!("'{}' already unloaded", alias);
            return;
        }

        self.stop_definition(alias);
        if let Some(def) = self.sounds.get_mut(alias) {
            def.load_state = LoadState::Unloaded;
            def.cached_duration_ms = None;
        }
        self.backend.remove_source(alias);
        debug!("Unloaded '{}'", alias);
    }

    // ============================================
    // Fades
    // ============================================

    /// Fade an instance in.
    ///
    /// The volume jumps to `start_volume` (default 0) and rises to
    /// `target_volume` (default: the instance's current volume).
    ///
    /// # Errors
    ///
    /// - [`SoundError::UnknownAlias`] for an unregistered alias.
    /// - [`SoundError::InvalidHandle`] for a stale handle.
    ///
    /// An alias with nothing playing is not an error; nothing happens.
    pub fn fade_in(&mut self, target: impl Into<FadeTarget>, params: FadeParams) -> SoundResult<()> {
        let Some(handle) = self.resolve_fade_target(target.into())? else {
            return Ok(());
        };
        let Some(inst) = self.pool.get_mut(handle) else {
            return Err(SoundError::InvalidHandle);
        };

        let start = params.start_volume.unwrap_or(0.0).clamp(0.0, 1.0);
        let end = params.target_volume.unwrap_or(inst.current_volume).clamp(0.0, 1.0);
        let duration_ms = params.duration_ms.unwrap_or(DEFAULT_FADE_DURATION_MS);
        inst.current_volume = start;
        inst.fade = Some(FadeState::new(duration_ms, start, end, false));
        debug!("Fading in instance {} from {:.2} to {:.2}", handle, start, end);

        self.apply_volume(handle);
        self.fades.track(handle, &mut self.ticker);
        Ok(())
    }

    /// Fade an instance out.
    ///
    /// Fades from `start_volume` (default: current volume) to
    /// `target_volume` (default 0). The instance is stopped at the end when
    /// `stop_at_end` says so, or by default when the target is silence.
    /// Fading out an alias that is still loading cancels its playback.
    ///
    /// # Errors
    ///
    /// - [`SoundError::UnknownAlias`] for an unregistered alias.
    /// - [`SoundError::InvalidHandle`] for a stale handle.
    pub fn fade_out(&mut self, target: impl Into<FadeTarget>, params: FadeParams) -> SoundResult<()> {
        let target = target.into();
        if let FadeTarget::Alias(alias) = &target {
            let loading_only = self
                .sounds
                .get(alias)
                .is_some_and(|def| def.active.is_empty() && def.load_state == LoadState::Loading);
            if loading_only {
                debug!("Fade-out of loading '{}' cancels its playback", alias);
                self.stop_definition(alias);
                return Ok(());
            }
        }

        let Some(handle) = self.resolve_fade_target(target)? else {
            return Ok(());
        };
        let Some(inst) = self.pool.get_mut(handle) else {
            return Err(SoundError::InvalidHandle);
        };

        let start = params.start_volume.unwrap_or(inst.current_volume).clamp(0.0, 1.0);
        let end = params.target_volume.unwrap_or(0.0).clamp(0.0, 1.0);
        let stop = params.stop_at_end.unwrap_or(end <= 0.0);
        let duration_ms = params.duration_ms.unwrap_or(DEFAULT_FADE_DURATION_MS);
        inst.current_volume = start;
        inst.fade = Some(FadeState::new(duration_ms, start, end, stop));
        debug!("Fading out instance {} from {:.2} to {:.2}", handle, start, end);

        self.apply_volume(handle);
        self.fades.track(handle, &mut self.ticker);
        Ok(())
    }

    /// The playing instance a fade applies to, if any.
    fn resolve_fade_target(&self, target: FadeTarget) -> SoundResult<Option<InstanceHandle>> {
        match target {
            FadeTarget::Alias(alias) => match self.sounds.get(&alias) {
                Some(def) => Ok(def.latest_active()),
                None => {
                    warn!("Cannot fade unknown sound '{}'", alias);
                    Err(SoundError::UnknownAlias(alias))
                },
            },
            FadeTarget::Instance(handle) => {
                let inst = self.pool.get(handle).ok_or(SoundError::InvalidHandle)?;
                Ok(inst.channel().map(|_| handle))
            },
        }
    }

    /// Advance every fade by `elapsed_ms`. Called by the host once per frame
    /// while the tick source is subscribed.
    pub fn tick(&mut self, elapsed_ms: f64) {
        if self.fades.is_empty() {
            return;
        }
        for outcome in self.fades.advance(elapsed_ms, &mut self.pool) {
            match outcome {
                FadeOutcome::Updated(handle) | FadeOutcome::Settled(handle) => self.apply_volume(handle),
                FadeOutcome::Expired(handle) => {
                    trace!("Fade-out finished on instance {}", handle);
                    self.halt(handle);
                },
            }
        }
        self.fades.settle(&mut self.ticker);
    }

    // ============================================
    // Native completion
    // ============================================

    /// Collect finished channels from the backend and complete their
    /// instances.
    pub fn poll_channels(&mut self) {
        for channel in self.backend.drain_finished() {
            self.on_channel_complete(channel);
        }
    }

    /// Complete the instance playing on `channel`: release it and call its
    /// `on_complete`.
    pub fn on_channel_complete(&mut self, channel: ChannelId) {
        let Some(handle) = self.channels.remove(&channel) else {
            trace!("Completion for untracked channel {}", channel.raw());
            return;
        };
        let Some(inst) = self.pool.get_mut(handle) else {
            return;
        };
        let paused = inst.paused;
        let on_complete = inst.on_complete.take();
        let alias = inst.alias().map(str::to_string);

        if !paused {
            let now = self.clock.now_ms();
            self.guard.note_stopped(now);
        }
        if let Some(def) = alias.as_deref().and_then(|alias| self.sounds.get_mut(alias)) {
            def.forget(handle);
        }
        self.fades.untrack(handle, &mut self.ticker);
        self.pool.release(handle);
        trace!("Instance {} completed", handle);
        fire(on_complete);
    }

    // ============================================
    // Instances
    // ============================================

    /// Stop and release one instance without calling its `on_complete`.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::InvalidHandle`] for a stale handle.
    pub fn stop_instance(&mut self, handle: InstanceHandle) -> SoundResult<()> {
        self.require_instance(handle)?;
        self.halt(handle);
        Ok(())
    }

    /// Pause one instance.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::InvalidHandle`] for a stale handle.
    pub fn pause_instance(&mut self, handle: InstanceHandle) -> SoundResult<()> {
        self.require_instance(handle)?;
        self.pause_handle(handle);
        Ok(())
    }

    /// Resume one instance, however it was paused.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::InvalidHandle`] for a stale handle.
    pub fn resume_instance(&mut self, handle: InstanceHandle) -> SoundResult<()> {
        self.require_instance(handle)?;
        self.resume_handle(handle);
        Ok(())
    }

    /// Set one instance's volume before context scaling.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::InvalidHandle`] for a stale handle.
    pub fn set_instance_volume(&mut self, handle: InstanceHandle, volume: f32) -> SoundResult<()> {
        let inst = self.pool.get_mut(handle).ok_or(SoundError::InvalidHandle)?;
        inst.current_volume = volume.clamp(0.0, 1.0);
        self.apply_volume(handle);
        Ok(())
    }

    /// Set one instance's pan.
    ///
    /// # Errors
    ///
    /// Returns [`SoundError::InvalidHandle`] for a stale handle.
    pub fn set_instance_pan(&mut self, handle: InstanceHandle, pan: f32) -> SoundResult<()> {
        let inst = self.pool.get_mut(handle).ok_or(SoundError::InvalidHandle)?;
        inst.pan = pan.clamp(-1.0, 1.0);
        if let Some(channel) = inst.channel() {
            let pan = inst.pan;
            self.backend.set_pan(channel, pan);
        }
        Ok(())
    }

    fn require_instance(&self, handle: InstanceHandle) -> SoundResult<()> {
        if self.pool.get(handle).is_some() {
            Ok(())
        } else {
            debug!("Stale instance handle {}", handle);
            Err(SoundError::InvalidHandle)
        }
    }

    // ============================================
    // Platform
    // ============================================

    /// Report a user gesture (touch, click, key press).
    ///
    /// On gesture-gated platforms this primes the engine; the first gesture
    /// that leaves it running queues [`SoundEvent::SystemUnmuted`].
    pub fn handle_user_gesture(&mut self) -> GestureResponse {
        let response = self.guard.handle_gesture(&mut self.backend);
        if matches!(response, GestureResponse::Unlocked { .. }) {
            self.events.push(SoundEvent::SystemUnmuted);
        }
        response
    }

    /// Take the queued notifications.
    pub fn drain_events(&mut self) -> Vec<SoundEvent> {
        std::mem::take(&mut self.events)
    }

    /// Whether audio is muted until a user gesture unlocks it.
    #[must_use]
    pub const fn is_system_muted(&self) -> bool {
        self.guard.is_system_muted()
    }

    /// Mute or unmute all output.
    pub fn set_mute_all(&mut self, muted: bool) {
        debug!("Setting master mute to {}", muted);
        self.muted = muted;
        self.backend.set_muted(muted);
    }

    /// Whether all output is muted.
    #[must_use]
    pub const fn is_muted_all(&self) -> bool {
        self.muted
    }

    // ============================================
    // Queries
    // ============================================

    /// Whether a sound is registered as `alias`.
    #[must_use]
    pub fn exists(&self, alias: &str) -> bool {
        self.sounds.contains_key(alias)
    }

    /// Whether a context named `name` exists.
    #[must_use]
    pub fn context_exists(&self, name: &str) -> bool {
        self.contexts.contains(name)
    }

    /// Load state of `alias`.
    #[must_use]
    pub fn load_state(&self, alias: &str) -> Option<LoadState> {
        self.sounds.get(alias).map(SoundDefinition::load_state)
    }

    /// Whether `alias` is registered and unloaded.
    #[must_use]
    pub fn is_unloaded(&self, alias: &str) -> bool {
        self.load_state(alias) == Some(LoadState::Unloaded)
    }

    /// Whether `alias` is loading.
    #[must_use]
    pub fn is_loading(&self, alias: &str) -> bool {
        self.load_state(alias) == Some(LoadState::Loading)
    }

    /// Whether `alias` is loaded.
    #[must_use]
    pub fn is_loaded(&self, alias: &str) -> bool {
        self.load_state(alias) == Some(LoadState::Loaded)
    }

    /// Whether `alias` has any playing or pending instance.
    #[must_use]
    pub fn is_playing(&self, alias: &str) -> bool {
        self.sounds.get(alias).is_some_and(SoundDefinition::is_playing)
    }

    /// Length of `alias` in milliseconds.
    ///
    /// `None` for an unknown alias, `Some(0)` until it is loaded.
    pub fn duration_ms(&mut self, alias: &str) -> Option<u64> {
        let def = self.sounds.get_mut(alias)?;
        if def.load_state != LoadState::Loaded {
            return Some(0);
        }
        if def.cached_duration_ms.is_none() {
            def.cached_duration_ms = self.backend.source_duration_ms(alias);
        }
        Some(def.cached_duration_ms.unwrap_or(0))
    }

    /// Registered definition of `alias`.
    #[must_use]
    pub fn definition(&self, alias: &str) -> Option<&SoundDefinition> {
        self.sounds.get(alias)
    }

    /// Every registered alias.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.sounds.keys().map(String::as_str)
    }

    fn alias_list(&self) -> Vec<String> {
        self.sounds.keys().cloned().collect()
    }

    /// Context named `name`.
    #[must_use]
    pub fn context(&self, name: &str) -> Option<&SoundContext> {
        self.contexts.get(name)
    }

    /// The context graph.
    #[must_use]
    pub const fn contexts(&self) -> &ContextGraph {
        &self.contexts
    }

    /// Live instance behind `handle`.
    #[must_use]
    pub fn instance(&self, handle: InstanceHandle) -> Option<&PlaybackInstance> {
        self.pool.get(handle)
    }

    /// Volume sent to the backend for `handle`: instance volume times the
    /// context factor.
    #[must_use]
    pub fn effective_volume(&self, handle: InstanceHandle) -> Option<f32> {
        let inst = self.pool.get(handle)?;
        let factor = inst.alias().map_or(1.0, |alias| self.factor_for_alias(alias));
        Some(inst.current_volume * factor)
    }

    /// The instance pool.
    #[must_use]
    pub const fn pool(&self) -> &InstancePool {
        &self.pool
    }

    /// The fades list.
    #[must_use]
    pub const fn fades(&self) -> &FadeScheduler {
        &self.fades
    }

    /// The platform guard.
    #[must_use]
    pub const fn guard(&self) -> &PlatformAudioGuard {
        &self.guard
    }

    /// Capabilities probed at init.
    #[must_use]
    pub const fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    /// File extension chosen at init.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Settings the registry was created with.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The native backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The native backend, mutably. Hosts use this to hand loaded data to
    /// the backend before reporting the load.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The asset loader.
    #[must_use]
    pub const fn loader(&self) -> &L {
        &self.loader
    }

    /// The asset loader, mutably.
    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    /// The tick source.
    #[must_use]
    pub const fn ticker(&self) -> &T {
        &self.ticker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct StubBackend {
        next_channel: u64,
        stopped: Vec<ChannelId>,
    }

    impl AudioBackend for StubBackend {
        fn capabilities(&self) -> PlatformCapabilities {
            PlatformCapabilities::default()
        }
        fn supports_type(&self, extension: &str) -> bool {
            extension == "ogg"
        }
        fn play(&mut self, _alias: &str, _params: &StartParams) -> Option<ChannelId> {
            self.next_channel += 1;
            Some(ChannelId::new(self.next_channel))
        }
        fn channel_duration_ms(&self, _channel: ChannelId) -> u64 {
            1_000
        }
        fn source_duration_ms(&self, _alias: &str) -> Option<u64> {
            Some(1_000)
        }
        fn stop(&mut self, channel: ChannelId) {
            self.stopped.push(channel);
        }
        fn pause(&mut self, _channel: ChannelId) {}
        fn resume(&mut self, _channel: ChannelId) {}
        fn set_volume(&mut self, _channel: ChannelId, _volume: f32) {}
        fn set_pan(&mut self, _channel: ChannelId, _pan: f32) {}
        fn drain_finished(&mut self) -> Vec<ChannelId> {
            Vec::new()
        }
        fn remove_source(&mut self, _alias: &str) {}
        fn remove_all_sources(&mut self) {}
        fn set_muted(&mut self, _muted: bool) {}
        fn is_running(&self) -> bool {
            true
        }
        fn play_silent(&mut self) {}
        fn recreate_context(&mut self) {}
    }

    #[derive(Default)]
    struct StubLoader {
        batches: Vec<LoadBatch>,
    }

    impl AssetLoader for StubLoader {
        fn submit(&mut self, batch: LoadBatch) {
            self.batches.push(batch);
        }
    }

    struct StubTicker;

    impl TickSource for StubTicker {
        fn subscribe(&mut self) {}
        fn unsubscribe(&mut self) {}
    }

    type StubRegistry = SoundRegistry<StubBackend, StubLoader, StubTicker>;

    fn registry() -> StubRegistry {
        SoundRegistry::init(
            RegistryConfig::default(),
            StubBackend::default(),
            StubLoader::default(),
            StubTicker,
        )
        .expect("init")
    }

    #[test]
    fn test_second_init_fails_until_destroyed() {
        let first = registry();
        let second = SoundRegistry::init(
            RegistryConfig::default(),
            StubBackend::default(),
            StubLoader::default(),
            StubTicker,
        );
        assert_eq!(second.err(), Some(SoundError::AlreadyInitialized));

        first.destroy();
        let third = registry();
        drop(third);
    }

    #[test]
    fn test_source_path_uses_supported_type() {
        let mut sounds = registry();
        sounds
            .register_context(ContextConfig::new("sfx").with_path("audio/").with_sound("click"))
            .expect("register");

        assert_eq!(sounds.extension(), Some("ogg"));
        let def = sounds.definition("click").expect("registered");
        assert_eq!(def.source_path, PathBuf::from("audio/click.ogg"));
    }

    #[test]
    fn test_stop_releases_active_and_pending() {
        let mut sounds = registry();
        sounds
            .register_context(ContextConfig::new("sfx").with_sound("boom"))
            .expect("register");
        sounds.sounds.get_mut("boom").expect("def").load_state = LoadState::Loaded;

        sounds.play("boom", PlayOptions::new()).expect("first");
        sounds.play("boom", PlayOptions::new()).expect("second");

        // A pending instance alongside active ones only arises mid-reload;
        // build it directly.
        let pending = sounds.pool.acquire(None, "boom", 0);
        sounds.sounds.get_mut("boom").expect("def").pending.push(pending);
        assert_eq!(sounds.pool().in_use(), 3);

        sounds.stop("boom").expect("stop");

        let def = sounds.definition("boom").expect("def");
        assert!(def.active_instances().is_empty());
        assert!(def.pending_instances().is_empty());
        assert_eq!(sounds.pool().in_use(), 0);
        assert_eq!(sounds.pool().available(), 3);
        assert_eq!(sounds.backend().stopped.len(), 2);
    }

    #[test]
    fn test_reregistration_moves_context_membership() {
        let mut sounds = registry();
        sounds
            .register_context(ContextConfig::new("sfx").with_sound("click"))
            .expect("register");
        sounds
            .register_context(ContextConfig::new("ui").with_sound("click"))
            .expect("register");

        assert!(sounds.context("sfx").expect("sfx").members().is_empty());
        assert_eq!(sounds.context("ui").expect("ui").members(), ["click".to_string()]);
        assert_eq!(sounds.definition("click").expect("def").context.as_deref(), Some("ui"));
    }

    #[test]
    fn test_empty_registration_is_misconfigured() {
        let mut sounds = registry();
        let err = sounds.register_context(ContextConfig::new("sfx")).expect_err("empty");
        assert!(matches!(err, SoundError::Misconfigured(_)));
        assert!(!sounds.context_exists("sfx"));
    }
}
