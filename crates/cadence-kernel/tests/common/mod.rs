//! Recording collaborators shared by the kernel integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use cadence_kernel::prelude::*;

/// One channel started on the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MockChannel {
    pub alias: String,
    pub params: StartParams,
    pub volume: f32,
    pub pan: f32,
    pub paused: bool,
    pub stopped: bool,
}

/// Backend that records every call.
#[derive(Debug)]
pub struct MockBackend {
    pub caps: PlatformCapabilities,
    pub supported: Vec<String>,
    pub running: bool,
    /// Whether a silent primer starts the engine.
    pub unlock_on_silent: bool,
    pub fail: HashSet<String>,
    pub durations: HashMap<String, u64>,
    pub channels: HashMap<ChannelId, MockChannel>,
    pub started: Vec<ChannelId>,
    pub finished: Vec<ChannelId>,
    pub removed: Vec<String>,
    pub removed_all: bool,
    pub muted: bool,
    pub silent_plays: u32,
    pub recreated: u32,
    next_channel: u64,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            caps: PlatformCapabilities::default(),
            supported: vec!["ogg".to_string(), "mp3".to_string()],
            running: true,
            unlock_on_silent: true,
            fail: HashSet::new(),
            durations: HashMap::new(),
            channels: HashMap::new(),
            started: Vec::new(),
            finished: Vec::new(),
            removed: Vec::new(),
            removed_all: false,
            muted: false,
            silent_plays: 0,
            recreated: 0,
            next_channel: 0,
        }
    }
}

impl MockBackend {
    pub fn with_caps(caps: PlatformCapabilities) -> Self {
        Self {
            caps,
            ..Self::default()
        }
    }

    pub fn channel(&self, channel: ChannelId) -> &MockChannel {
        self.channels.get(&channel).expect("channel was started")
    }

    pub fn last_channel(&self) -> &MockChannel {
        let id = self.started.last().expect("a channel was started");
        self.channel(*id)
    }

    /// Report `channel` as finished on the next drain.
    pub fn finish(&mut self, channel: ChannelId) {
        self.finished.push(channel);
    }

    pub fn live_channels(&self) -> usize {
        self.channels.values().filter(|c| !c.stopped).count()
    }
}

impl AudioBackend for MockBackend {
    fn capabilities(&self) -> PlatformCapabilities {
        self.caps
    }

    fn supports_type(&self, extension: &str) -> bool {
        self.supported.iter().any(|t| t == extension)
    }

    fn play(&mut self, alias: &str, params: &StartParams) -> Option<ChannelId> {
        if self.fail.contains(alias) {
            return None;
        }
        self.next_channel += 1;
        let id = ChannelId::new(self.next_channel);
        self.channels.insert(
            id,
            MockChannel {
                alias: alias.to_string(),
                params: *params,
                volume: params.volume,
                pan: params.pan,
                paused: false,
                stopped: false,
            },
        );
        self.started.push(id);
        Some(id)
    }

    fn channel_duration_ms(&self, channel: ChannelId) -> u64 {
        self.channels
            .get(&channel)
            .and_then(|c| self.durations.get(&c.alias).copied())
            .unwrap_or(1_000)
    }

    fn source_duration_ms(&self, alias: &str) -> Option<u64> {
        Some(self.durations.get(alias).copied().unwrap_or(1_000))
    }

    fn stop(&mut self, channel: ChannelId) {
        if let Some(c) = self.channels.get_mut(&channel) {
            c.stopped = true;
        }
    }

    fn pause(&mut self, channel: ChannelId) {
        if let Some(c) = self.channels.get_mut(&channel) {
            c.paused = true;
        }
    }

    fn resume(&mut self, channel: ChannelId) {
        if let Some(c) = self.channels.get_mut(&channel) {
            c.paused = false;
        }
    }

    fn set_volume(&mut self, channel: ChannelId, volume: f32) {
        if let Some(c) = self.channels.get_mut(&channel) {
            c.volume = volume;
        }
    }

    fn set_pan(&mut self, channel: ChannelId, pan: f32) {
        if let Some(c) = self.channels.get_mut(&channel) {
            c.pan = pan;
        }
    }

    fn drain_finished(&mut self) -> Vec<ChannelId> {
        std::mem::take(&mut self.finished)
    }

    fn remove_source(&mut self, alias: &str) {
        self.removed.push(alias.to_string());
    }

    fn remove_all_sources(&mut self) {
        self.removed_all = true;
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn play_silent(&mut self) {
        self.silent_plays += 1;
        if self.unlock_on_silent {
            self.running = true;
        }
    }

    fn recreate_context(&mut self) {
        self.recreated += 1;
    }
}

/// Loader that keeps every submitted batch.
#[derive(Debug, Default)]
pub struct RecordingLoader {
    pub batches: Vec<LoadBatch>,
    /// Batches already reported back by [`complete_loads`].
    pub completed: usize,
}

impl RecordingLoader {
    /// Number of submitted requests for `alias`.
    pub fn requests_for(&self, alias: &str) -> usize {
        self.batches
            .iter()
            .flat_map(|b| b.items.iter())
            .filter(|item| item.alias == alias)
            .count()
    }

    pub fn last_batch(&self) -> &LoadBatch {
        self.batches.last().expect("a batch was submitted")
    }
}

impl AssetLoader for RecordingLoader {
    fn submit(&mut self, batch: LoadBatch) {
        self.batches.push(batch);
    }
}

/// Tick source that counts subscription changes.
#[derive(Debug, Default)]
pub struct MockTicker {
    pub subscribed: bool,
    pub subscribes: u32,
    pub unsubscribes: u32,
}

impl TickSource for MockTicker {
    fn subscribe(&mut self) {
        self.subscribed = true;
        self.subscribes += 1;
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
        self.unsubscribes += 1;
    }
}

/// Clock the test moves by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn set(&self, now_ms: u64) {
        self.now.set(now_ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

pub type TestRegistry = SoundRegistry<MockBackend, RecordingLoader, MockTicker>;

pub fn registry() -> TestRegistry {
    registry_with(MockBackend::default()).0
}

pub fn registry_with(backend: MockBackend) -> (TestRegistry, ManualClock) {
    let clock = ManualClock::default();
    let sounds = SoundRegistry::init_with_clock(
        RegistryConfig::default(),
        backend,
        RecordingLoader::default(),
        MockTicker::default(),
        Box::new(clock.clone()),
    )
    .expect("registry init");
    (sounds, clock)
}

/// Registry with `aliases` registered in `context`.
pub fn registry_with_sounds(context: &str, aliases: &[&str]) -> TestRegistry {
    let mut sounds = registry();
    register(&mut sounds, context, aliases);
    sounds
}

pub fn register(sounds: &mut TestRegistry, context: &str, aliases: &[&str]) {
    let mut config = ContextConfig::new(context).with_path("sounds/");
    for alias in aliases {
        config = config.with_sound(*alias);
    }
    sounds.register_context(config).expect("register");
}

/// Preload `alias` and report it loaded.
pub fn load(sounds: &mut TestRegistry, alias: &str) {
    sounds.preload(&[alias], None).expect("preload");
    complete_loads(sounds);
}

/// Report every submitted batch as loaded.
pub fn complete_loads(sounds: &mut TestRegistry) {
    let loader = sounds.loader_mut();
    let batches = loader.batches[loader.completed..].to_vec();
    loader.completed = loader.batches.len();
    for batch in batches {
        for item in batch.items {
            sounds.handle_load_event(LoadEvent::Loaded {
                batch: batch.id,
                alias: item.alias,
            });
        }
        sounds.handle_load_event(LoadEvent::BatchComplete { batch: batch.id });
    }
}

/// Counter bumped by callbacks.
pub fn counter() -> (Rc<Cell<u32>>, impl Fn() -> Box<dyn FnOnce()>) {
    let count = Rc::new(Cell::new(0));
    let make = {
        let count = Rc::clone(&count);
        move || {
            let count = Rc::clone(&count);
            Box::new(move || count.set(count.get() + 1)) as Box<dyn FnOnce()>
        }
    };
    (count, make)
}

/// Shared log of callback labels.
pub fn call_log() -> Rc<RefCell<Vec<&'static str>>> {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}
