//! Host loop.
//!
//! [`SoundApp`] owns the registry and drives it once per frame: loader
//! results are decoded into the backend and forwarded, finished channels are
//! reported and fades are ticked while the registry is subscribed.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use cadence_kernel::{LoadEvent, PlayOptions, SoundEvent, SoundRegistry};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, CONFIG_FILE};
use crate::file_loader::{FileLoader, LoadOutcome};
use crate::manifest::Manifest;
use crate::rodio_backend::RodioBackend;
use crate::timing::{FrameTicker, FrameTiming};

/// Registry wired to the desktop collaborators.
pub type EngineRegistry = SoundRegistry<RodioBackend, FileLoader, FrameTicker>;

/// Longest a command-line session keeps running.
pub const SESSION_LIMIT: Duration = Duration::from_secs(600);

/// Sound runtime plus the loop that feeds it.
#[derive(Debug)]
pub struct SoundApp {
    config: EngineConfig,
    sounds: EngineRegistry,
    timing: FrameTiming,
    frames: u64,
}

impl SoundApp {
    /// Open the default output device and register every manifest.
    ///
    /// Relative asset and manifest paths resolve against `base_dir`.
    pub fn new(config: EngineConfig, base_dir: &Path) -> Result<Self> {
        let backend = RodioBackend::open(config.max_channels).with_stale_recovery(config.recover_stale_output);
        Self::with_backend(config, base_dir, backend)
    }

    /// Same as [`new`](Self::new) with a backend supplied by the caller.
    pub fn with_backend(mut config: EngineConfig, base_dir: &Path, backend: RodioBackend) -> Result<Self> {
        config.validate();

        let loader = FileLoader::new(base_dir.join(&config.asset_root), config.loader_threads);
        let mut sounds = SoundRegistry::init(config.registry.clone(), backend, loader, FrameTicker::new())
            .context("Failed to start the sound registry")?;

        for path in config.manifests_relative_to(base_dir) {
            match Manifest::load(&path) {
                Ok(manifest) => {
                    let failures = manifest.apply(&mut sounds);
                    if !failures.is_empty() {
                        warn!("{} entries of {} were rejected", failures.len(), path.display());
                    }
                },
                Err(e) => warn!("Skipping manifest: {e}"),
            }
        }

        if config.muted {
            sounds.set_mute_all(true);
        }

        info!(
            "Sound runtime ready: {} sounds, {} contexts",
            sounds.aliases().count(),
            sounds.contexts().len()
        );

        Ok(Self {
            timing: FrameTiming::new(config.target_fps),
            config,
            sounds,
            frames: 0,
        })
    }

    /// The registry.
    #[must_use]
    pub fn registry(&self) -> &EngineRegistry {
        &self.sounds
    }

    /// The registry, mutably.
    pub fn registry_mut(&mut self) -> &mut EngineRegistry {
        &mut self.sounds
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Frames run so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Run one frame and return the notifications it produced.
    pub fn frame(&mut self) -> Vec<SoundEvent> {
        self.pump_loads();
        self.sounds.poll_channels();

        let elapsed_ms = self.timing.delta_ms();
        if self.sounds.ticker().is_subscribed() {
            self.sounds.tick(elapsed_ms);
        }

        self.frames += 1;
        self.sounds.drain_events()
    }

    /// Nothing loading, playing or fading.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.sounds.loader().is_busy() && self.sounds.pool().in_use() == 0 && self.sounds.fades().is_empty()
    }

    /// Run frames until the app is idle or `limit` passes.
    pub fn run_until_idle(&mut self, limit: Duration) -> Vec<SoundEvent> {
        let started = Instant::now();
        let mut events = Vec::new();
        self.timing.reset();

        loop {
            events.extend(self.frame());
            if self.is_idle() {
                debug!("Idle after {} frames", self.frames);
                break;
            }
            if started.elapsed() >= limit {
                warn!("Still busy after {:?}, giving up", limit);
                break;
            }
            self.timing.sleep_remainder();
        }
        events
    }

    /// Stop everything and release the registry.
    pub fn shutdown(self) {
        info!("Shutting down after {} frames", self.frames);
        self.sounds.destroy();
    }

    fn pump_loads(&mut self) {
        let outcomes = self.sounds.loader_mut().poll();
        for outcome in outcomes {
            let event = decode_outcome(self.sounds.backend_mut(), outcome);
            self.sounds.handle_load_event(event);
        }
    }
}

/// Hand loaded bytes to the backend, turning undecodable data into a failure.
fn decode_outcome(backend: &mut RodioBackend, outcome: LoadOutcome) -> LoadEvent {
    match outcome {
        LoadOutcome {
            event: LoadEvent::Loaded { batch, alias },
            data: Some(bytes),
        } => match backend.insert_source(&alias, bytes) {
            Ok(_) => LoadEvent::Loaded { batch, alias },
            Err(e) => LoadEvent::Failed {
                batch,
                alias,
                reason: e.to_string(),
            },
        },
        LoadOutcome { event, .. } => event,
    }
}

/// Command-line entry: `cadence [config.toml] [alias ...]`.
pub fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    let aliases: Vec<String> = args.collect();

    let base_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let config = EngineConfig::load_from(&config_path);

    let mut app = SoundApp::new(config, &base_dir)?;
    for alias in &aliases {
        match app.registry_mut().play(alias, PlayOptions::new()) {
            Ok(handle) => info!("Playing {alias} as {handle}"),
            Err(e) => warn!("Cannot play {alias}: {e}"),
        }
    }

    for event in app.run_until_idle(SESSION_LIMIT) {
        info!("Sound event: {event:?}");
    }
    app.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::BatchId;
    use cadence_kernel::{AudioBackend, SoundError};
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[[contexts]]
context = "sfx"
path = "sfx/"
sounds = ["click", "pop"]

[[contexts]]
context = "music"
sounds = [{ id = "theme", loop = true }]

[[links]]
parent = "master"
children = ["sfx", "music"]
"#;

    fn silent_app(dir: &TempDir) -> SoundApp {
        fs::write(dir.path().join("sounds.toml"), MANIFEST).expect("write");
        let mut config = EngineConfig::default();
        config.manifests = vec![PathBuf::from("sounds.toml"), PathBuf::from("missing.toml")];
        SoundApp::with_backend(config, dir.path(), RodioBackend::unavailable(4)).expect("app")
    }

    #[test]
    fn test_manifests_registered_at_startup() {
        let dir = TempDir::new().expect("temp dir");
        let app = silent_app(&dir);

        let sounds = app.registry();
        assert!(sounds.exists("click"));
        assert!(sounds.exists("theme"));
        assert!(sounds.context_exists("master"));
        assert_eq!(sounds.context("master").expect("ctx").children().len(), 2);
        assert!(sounds.definition("theme").expect("def").default_loop);
    }

    #[test]
    fn test_unavailable_output_degrades() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = silent_app(&dir);

        assert_eq!(
            app.registry_mut().play("click", PlayOptions::new()),
            Err(SoundError::Unsupported)
        );
        assert!(app.frame().is_empty());
        assert!(app.is_idle());
        assert_eq!(app.frames(), 1);
    }

    #[test]
    fn test_run_until_idle_returns_at_once_when_idle() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = silent_app(&dir);

        app.run_until_idle(Duration::from_secs(5));
        assert_eq!(app.frames(), 1);
        app.shutdown();
    }

    #[test]
    fn test_second_app_needs_shutdown_first() {
        let dir = TempDir::new().expect("temp dir");
        let app = silent_app(&dir);
        let again = SoundApp::with_backend(EngineConfig::default(), dir.path(), RodioBackend::unavailable(1));
        assert!(again.is_err());

        app.shutdown();
        assert!(SoundApp::with_backend(EngineConfig::default(), dir.path(), RodioBackend::unavailable(1)).is_ok());
    }

    #[test]
    fn test_undecodable_load_becomes_failure() {
        let mut backend = RodioBackend::unavailable(1);
        let batch = BatchId::new(4);

        let event = decode_outcome(
            &mut backend,
            LoadOutcome {
                event: LoadEvent::Loaded {
                    batch,
                    alias: "click".into(),
                },
                data: Some(b"not audio at all".to_vec()),
            },
        );
        assert!(matches!(event, LoadEvent::Failed { alias, .. } if alias == "click"));
        assert_eq!(backend.source_duration_ms("click"), None);

        let complete = LoadOutcome {
            event: LoadEvent::BatchComplete { batch },
            data: None,
        };
        assert_eq!(decode_outcome(&mut backend, complete), LoadEvent::BatchComplete { batch });
    }
}
