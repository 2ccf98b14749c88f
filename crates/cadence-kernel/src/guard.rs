//! Workarounds for platform audio engines.
//!
//! Two independent quirks are handled here:
//!
//! - **Gesture unlock**: some platforms keep the engine suspended until a
//!   user gesture. Until then the registry reports itself system-muted; each
//!   gesture plays a silent primer until the engine runs.
//! - **Stale context**: some platforms let the engine context go stale after
//!   a long silence. The guard counts playing channels and remembers when the
//!   count last dropped to zero; starting playback after too long an idle
//!   stretch requires a context rebuild first.

use tracing::{debug, info};

use crate::backend::{AudioBackend, PlatformCapabilities};

/// Notifications queued by the registry for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEvent {
    /// A user gesture unlocked a gesture-gated engine.
    SystemUnmuted,
}

/// Result of reporting a user gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureResponse {
    /// No unlock was pending; the gesture was not used.
    Ignored,
    /// Primer played but the engine is still suspended.
    StillLocked,
    /// The engine is running now.
    Unlocked {
        /// Whether the host should suppress the gesture's default action.
        prevent_default: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct IdleTracker {
    threshold_ms: u64,
    playing: u32,
    /// When the playing count last reached zero; `None` while playing.
    idle_since_ms: Option<u64>,
}

/// Gesture-unlock and stale-context bookkeeping.
#[derive(Debug, Clone)]
pub struct PlatformAudioGuard {
    awaiting_gesture: bool,
    system_muted: bool,
    prevent_default_on_unmute: bool,
    idle: Option<IdleTracker>,
}

impl PlatformAudioGuard {
    /// Set up the guard from probed capabilities.
    pub fn new(
        capabilities: PlatformCapabilities,
        backend_running: bool,
        threshold_ms: u64,
        prevent_default_on_unmute: bool,
        now_ms: u64,
    ) -> Self {
        let awaiting_gesture = capabilities.gesture_unlock_required && !backend_running;
        if awaiting_gesture {
            info!("Audio is gesture-gated; waiting for user interaction");
        }

        let idle = capabilities.stale_context_prone.then(|| {
            debug!("Stale-context recovery enabled ({} ms)", threshold_ms);
            IdleTracker {
                threshold_ms,
                playing: 0,
                idle_since_ms: Some(now_ms),
            }
        });

        Self {
            awaiting_gesture,
            system_muted: awaiting_gesture,
            prevent_default_on_unmute,
            idle,
        }
    }

    /// Guard with both workarounds disabled.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            awaiting_gesture: false,
            system_muted: false,
            prevent_default_on_unmute: true,
            idle: None,
        }
    }

    /// Whether audio is muted until a gesture unlocks it.
    #[must_use]
    pub const fn is_system_muted(&self) -> bool {
        self.system_muted
    }

    /// Whether gestures are still being listened for.
    #[must_use]
    pub const fn awaiting_gesture(&self) -> bool {
        self.awaiting_gesture
    }

    /// Whether stale-context recovery is enabled.
    #[must_use]
    pub const fn tracks_idle(&self) -> bool {
        self.idle.is_some()
    }

    /// Number of channels counted as playing.
    #[must_use]
    pub fn playing_count(&self) -> u32 {
        self.idle.map_or(0, |idle| idle.playing)
    }

    /// Handle a user gesture: prime the engine and unlock once it runs.
    pub fn handle_gesture(&mut self, backend: &mut impl AudioBackend) -> GestureResponse {
        if !self.awaiting_gesture {
            return GestureResponse::Ignored;
        }

        backend.play_silent();
        if !backend.is_running() {
            debug!("Audio engine still suspended after gesture");
            return GestureResponse::StillLocked;
        }

        self.awaiting_gesture = false;
        self.system_muted = false;
        info!("Audio unlocked by user gesture");
        GestureResponse::Unlocked {
            prevent_default: self.prevent_default_on_unmute,
        }
    }

    /// Whether the context must be rebuilt before starting playback now.
    #[must_use]
    pub fn needs_recreate(&self, now_ms: u64) -> bool {
        self.idle.is_some_and(|idle| {
            idle.playing == 0
                && idle
                    .idle_since_ms
                    .is_some_and(|since| now_ms.saturating_sub(since) >= idle.threshold_ms)
        })
    }

    /// Rebuild the backend context if the idle stretch was too long.
    ///
    /// Returns whether a rebuild happened.
    pub fn recover_if_stale(&mut self, now_ms: u64, backend: &mut impl AudioBackend) -> bool {
        if !self.needs_recreate(now_ms) {
            return false;
        }
        info!("Audio context idle too long; recreating");
        backend.recreate_context();
        true
    }

    /// A channel started (or resumed) playing.
    pub fn note_started(&mut self) {
        if let Some(idle) = self.idle.as_mut() {
            idle.playing += 1;
            idle.idle_since_ms = None;
        }
    }

    /// A channel stopped, finished or paused.
    pub fn note_stopped(&mut self, now_ms: u64) {
        if let Some(idle) = self.idle.as_mut() {
            idle.playing = idle.playing.saturating_sub(1);
            if idle.playing == 0 {
                idle.idle_since_ms = Some(now_ms);
            }
        }
    }
}
