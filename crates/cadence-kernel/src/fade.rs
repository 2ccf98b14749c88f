//! Volume fades driven by the frame tick.
//!
//! A fade is a linear interpolation from a start to an end volume over a
//! fixed duration. The [`FadeScheduler`] keeps the list of fading instances
//! and only holds a tick subscription while that list is non-empty.

use cadence_common::InstanceHandle;
use tracing::trace;

use crate::config::DEFAULT_FADE_DURATION_MS;
use crate::instance::InstancePool;
use crate::tick::TickSource;

/// Fade progress stored on an instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeState {
    /// Time spent fading so far.
    pub elapsed_ms: f64,
    /// Total fade time, always positive.
    pub duration_ms: f64,
    /// Volume at the start of the fade.
    pub start_volume: f32,
    /// Volume at the end of the fade.
    pub end_volume: f32,
    /// Stop and release the instance once the fade completes.
    pub stop_on_complete: bool,
}

/// Result of advancing a fade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeStep {
    /// Still fading; the new volume.
    Running(f32),
    /// Done.
    Finished {
        /// The end volume.
        volume: f32,
        /// Whether the instance should now be stopped.
        stop: bool,
    },
}

impl FadeState {
    /// Create a fade. A zero duration falls back to the default.
    #[must_use]
    pub fn new(duration_ms: u64, start_volume: f32, end_volume: f32, stop_on_complete: bool) -> Self {
        let duration_ms = if duration_ms > 0 {
            duration_ms
        } else {
            DEFAULT_FADE_DURATION_MS
        };
        Self {
            elapsed_ms: 0.0,
            duration_ms: duration_ms as f64,
            start_volume,
            end_volume,
            stop_on_complete,
        }
    }

    /// Interpolated volume at the current elapsed time.
    #[must_use]
    pub fn volume(&self) -> f32 {
        let t = (self.elapsed_ms / self.duration_ms).clamp(0.0, 1.0) as f32;
        self.start_volume + (self.end_volume - self.start_volume) * t
    }

    /// Advance by `elapsed_ms`.
    pub fn advance(&mut self, elapsed_ms: f64) -> FadeStep {
        self.elapsed_ms += elapsed_ms.max(0.0);
        if self.elapsed_ms >= self.duration_ms {
            FadeStep::Finished {
                volume: self.end_volume,
                stop: self.stop_on_complete,
            }
        } else {
            FadeStep::Running(self.volume())
        }
    }
}

/// What to fade: an alias's most recent instance, or a specific one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FadeTarget {
    /// The most recently started active instance of the alias.
    Alias(String),
    /// A specific instance.
    Instance(InstanceHandle),
}

impl From<&str> for FadeTarget {
    fn from(alias: &str) -> Self {
        Self::Alias(alias.to_string())
    }
}

impl From<String> for FadeTarget {
    fn from(alias: String) -> Self {
        Self::Alias(alias)
    }
}

impl From<InstanceHandle> for FadeTarget {
    fn from(handle: InstanceHandle) -> Self {
        Self::Instance(handle)
    }
}

/// Optional fade settings; unset fields use the fade-in/fade-out defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FadeParams {
    /// Fade duration; defaults to 500 ms.
    pub duration_ms: Option<u64>,
    /// Volume to fade to.
    pub target_volume: Option<f32>,
    /// Volume to fade from.
    pub start_volume: Option<f32>,
    /// Stop when done (fade-out only); defaults to "end volume is 0".
    pub stop_at_end: Option<bool>,
}

impl FadeParams {
    /// Params with every field defaulted.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            duration_ms: None,
            target_volume: None,
            start_volume: None,
            stop_at_end: None,
        }
    }

    /// Set the duration.
    #[must_use]
    pub const fn over_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Set the target volume.
    #[must_use]
    pub const fn to(mut self, volume: f32) -> Self {
        self.target_volume = Some(volume);
        self
    }

    /// Set the start volume.
    #[must_use]
    pub const fn from(mut self, volume: f32) -> Self {
        self.start_volume = Some(volume);
        self
    }

    /// Override whether the instance stops at the end.
    #[must_use]
    pub const fn stop_at_end(mut self, stop: bool) -> Self {
        self.stop_at_end = Some(stop);
        self
    }
}

/// What a tick did to one fading instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    /// Volume changed; fade continues.
    Updated(InstanceHandle),
    /// Fade completed; volume snapped to the end and the entry retired.
    Settled(InstanceHandle),
    /// Fade completed on an instance that must now be stopped.
    Expired(InstanceHandle),
}

/// Ordered list of fading instances plus the tick subscription.
#[derive(Debug, Default)]
pub struct FadeScheduler {
    entries: Vec<InstanceHandle>,
    subscribed: bool,
}

impl FadeScheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fading instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is fading.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `handle` is in the fades list.
    #[must_use]
    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.entries.contains(&handle)
    }

    /// Whether the tick subscription is held.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Add an instance; subscribes to ticks on the first entry.
    pub fn track(&mut self, handle: InstanceHandle, ticker: &mut impl TickSource) {
        if self.entries.contains(&handle) {
            return;
        }
        self.entries.push(handle);
        if !self.subscribed {
            ticker.subscribe();
            self.subscribed = true;
            trace!("Fade scheduler subscribed to ticks");
        }
    }

    /// Remove an instance; unsubscribes once the list is empty.
    pub fn untrack(&mut self, handle: InstanceHandle, ticker: &mut impl TickSource) {
        if let Some(idx) = self.entries.iter().position(|h| *h == handle) {
            self.entries.remove(idx);
        }
        self.settle(ticker);
    }

    /// Drop every entry and the subscription.
    pub fn clear(&mut self, ticker: &mut impl TickSource) {
        self.entries.clear();
        self.settle(ticker);
    }

    /// Unsubscribe if nothing is fading.
    pub fn settle(&mut self, ticker: &mut impl TickSource) {
        if self.entries.is_empty() && self.subscribed {
            ticker.unsubscribe();
            self.subscribed = false;
            trace!("Fade scheduler unsubscribed from ticks");
        }
    }

    /// Advance every unpaused fade by `elapsed_ms`, newest entry first.
    ///
    /// Instance volumes are updated in place. Completed non-stopping fades
    /// are retired here; stopping ones are reported as
    /// [`FadeOutcome::Expired`] and stay listed until the caller stops them.
    pub fn advance(&mut self, elapsed_ms: f64, pool: &mut InstancePool) -> Vec<FadeOutcome> {
        let mut outcomes = Vec::with_capacity(self.entries.len());

        for idx in (0..self.entries.len()).rev() {
            let handle = self.entries[idx];
            let Some(inst) = pool.get_mut(handle) else {
                self.entries.remove(idx);
                continue;
            };
            if inst.paused {
                continue;
            }
            let Some(fade) = inst.fade.as_mut() else {
                self.entries.remove(idx);
                continue;
            };

            match fade.advance(elapsed_ms) {
                FadeStep::Running(volume) => {
                    inst.current_volume = volume;
                    outcomes.push(FadeOutcome::Updated(handle));
                },
                FadeStep::Finished { stop: true, .. } => {
                    outcomes.push(FadeOutcome::Expired(handle));
                },
                FadeStep::Finished { volume, stop: false } => {
                    inst.current_volume = volume;
                    inst.fade = None;
                    self.entries.remove(idx);
                    outcomes.push(FadeOutcome::Settled(handle));
                },
            }
        }

        outcomes
    }
}
