//! Frame tick and clock contracts.

use std::time::Instant;

/// Per-frame tick source.
///
/// While subscribed, the host calls
/// [`SoundRegistry::tick`](crate::SoundRegistry::tick) once per frame with the
/// elapsed milliseconds.
pub trait TickSource {
    /// Start delivering ticks.
    fn subscribe(&mut self);

    /// Stop delivering ticks.
    fn unsubscribe(&mut self);
}

/// Monotonic millisecond clock used for idle tracking.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}

/// Clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    /// Create a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
