//! Frame pacing for the host loop.
//!
//! [`FrameTiming`] measures the time between frames and sleeps off the rest
//! of the frame budget. [`FrameTicker`] is the registry's [`TickSource`]: it
//! only records whether fades currently want ticks, the loop does the rest.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use cadence_kernel::TickSource;

/// Largest delta handed to the registry in one frame.
///
/// A stalled frame (debugger, suspended laptop) would otherwise finish every
/// fade at once.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Frame timing manager.
#[derive(Debug)]
pub struct FrameTiming {
    /// Target frames per second
    target_fps: u32,
    /// Time budget per frame
    frame_budget: Duration,
    /// Time of last frame start
    last_frame: Instant,
    /// Clamp applied to every delta
    max_dt: Duration,
    /// Recent frame times for averaging
    frame_times: VecDeque<Duration>,
    /// Maximum samples for averaging
    max_samples: usize,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(60)
    }
}

impl FrameTiming {
    /// Create a timing manager aiming for `target_fps`.
    #[must_use]
    pub fn new(target_fps: u32) -> Self {
        let target_fps = target_fps.max(1);
        Self {
            target_fps,
            frame_budget: Duration::from_secs_f64(1.0 / f64::from(target_fps)),
            last_frame: Instant::now(),
            max_dt: MAX_FRAME_DELTA,
            frame_times: VecDeque::with_capacity(120),
            max_samples: 120,
        }
    }

    /// Time since the previous call, clamped to [`MAX_FRAME_DELTA`].
    pub fn delta(&mut self) -> Duration {
        let now = Instant::now();
        let dt = (now - self.last_frame).min(self.max_dt);
        self.last_frame = now;

        self.frame_times.push_back(dt);
        if self.frame_times.len() > self.max_samples {
            self.frame_times.pop_front();
        }

        dt
    }

    /// [`delta`](Self::delta) in fractional milliseconds, the unit fades use.
    pub fn delta_ms(&mut self) -> f64 {
        self.delta().as_secs_f64() * 1000.0
    }

    /// Sleep for the remainder of the frame budget.
    pub fn sleep_remainder(&self) {
        let elapsed = self.last_frame.elapsed();
        if elapsed < self.frame_budget {
            let sleep_time = self.frame_budget - elapsed;
            // Coarse sleep, then spin the last millisecond
            if sleep_time > Duration::from_millis(1) {
                std::thread::sleep(sleep_time - Duration::from_millis(1));
            }
            while self.last_frame.elapsed() < self.frame_budget {
                std::hint::spin_loop();
            }
        }
    }

    /// Frames per second averaged over recent frames.
    #[must_use]
    pub fn current_fps(&self) -> f32 {
        if self.frame_times.is_empty() {
            return 0.0;
        }

        let avg = self.frame_times.iter().sum::<Duration>().as_secs_f32() / self.frame_times.len() as f32;
        if avg > 0.0 {
            1.0 / avg
        } else {
            0.0
        }
    }

    /// The target FPS.
    #[must_use]
    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    /// The per-frame budget.
    #[must_use]
    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    /// Restart measurement, e.g. after the loop was idle.
    pub fn reset(&mut self) {
        self.last_frame = Instant::now();
        self.frame_times.clear();
    }
}

/// Tick subscription flag the host loop reads each frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameTicker {
    subscribed: bool,
    subscriptions: u64,
}

impl FrameTicker {
    /// A ticker nobody listens to yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subscribed: false,
            subscriptions: 0,
        }
    }

    /// Whether the registry wants frame ticks.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// How many times the registry subscribed so far.
    #[must_use]
    pub const fn subscriptions(&self) -> u64 {
        self.subscriptions
    }
}

impl TickSource for FrameTicker {
    fn subscribe(&mut self) {
        if !self.subscribed {
            self.subscribed = true;
            self.subscriptions += 1;
        }
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
    }
}
