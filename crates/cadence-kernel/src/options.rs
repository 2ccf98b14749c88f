//! Play request options.

use std::fmt;

use crate::backend::LOOP_INFINITE;

/// One-shot callback fired on playback start or completion.
pub type Callback = Box<dyn FnOnce()>;

/// How often a sound should repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Repeat this many extra times (0 plays once).
    Count(u32),
    /// Repeat until stopped.
    Infinite,
}

impl LoopMode {
    /// Native loop count, [`LOOP_INFINITE`] for infinite.
    ///
    /// Counts above `i32::MAX` saturate instead of wrapping to infinite.
    #[must_use]
    pub fn as_count(self) -> i32 {
        match self {
            Self::Count(n) => i32::try_from(n).unwrap_or(i32::MAX),
            Self::Infinite => LOOP_INFINITE,
        }
    }
}

impl From<bool> for LoopMode {
    fn from(looping: bool) -> Self {
        if looping {
            Self::Infinite
        } else {
            Self::Count(0)
        }
    }
}

impl From<i32> for LoopMode {
    fn from(count: i32) -> Self {
        if count < 0 {
            Self::Infinite
        } else {
            Self::Count(count as u32)
        }
    }
}

/// Options for [`SoundRegistry::play`](crate::SoundRegistry::play).
///
/// Unset fields fall back to the sound's registered defaults.
#[derive(Default)]
pub struct PlayOptions {
    /// Fired when playback finishes, fails to start or the alias is unknown.
    pub on_complete: Option<Callback>,
    /// Fired once playback actually starts.
    pub on_start: Option<Callback>,
    /// Allow interrupting older channels when the backend is saturated.
    pub interrupt: bool,
    /// Start delay in milliseconds.
    pub delay_ms: u64,
    /// Start offset in milliseconds.
    pub offset_ms: u64,
    /// Loop override.
    pub looping: Option<LoopMode>,
    /// Volume override (0.0-1.0).
    pub volume: Option<f32>,
    /// Stereo pan (-1.0-1.0).
    pub pan: f32,
}

impl fmt::Debug for PlayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayOptions")
            .field("on_complete", &self.on_complete.is_some())
            .field("on_start", &self.on_start.is_some())
            .field("interrupt", &self.interrupt)
            .field("delay_ms", &self.delay_ms)
            .field("offset_ms", &self.offset_ms)
            .field("looping", &self.looping)
            .field("volume", &self.volume)
            .field("pan", &self.pan)
            .finish()
    }
}

impl PlayOptions {
    /// Options with every field defaulted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional form kept for callers ported from the older call style.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn legacy(
        on_complete: Option<Callback>,
        on_start: Option<Callback>,
        interrupt: bool,
        delay_ms: u64,
        offset_ms: u64,
        looping: Option<LoopMode>,
        volume: Option<f32>,
        pan: f32,
    ) -> Self {
        Self {
            on_complete,
            on_start,
            interrupt,
            delay_ms,
            offset_ms,
            looping,
            volume,
            pan,
        }
    }

    /// Set the completion callback.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Set the start callback.
    #[must_use]
    pub fn on_start(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.on_start = Some(Box::new(callback));
        self
    }

    /// Allow interrupting older channels.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: bool) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Set the start delay.
    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Set the start offset.
    #[must_use]
    pub fn with_offset_ms(mut self, offset_ms: u64) -> Self {
        self.offset_ms = offset_ms;
        self
    }

    /// Override looping; accepts `bool`, a count, or a [`LoopMode`].
    #[must_use]
    pub fn with_loop(mut self, looping: impl Into<LoopMode>) -> Self {
        self.looping = Some(looping.into());
        self
    }

    /// Override the volume.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Set the pan.
    #[must_use]
    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self
    }

    /// Native loop count given the sound's default looping flag.
    #[must_use]
    pub fn loop_count(&self, default_loop: bool) -> i32 {
        match self.looping {
            Some(mode) => mode.as_count(),
            None if default_loop => LOOP_INFINITE,
            None => 0,
        }
    }
}
