//! Native playback contract.
//!
//! The registry never touches a platform audio API directly. Everything that
//! makes sound goes through [`AudioBackend`], which hands out opaque
//! [`ChannelId`]s for the channels it is playing.

use cadence_common::ChannelId;

/// Loop count the backend interprets as "repeat forever".
pub const LOOP_INFINITE: i32 = -1;

/// Parameters for starting one native channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartParams {
    /// Whether the new channel may interrupt an older one when the backend
    /// runs out of channels.
    pub interrupt: bool,
    /// Delay before the sound starts, in milliseconds.
    pub delay_ms: u64,
    /// Offset into the sound to start from, in milliseconds.
    pub offset_ms: u64,
    /// Extra repetitions; [`LOOP_INFINITE`] loops forever.
    pub loop_count: i32,
    /// Initial effective volume (0.0-1.0), context factor already applied.
    pub volume: f32,
    /// Stereo pan (-1.0 = full left, 1.0 = full right).
    pub pan: f32,
}

impl Default for StartParams {
    fn default() -> Self {
        Self {
            interrupt: false,
            delay_ms: 0,
            offset_ms: 0,
            loop_count: 0,
            volume: 1.0,
            pan: 0.0,
        }
    }
}

impl StartParams {
    /// Whether these params request infinite looping.
    #[must_use]
    pub const fn loops_forever(&self) -> bool {
        self.loop_count == LOOP_INFINITE
    }
}

/// What the platform backend can do, probed once at registry init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// A native backend is usable at all.
    pub available: bool,
    /// The engine stays suspended until a user gesture starts it.
    pub gesture_unlock_required: bool,
    /// The engine context goes stale after a long stretch of silence.
    pub stale_context_prone: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            available: true,
            gesture_unlock_required: false,
            stale_context_prone: false,
        }
    }
}

impl PlatformCapabilities {
    /// Capabilities of a platform with no usable backend.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            available: false,
            gesture_unlock_required: false,
            stale_context_prone: false,
        }
    }
}

/// Native playback primitive used by the sound registry.
pub trait AudioBackend {
    /// Probe the platform.
    fn capabilities(&self) -> PlatformCapabilities;

    /// Whether a file type (extension without the dot) can be played.
    fn supports_type(&self, extension: &str) -> bool;

    /// Start playing the loaded source registered under `alias`.
    ///
    /// Returns `None` when playback could not start.
    fn play(&mut self, alias: &str, params: &StartParams) -> Option<ChannelId>;

    /// Length of the sound playing on a channel, in milliseconds.
    fn channel_duration_ms(&self, channel: ChannelId) -> u64;

    /// Length of a loaded source, without playing it.
    fn source_duration_ms(&self, alias: &str) -> Option<u64>;

    /// Stop a channel. Stopping does not report completion.
    fn stop(&mut self, channel: ChannelId);

    /// Pause a channel.
    fn pause(&mut self, channel: ChannelId);

    /// Resume a paused channel.
    fn resume(&mut self, channel: ChannelId);

    /// Set a channel's effective volume.
    fn set_volume(&mut self, channel: ChannelId, volume: f32);

    /// Set a channel's pan.
    fn set_pan(&mut self, channel: ChannelId, pan: f32);

    /// Channels that finished playing on their own since the last call.
    fn drain_finished(&mut self) -> Vec<ChannelId>;

    /// Release the loaded data for `alias`.
    fn remove_source(&mut self, alias: &str);

    /// Release every loaded source.
    fn remove_all_sources(&mut self);

    /// Mute or unmute all output.
    fn set_muted(&mut self, muted: bool);

    /// Whether the engine is running (not suspended waiting for a gesture).
    fn is_running(&self) -> bool;

    /// Play an inaudible primer sound to unlock a gesture-gated engine.
    fn play_silent(&mut self);

    /// Tear down and rebuild the engine context, rewiring every live channel
    /// onto fresh output while keeping its volume and pan.
    fn recreate_context(&mut self);
}
