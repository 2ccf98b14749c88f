//! Audio backend on top of rodio.
//!
//! Every started sound gets its own [`SpatialSink`]; the sink's emitter
//! position between two fixed ears gives stereo pan. Decoded sources are not
//! kept around: the encoded bytes are cached per alias and a fresh
//! [`Decoder`] is built for every start.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 RodioBackend                 │
//! │  ┌─────────────┐  ┌────────────────────────┐ │
//! │  │ AudioDevice │──│ channels: SpatialSink  │ │
//! │  │ (rodio)     │  │ one per ChannelId      │ │
//! │  └─────────────┘  └────────────────────────┘ │
//! │         │                     ▲              │
//! │         ▼                     │              │
//! │   OutputStream      sources: alias -> bytes  │
//! └──────────────────────────────────────────────┘
//! ```

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use cadence_common::ChannelId;
use cadence_kernel::{AudioBackend, PlatformCapabilities, StartParams, LOOP_INFINITE};
use rodio::source::Zero;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source, SpatialSink};
use thiserror::Error;
use tracing::{debug, info, warn};

/// File types rodio decodes with its default features.
pub const SUPPORTED_TYPES: [&str; 4] = ["ogg", "wav", "flac", "mp3"];

/// Default number of simultaneous channels.
pub const DEFAULT_MAX_CHANNELS: usize = 32;

const LEFT_EAR: [f32; 3] = [-1.0, 0.0, 0.0];
const RIGHT_EAR: [f32; 3] = [1.0, 0.0, 0.0];

/// Backend error types.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Failed to open the output device.
    #[error("Failed to initialize audio device: {0}")]
    DeviceInitFailed(String),

    /// Failed to create a sink on the output stream.
    #[error("Failed to create audio sink: {0}")]
    SinkCreationFailed(String),

    /// Bytes handed to the backend are not audio it can decode.
    #[error("Failed to decode '{alias}': {message}")]
    DecodeFailed {
        /// Alias the bytes belong to.
        alias: String,
        /// Decoder message.
        message: String,
    },

    /// No source cached under the alias.
    #[error("No source loaded for '{0}'")]
    SourceMissing(String),

    /// Every channel is busy and the start may not interrupt.
    #[error("No free audio channels (max: {max})")]
    ChannelsBusy {
        /// Channel limit.
        max: usize,
    },

    /// No output device.
    #[error("No audio device available")]
    NoDevice,
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Wraps rodio's output stream.
pub struct AudioDevice {
    /// The output stream (must be kept alive).
    _stream: OutputStream,
    /// Handle for creating sinks.
    handle: OutputStreamHandle,
}

impl std::fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDevice").finish_non_exhaustive()
    }
}

impl AudioDevice {
    /// Open the default output.
    pub fn open() -> BackendResult<Self> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| BackendError::DeviceInitFailed(e.to_string()))?;

        info!("Audio device initialized");
        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    /// Handle for creating sinks.
    #[must_use]
    pub fn handle(&self) -> &OutputStreamHandle {
        &self.handle
    }

    fn create_sink(&self, pan: f32) -> BackendResult<SpatialSink> {
        SpatialSink::try_new(&self.handle, emitter_position(pan), LEFT_EAR, RIGHT_EAR)
            .map_err(|e| BackendError::SinkCreationFailed(e.to_string()))
    }
}

/// Encoded audio cached for one alias.
#[derive(Debug, Clone)]
struct CachedSource {
    bytes: Arc<[u8]>,
    duration_ms: u64,
}

/// Where playback of a channel begins: a delay, a first pass from the
/// offset, then `loop_count` full passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cue {
    delay_ms: u64,
    offset_ms: u64,
    loop_count: i32,
}

impl Cue {
    fn from_params(params: &StartParams) -> Self {
        Self {
            delay_ms: params.delay_ms,
            offset_ms: params.offset_ms,
            loop_count: params.loop_count,
        }
    }
}

/// Tracks how far a channel has played, minus the time spent paused.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Playhead {
    started: Instant,
    cue: Cue,
    length_ms: u64,
    paused_for: Duration,
    paused_at: Option<Instant>,
}

impl Playhead {
    fn new(now: Instant, cue: Cue, length_ms: u64, paused: bool) -> Self {
        Self {
            started: now,
            cue,
            length_ms,
            paused_for: Duration::ZERO,
            paused_at: paused.then_some(now),
        }
    }

    fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    fn resume(&mut self, now: Instant) {
        if let Some(at) = self.paused_at.take() {
            self.paused_for += now.saturating_duration_since(at);
        }
    }

    /// Audible time since the start, delay included.
    fn elapsed_ms(&self, now: Instant) -> u64 {
        let until = self.paused_at.unwrap_or(now);
        let elapsed = until.saturating_duration_since(self.started).saturating_sub(self.paused_for);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    /// Cue that carries on from `now`, or `None` once the last pass is over.
    fn cue_at(&self, now: Instant) -> Option<Cue> {
        let elapsed = self.elapsed_ms(now);
        if elapsed < self.cue.delay_ms {
            return Some(Cue {
                delay_ms: self.cue.delay_ms - elapsed,
                ..self.cue
            });
        }

        let position = elapsed - self.cue.delay_ms + self.cue.offset_ms;
        if self.length_ms == 0 {
            return Some(Cue {
                delay_ms: 0,
                offset_ms: position,
                loop_count: self.cue.loop_count,
            });
        }

        let passes = position / self.length_ms;
        let loop_count = if self.cue.loop_count == LOOP_INFINITE {
            LOOP_INFINITE
        } else {
            let left = i64::from(self.cue.loop_count.max(0)) - i64::try_from(passes).unwrap_or(i64::MAX);
            if left < 0 {
                return None;
            }
            i32::try_from(left).unwrap_or(i32::MAX)
        };
        Some(Cue {
            delay_ms: 0,
            offset_ms: position % self.length_ms,
            loop_count,
        })
    }
}

/// One playing sound.
struct ChannelState {
    alias: String,
    sink: SpatialSink,
    volume: f32,
    pan: f32,
    length_ms: u64,
    playhead: Playhead,
}

impl std::fmt::Debug for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelState")
            .field("alias", &self.alias)
            .field("volume", &self.volume)
            .field("pan", &self.pan)
            .field("length_ms", &self.length_ms)
            .field("playhead", &self.playhead)
            .finish_non_exhaustive()
    }
}

/// [`AudioBackend`] playing through the default output device.
pub struct RodioBackend {
    // === Output ===
    device: Option<AudioDevice>,
    max_channels: usize,
    muted: bool,
    /// Report the output as prone to going stale after long silences.
    stale_recovery: bool,

    // === State ===
    sources: AHashMap<String, CachedSource>,
    channels: AHashMap<ChannelId, ChannelState>,
    next_channel: u64,
    /// Channels ended outside their sinks, reported on the next drain.
    ended: Vec<ChannelId>,
}

impl std::fmt::Debug for RodioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioBackend")
            .field("available", &self.device.is_some())
            .field("max_channels", &self.max_channels)
            .field("muted", &self.muted)
            .field("stale_recovery", &self.stale_recovery)
            .field("sources", &self.sources.len())
            .field("channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

impl RodioBackend {
    /// Open the default device, or fall back to an unavailable backend.
    pub fn open(max_channels: usize) -> Self {
        match AudioDevice::open() {
            Ok(device) => Self::with_device(Some(device), max_channels),
            Err(e) => {
                warn!("Audio disabled: {e}");
                Self::unavailable(max_channels)
            },
        }
    }

    /// Backend without an output device. Nothing it plays makes sound.
    #[must_use]
    pub fn unavailable(max_channels: usize) -> Self {
        Self::with_device(None, max_channels)
    }

    fn with_device(device: Option<AudioDevice>, max_channels: usize) -> Self {
        Self {
            device,
            max_channels: max_channels.max(1),
            muted: false,
            stale_recovery: false,
            sources: AHashMap::new(),
            channels: AHashMap::new(),
            next_channel: 1,
            ended: Vec::new(),
        }
    }

    /// Ask the registry to rebuild the output after long silences.
    #[must_use]
    pub fn with_stale_recovery(mut self, enabled: bool) -> Self {
        self.stale_recovery = enabled;
        self
    }

    /// Cache encoded audio for `alias` and return its length.
    pub fn insert_source(&mut self, alias: &str, bytes: Vec<u8>) -> BackendResult<u64> {
        let bytes: Arc<[u8]> = bytes.into();
        let duration_ms = measure_duration_ms(alias, &bytes)?;
        debug!("Cached source {alias} ({} bytes, {duration_ms} ms)", bytes.len());
        self.sources.insert(alias.to_string(), CachedSource { bytes, duration_ms });
        Ok(duration_ms)
    }

    /// Whether a source is cached for `alias`.
    #[must_use]
    pub fn has_source(&self, alias: &str) -> bool {
        self.sources.contains_key(alias)
    }

    /// Channels currently playing or paused.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Channel limit.
    #[must_use]
    pub fn max_channels(&self) -> usize {
        self.max_channels
    }

    fn decoder(&self, alias: &str) -> BackendResult<Decoder<Cursor<Arc<[u8]>>>> {
        let source = self
            .sources
            .get(alias)
            .ok_or_else(|| BackendError::SourceMissing(alias.to_string()))?;
        decode(alias, Arc::clone(&source.bytes))
    }

    fn start(&mut self, alias: &str, params: &StartParams) -> BackendResult<ChannelId> {
        let device = self.device.as_ref().ok_or(BackendError::NoDevice)?;
        let full = self.channels.len() >= self.max_channels;
        if full && !params.interrupt {
            return Err(BackendError::ChannelsBusy {
                max: self.max_channels,
            });
        }

        let cue = Cue::from_params(params);
        let pan = params.pan.clamp(-1.0, 1.0);
        let sink = self.build_sink(device, alias, cue, pan, params.volume, false)?;
        if full {
            self.interrupt_oldest();
        }

        let id = ChannelId::new(self.next_channel);
        self.next_channel += 1;
        let length_ms = self.sources.get(alias).map_or(0, |s| s.duration_ms);
        self.channels.insert(
            id,
            ChannelState {
                alias: alias.to_string(),
                sink,
                volume: params.volume,
                pan,
                length_ms,
                playhead: Playhead::new(Instant::now(), cue, length_ms, false),
            },
        );
        Ok(id)
    }

    /// Sink on `device` playing `alias` from `cue`.
    fn build_sink(
        &self,
        device: &AudioDevice,
        alias: &str,
        cue: Cue,
        pan: f32,
        volume: f32,
        paused: bool,
    ) -> BackendResult<SpatialSink> {
        let first = self
            .decoder(alias)?
            .skip_duration(Duration::from_millis(cue.offset_ms))
            .delay(Duration::from_millis(cue.delay_ms));

        let sink = device.create_sink(pan)?;
        if paused {
            sink.pause();
        }
        sink.set_volume(if self.muted { 0.0 } else { volume });
        sink.append(first);
        if cue.loop_count == LOOP_INFINITE {
            sink.append(self.decoder(alias)?.repeat_infinite());
        } else {
            for _ in 0..cue.loop_count.max(0) {
                sink.append(self.decoder(alias)?);
            }
        }
        Ok(sink)
    }

    /// Move a channel onto `device`, carrying on where it was.
    ///
    /// Returns `false` when the channel had already played out.
    fn rebuild_channel(&mut self, device: &AudioDevice, id: ChannelId, now: Instant) -> BackendResult<bool> {
        let Some(state) = self.channels.get(&id) else {
            return Ok(false);
        };
        let Some(cue) = state.playhead.cue_at(now) else {
            return Ok(false);
        };
        let paused = state.playhead.is_paused();
        let sink = self.build_sink(device, &state.alias, cue, state.pan, state.volume, paused)?;

        if let Some(state) = self.channels.get_mut(&id) {
            state.sink.stop();
            state.sink = sink;
            state.playhead = Playhead::new(now, cue, state.length_ms, paused);
        }
        Ok(true)
    }

    fn end_channel(&mut self, id: ChannelId) {
        if let Some(state) = self.channels.remove(&id) {
            debug!("Ending {} on channel {}", state.alias, id.raw());
            state.sink.stop();
        }
        self.ended.push(id);
    }

    fn interrupt_oldest(&mut self) {
        let oldest = self.channels.keys().min_by_key(|id| id.raw()).copied();
        if let Some(id) = oldest {
            self.end_channel(id);
        }
    }
}

impl AudioBackend for RodioBackend {
    fn capabilities(&self) -> PlatformCapabilities {
        if self.device.is_some() {
            PlatformCapabilities {
                stale_context_prone: self.stale_recovery,
                ..PlatformCapabilities::default()
            }
        } else {
            PlatformCapabilities::unavailable()
        }
    }

    fn supports_type(&self, extension: &str) -> bool {
        self.device.is_some() && SUPPORTED_TYPES.iter().any(|t| t.eq_ignore_ascii_case(extension))
    }

    fn play(&mut self, alias: &str, params: &StartParams) -> Option<ChannelId> {
        match self.start(alias, params) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Could not start {alias}: {e}");
                None
            },
        }
    }

    fn channel_duration_ms(&self, channel: ChannelId) -> u64 {
        self.channels.get(&channel).map_or(0, |c| c.length_ms)
    }

    fn source_duration_ms(&self, alias: &str) -> Option<u64> {
        self.sources.get(alias).map(|s| s.duration_ms)
    }

    fn stop(&mut self, channel: ChannelId) {
        if let Some(state) = self.channels.remove(&channel) {
            state.sink.stop();
        }
    }

    fn pause(&mut self, channel: ChannelId) {
        if let Some(state) = self.channels.get_mut(&channel) {
            state.sink.pause();
            state.playhead.pause(Instant::now());
        }
    }

    fn resume(&mut self, channel: ChannelId) {
        if let Some(state) = self.channels.get_mut(&channel) {
            state.sink.play();
            state.playhead.resume(Instant::now());
        }
    }

    fn set_volume(&mut self, channel: ChannelId, volume: f32) {
        let muted = self.muted;
        if let Some(state) = self.channels.get_mut(&channel) {
            state.volume = volume;
            state.sink.set_volume(if muted { 0.0 } else { volume });
        }
    }

    fn set_pan(&mut self, channel: ChannelId, pan: f32) {
        if let Some(state) = self.channels.get_mut(&channel) {
            state.pan = pan.clamp(-1.0, 1.0);
            state.sink.set_emitter_position(emitter_position(state.pan));
        }
    }

    fn drain_finished(&mut self) -> Vec<ChannelId> {
        let mut finished = std::mem::take(&mut self.ended);
        let done: Vec<ChannelId> = self
            .channels
            .iter()
            .filter(|(_, state)| state.sink.empty())
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            self.channels.remove(&id);
            finished.push(id);
        }
        finished
    }

    fn remove_source(&mut self, alias: &str) {
        if self.sources.remove(alias).is_some() {
            debug!("Dropped source {alias}");
        }
    }

    fn remove_all_sources(&mut self) {
        self.sources.clear();
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        for state in self.channels.values() {
            state.sink.set_volume(if muted { 0.0 } else { state.volume });
        }
    }

    fn is_running(&self) -> bool {
        self.device.is_some()
    }

    fn play_silent(&mut self) {
        let Some(device) = &self.device else {
            return;
        };
        match Sink::try_new(device.handle()) {
            Ok(sink) => {
                sink.append(Zero::<f32>::new(2, 44_100).take_duration(Duration::from_millis(10)));
                sink.detach();
            },
            Err(e) => warn!("Silent unlock sound failed: {e}"),
        }
    }

    fn recreate_context(&mut self) {
        let device = match AudioDevice::open() {
            Ok(device) => device,
            Err(e) => {
                warn!("Recreating audio output failed: {e}");
                return;
            },
        };

        let now = Instant::now();
        let ids: Vec<ChannelId> = self.channels.keys().copied().collect();
        for id in ids {
            match self.rebuild_channel(&device, id, now) {
                Ok(true) => {},
                Ok(false) => self.end_channel(id),
                Err(e) => {
                    warn!("Dropping channel {} while moving it: {e}", id.raw());
                    self.end_channel(id);
                },
            }
        }

        // Every sink has moved, so the old stream closes here
        self.device = Some(device);
        info!("Audio output recreated with {} channels", self.channels.len());
    }
}

fn emitter_position(pan: f32) -> [f32; 3] {
    [pan, 0.0, 0.0]
}

fn decode(alias: &str, bytes: Arc<[u8]>) -> BackendResult<Decoder<Cursor<Arc<[u8]>>>> {
    Decoder::new(Cursor::new(bytes)).map_err(|e| BackendError::DecodeFailed {
        alias: alias.to_string(),
        message: e.to_string(),
    })
}

/// Length of encoded audio in milliseconds.
///
/// Uses the container's duration when it has one, otherwise decodes the
/// whole stream and counts samples.
pub fn measure_duration_ms(alias: &str, bytes: &Arc<[u8]>) -> BackendResult<u64> {
    let decoder = decode(alias, Arc::clone(bytes))?;
    if let Some(total) = decoder.total_duration() {
        return Ok(total.as_millis() as u64);
    }

    let channels = u64::from(decoder.channels().max(1));
    let rate = u64::from(decoder.sample_rate().max(1));
    let samples = decoder.count() as u64;
    Ok(samples * 1000 / (channels * rate))
}
