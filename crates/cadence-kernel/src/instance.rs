//! Playback instances and the pool that recycles them.
//!
//! Every `play` call yields a [`PlaybackInstance`]. Instances are allocated
//! once and cycle between the pool's free list and exactly one owning sound,
//! so heavy play traffic does not churn the allocator.
//!
//! ```text
//!   acquire ──► in use (active or pending) ──► release
//!      ▲                                          │
//!      └──────────────── free list ◄──────────────┘
//! ```

use std::fmt;

use cadence_common::{ChannelId, InstanceHandle};
use tracing::{debug, warn};

use crate::backend::StartParams;
use crate::fade::FadeState;
use crate::options::Callback;

/// One playback occurrence of a sound, active or waiting for its load.
#[derive(Default)]
pub struct PlaybackInstance {
    /// Alias of the owning sound; `None` while pooled.
    alias: Option<String>,
    /// Native channel; `None` while pending or pooled.
    channel: Option<ChannelId>,
    /// Volume before context scaling (0.0-1.0).
    pub(crate) current_volume: f32,
    /// Stereo pan.
    pub(crate) pan: f32,
    /// Length of the playing sound in milliseconds.
    pub(crate) length_ms: u64,
    /// Active fade, if any.
    pub(crate) fade: Option<FadeState>,
    /// Paused, individually or in bulk.
    pub(crate) paused: bool,
    /// Paused by the pause-all operation rather than individually.
    pub(crate) globally_paused: bool,
    pub(crate) on_complete: Option<Callback>,
    pub(crate) on_start: Option<Callback>,
    /// Start params kept while waiting for the load to finish.
    pub(crate) deferred: Option<StartParams>,
    valid: bool,
    generation: u32,
}

impl fmt::Debug for PlaybackInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackInstance")
            .field("alias", &self.alias)
            .field("channel", &self.channel)
            .field("current_volume", &self.current_volume)
            .field("pan", &self.pan)
            .field("paused", &self.paused)
            .field("globally_paused", &self.globally_paused)
            .field("fade", &self.fade)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl PlaybackInstance {
    /// Alias of the owning sound.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Native channel, once playback has started.
    #[must_use]
    pub const fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    /// Volume before context scaling.
    #[must_use]
    pub const fn volume(&self) -> f32 {
        self.current_volume
    }

    /// Stereo pan.
    #[must_use]
    pub const fn pan(&self) -> f32 {
        self.pan
    }

    /// Length of the sound in milliseconds (0 while pending).
    #[must_use]
    pub const fn length_ms(&self) -> u64 {
        self.length_ms
    }

    /// Whether the instance is paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the pause came from the pause-all operation.
    #[must_use]
    pub const fn is_globally_paused(&self) -> bool {
        self.globally_paused
    }

    /// Whether a fade is running on this instance.
    #[must_use]
    pub const fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Whether the instance is still waiting for its sound to load.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.valid && self.channel.is_none()
    }

    /// Whether the instance is bound to a sound (not pooled).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_channel(&mut self, channel: ChannelId, length_ms: u64) {
        self.channel = Some(channel);
        self.length_ms = length_ms;
    }

    fn bind(&mut self, channel: Option<ChannelId>, alias: &str, length_ms: u64) {
        self.alias = Some(alias.to_string());
        self.channel = channel;
        self.length_ms = length_ms;
        self.valid = true;
    }

    fn reset(&mut self) {
        self.alias = None;
        self.channel = None;
        self.on_complete = None;
        self.on_start = None;
        self.deferred = None;
        self.fade = None;
        self.current_volume = 0.0;
        self.pan = 0.0;
        self.length_ms = 0;
        self.paused = false;
        self.globally_paused = false;
        self.valid = false;
    }
}

/// Arena of playback instances with a free list.
#[derive(Debug, Default)]
pub struct InstancePool {
    /// Every instance ever allocated.
    slots: Vec<PlaybackInstance>,
    /// Indices of pooled slots, most recently released last.
    free: Vec<u32>,
}

impl InstancePool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool with `capacity` instances allocated up front.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
        };
        for idx in 0..capacity {
            pool.slots.push(PlaybackInstance::default());
            pool.free.push((capacity - 1 - idx) as u32);
        }
        debug!("Created instance pool with {} instances", capacity);
        pool
    }

    /// Number of instances ever allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of pooled instances ready for reuse.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of instances currently bound to a sound.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether the slot behind `handle` is pooled.
    ///
    /// A handle from before the slot's last release counts as pooled too.
    #[must_use]
    pub fn is_pooled(&self, handle: InstanceHandle) -> bool {
        self.slots
            .get(handle.index() as usize)
            .is_some_and(|slot| !slot.valid || slot.generation != handle.generation())
    }

    /// Take an instance from the pool, or allocate one, and bind it.
    pub fn acquire(&mut self, channel: Option<ChannelId>, alias: &str, length_ms: u64) -> InstanceHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(PlaybackInstance::default());
                (self.slots.len() - 1) as u32
            },
        };

        let slot = &mut self.slots[index as usize];
        slot.bind(channel, alias, length_ms);
        InstanceHandle::new(index, slot.generation)
    }

    /// Return an instance to the pool.
    ///
    /// Returns `false` if the handle is stale or already released.
    pub fn release(&mut self, handle: InstanceHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index() as usize) else {
            warn!("Release of unknown instance {}", handle);
            return false;
        };
        if !slot.valid || slot.generation != handle.generation() {
            debug!("Ignoring double release of instance {}", handle);
            return false;
        }

        slot.reset();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        true
    }

    /// Look up a live instance.
    #[must_use]
    pub fn get(&self, handle: InstanceHandle) -> Option<&PlaybackInstance> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.valid && slot.generation == handle.generation())
    }

    /// Look up a live instance mutably.
    pub fn get_mut(&mut self, handle: InstanceHandle) -> Option<&mut PlaybackInstance> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.valid && slot.generation == handle.generation())
    }

    /// Handles of every live instance.
    pub fn live_handles(&self) -> impl Iterator<Item = InstanceHandle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.valid)
            .map(|(idx, slot)| InstanceHandle::new(idx as u32, slot.generation))
    }
}
