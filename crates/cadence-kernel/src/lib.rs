//! # Cadence Kernel
//!
//! The sound runtime core.
//!
//! This crate tracks named sounds from registration through loading,
//! playback, fading, pausing and unloading:
//! - Sound registry keyed by alias, with deferred playback while loading
//! - Pooled playback instances addressed by generational handles
//! - Context graph for grouped volume, mute, pause and stop
//! - Tick-driven linear fades
//! - Platform workarounds (gesture unlock, stale-context recovery)
//!
//! ## Collaborators
//!
//! The kernel does not decode or output audio itself. Hosts plug in:
//! - [`AudioBackend`]: native channels
//! - [`AssetLoader`]: asynchronous loading
//! - [`TickSource`]: per-frame ticks while fades run
//!
//! ## Event Flow
//!
//! Everything runs on one thread. Loader results, finished channels and frame
//! time are fed back by the host:
//! - `handle_load_event` for each [`LoadEvent`]
//! - `poll_channels` once per frame
//! - `tick` once per frame while subscribed

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod config;
pub mod context;
pub mod definition;
pub mod fade;
pub mod guard;
pub mod instance;
pub mod loader;
pub mod options;
pub mod registry;
pub mod tick;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::config::*;
    pub use crate::context::*;
    pub use crate::definition::*;
    pub use crate::fade::*;
    pub use crate::guard::*;
    pub use crate::instance::*;
    pub use crate::loader::*;
    pub use crate::options::*;
    pub use crate::registry::*;
    pub use crate::tick::*;
    pub use cadence_common::{BatchId, ChannelId, InstanceHandle, SoundError, SoundResult};
}

pub use prelude::*;
