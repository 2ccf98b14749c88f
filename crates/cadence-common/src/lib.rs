//! # Cadence Common
//!
//! Shared types for the Cadence sound runtime.
//!
//! This crate provides the vocabulary used across all Cadence crates:
//! - Handle types (`InstanceHandle`, `ChannelId`, `BatchId`)
//! - The error taxonomy (`SoundError`, `SoundResult`)
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
}

pub use prelude::*;
