//! # Cadence Engine
//!
//! Desktop host for the Cadence sound runtime. Supplies the concrete
//! collaborators the kernel's registry is generic over:
//!
//! - [`RodioBackend`](rodio_backend::RodioBackend): playback through rodio
//! - [`FileLoader`](file_loader::FileLoader): threaded file reads
//! - [`FrameTicker`](timing::FrameTicker): frame tick subscription
//!
//! and the [`SoundApp`](app::SoundApp) loop that ties them together.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod app;
pub mod config;
pub mod file_loader;
pub mod manifest;
pub mod rodio_backend;
pub mod timing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::app::*;
    pub use crate::config::*;
    pub use crate::file_loader::*;
    pub use crate::manifest::*;
    pub use crate::rodio_backend::*;
    pub use crate::timing::*;
}

pub use prelude::*;
