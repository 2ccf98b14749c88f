//! # Cadence
//!
//! Command-line player for Cadence sound manifests.
//!
//! ```text
//! cadence [config.toml] [alias ...]
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("cadence=info".parse()?))
        .init();

    info!("Cadence starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    cadence_engine::app::run()?;

    info!("Cadence shutdown complete");
    Ok(())
}
