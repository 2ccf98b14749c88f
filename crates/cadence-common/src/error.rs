//! Error types for Cadence.
//!
//! None of these are fatal. Registry operations log the failure, leave their
//! state consistent, fire any completion callback they were handed and then
//! return the error so callers can react if they care.

use thiserror::Error;

/// Error reported by sound registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SoundError {
    /// No sound is registered under the alias.
    #[error("Sound alias '{0}' not found")]
    UnknownAlias(String),

    /// No context is registered under the name.
    #[error("Sound context '{0}' not found")]
    UnknownContext(String),

    /// The native backend refused to start playback.
    #[error("Playback failed to start for '{0}'")]
    StartFailed(String),

    /// Registration was handed an empty or invalid config.
    #[error("Misconfigured sound registration: {0}")]
    Misconfigured(String),

    /// No usable native audio backend on this platform.
    #[error("Audio is not supported on this platform")]
    Unsupported,

    /// A registry is already alive on this thread.
    #[error("Sound registry already initialized")]
    AlreadyInitialized,

    /// The instance handle is stale or was never issued.
    #[error("Invalid instance handle")]
    InvalidHandle,

    /// Linking the contexts would make a context its own descendant.
    #[error("Linking '{child}' under '{parent}' would create a cycle")]
    ContextCycle {
        /// Context that would become the parent.
        parent: String,
        /// Context that would become the child.
        child: String,
    },

    /// The loader reported a failure for the alias.
    #[error("Failed to load '{alias}': {reason}")]
    LoadFailed {
        /// Alias whose asset failed to load.
        alias: String,
        /// Loader-provided reason.
        reason: String,
    },
}

/// Result type alias for sound operations.
pub type SoundResult<T> = Result<T, SoundError>;
