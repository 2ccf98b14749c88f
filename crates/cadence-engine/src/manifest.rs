//! Sound manifests.
//!
//! A manifest lists registration batches and the links between contexts:
//!
//! ```toml
//! [[contexts]]
//! context = "music"
//! path = "music/"
//! sounds = ["theme", { id = "boss", src = "boss_theme", loop = true }]
//!
//! [[links]]
//! parent = "master"
//! children = ["music", "sfx"]
//! ```
//!
//! The same layout works as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use cadence_kernel::{AssetLoader, AudioBackend, ContextConfig, SoundError, SoundRegistry, TickSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Manifest loading errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The file could not be read.
    #[error("Failed to read manifest '{path}': {source}")]
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// TOML syntax or shape error.
    #[error("Invalid TOML manifest: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or shape error.
    #[error("Invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),

    /// Extension is neither `toml` nor `json`.
    #[error("Unsupported manifest format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Parent context and the contexts nested under it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextLink {
    /// Outer context.
    pub parent: String,
    /// Contexts affected by the parent's mute and pause.
    pub children: Vec<String>,
}

/// Registration batches plus context links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Batches registered in order.
    pub contexts: Vec<ContextConfig>,
    /// Links applied after every batch is registered.
    pub links: Vec<ContextLink>,
}

impl Manifest {
    /// Read a `.toml` or `.json` manifest.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let manifest = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml(&contents)?,
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json(&contents)?,
            _ => return Err(ManifestError::UnsupportedFormat(path.to_path_buf())),
        };

        info!(
            "Loaded manifest {} ({} batches, {} links)",
            path.display(),
            manifest.contexts.len(),
            manifest.links.len()
        );
        Ok(manifest)
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(text)?)
    }

    /// Parse JSON text. A bare array is read as a list of batches.
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        if text.trim_start().starts_with('[') {
            let contexts: Vec<ContextConfig> = serde_json::from_str(text)?;
            return Ok(Self {
                contexts,
                links: Vec::new(),
            });
        }
        Ok(serde_json::from_str(text)?)
    }

    /// Number of sound entries across every batch.
    #[must_use]
    pub fn sound_count(&self) -> usize {
        self.contexts.iter().map(|c| c.sounds.len()).sum()
    }

    /// Register every batch and link, returning the failures.
    ///
    /// A failing batch or link does not stop the rest.
    pub fn apply<B, L, T>(self, registry: &mut SoundRegistry<B, L, T>) -> Vec<SoundError>
    where
        B: AudioBackend,
        L: AssetLoader,
        T: TickSource,
    {
        let mut failures = Vec::new();
        for config in self.contexts {
            if let Err(e) = registry.register_context(config) {
                warn!("Manifest batch rejected: {e}");
                failures.push(e);
            }
        }
        for link in self.links {
            if let Err(e) = registry.link_contexts(&link.parent, &link.children) {
                warn!("Manifest link {} rejected: {e}", link.parent);
                failures.push(e);
            }
        }
        failures
    }
}
