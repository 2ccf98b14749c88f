//! Asynchronous load contract.
//!
//! The registry submits batches and the host feeds the loader's results back
//! through [`SoundRegistry::handle_load_event`](crate::SoundRegistry::handle_load_event).

use std::path::PathBuf;

use cadence_common::BatchId;

/// One asset to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Alias the asset is registered under. Echoed back on completion.
    pub alias: String,
    /// Resolved source path, extension included.
    pub source_path: PathBuf,
}

/// A group of requests submitted by one preload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBatch {
    /// Batch identifier, echoed back in every event for this batch.
    pub id: BatchId,
    /// Assets to load.
    pub items: Vec<LoadRequest>,
}

/// Progress reported by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// One asset finished loading.
    Loaded {
        /// Batch the asset belonged to.
        batch: BatchId,
        /// Alias of the asset.
        alias: String,
    },
    /// One asset failed to load.
    Failed {
        /// Batch the asset belonged to.
        batch: BatchId,
        /// Alias of the asset.
        alias: String,
        /// Loader-provided reason.
        reason: String,
    },
    /// Every item of the batch has been reported.
    BatchComplete {
        /// The finished batch.
        batch: BatchId,
    },
}

/// Asynchronous asset loader used by the sound registry.
pub trait AssetLoader {
    /// Start loading a batch. Results arrive later as [`LoadEvent`]s.
    fn submit(&mut self, batch: LoadBatch);
}
