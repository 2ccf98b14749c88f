//! Threaded file loader.
//!
//! Batches are split into jobs and read by a small worker pool. Results come
//! back over a channel the host drains once per frame with
//! [`FileLoader::poll`]. A batch's [`LoadEvent::BatchComplete`] is sent by the
//! worker that finishes its last item, after that item's own event.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ahash::AHashMap;
use cadence_common::BatchId;
use cadence_kernel::{AssetLoader, LoadBatch, LoadEvent, LoadRequest};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Failure reading one sound file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("Failed to read '{path}': {source}")]
    Read {
        /// Path that was tried.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The file exists but holds nothing.
    #[error("Sound file '{0}' is empty")]
    Empty(PathBuf),
}

/// One loader result, with the file contents when the read succeeded.
#[derive(Debug)]
pub struct LoadOutcome {
    /// Event to forward to the registry.
    pub event: LoadEvent,
    /// Bytes for a [`LoadEvent::Loaded`] event.
    pub data: Option<Vec<u8>>,
}

struct Job {
    batch: BatchId,
    request: LoadRequest,
}

type Outstanding = Arc<Mutex<AHashMap<BatchId, usize>>>;

/// [`AssetLoader`] reading files on worker threads.
pub struct FileLoader {
    root: PathBuf,
    jobs: Option<Sender<Job>>,
    results_tx: Sender<LoadOutcome>,
    results: Receiver<LoadOutcome>,
    outstanding: Outstanding,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for FileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLoader")
            .field("root", &self.root)
            .field("workers", &self.workers.len())
            .field("outstanding", &self.outstanding.lock().len())
            .finish_non_exhaustive()
    }
}

impl FileLoader {
    /// Create a loader resolving paths against `root` with `threads` workers.
    pub fn new(root: impl Into<PathBuf>, threads: usize) -> Self {
        let root = root.into();
        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        let (results_tx, results) = unbounded();
        let outstanding: Outstanding = Arc::new(Mutex::new(AHashMap::new()));

        let mut workers = Vec::new();
        for idx in 0..threads.max(1) {
            let jobs = jobs_rx.clone();
            let results = results_tx.clone();
            let outstanding = Arc::clone(&outstanding);
            let root = root.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("cadence-loader-{idx}"))
                .spawn(move || worker_loop(&root, &jobs, &results, &outstanding));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => error!("Failed to spawn loader thread {idx}: {e}"),
            }
        }
        if workers.is_empty() {
            warn!("No loader threads running, files will be read on submit");
        }

        debug!("File loader started with {} workers", workers.len());

        Self {
            root,
            jobs: Some(jobs_tx),
            results_tx,
            results,
            outstanding,
            workers,
        }
    }

    /// Directory paths are resolved against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of batches with unread items.
    #[must_use]
    pub fn batches_in_flight(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Whether any batch is still being read or results wait to be polled.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.batches_in_flight() > 0 || !self.results.is_empty()
    }

    /// Drain every result ready right now.
    pub fn poll(&mut self) -> Vec<LoadOutcome> {
        self.results.try_iter().collect()
    }

    /// Wait up to `timeout` for the next result.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Option<LoadOutcome> {
        match self.results.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn dispatch(&self, job: Job) {
        let queued = match &self.jobs {
            Some(jobs) if !self.workers.is_empty() => jobs.send(job).map_err(|e| e.into_inner()),
            _ => Err(job),
        };
        if let Err(Job { batch, request }) = queued {
            debug!("Reading {} on the calling thread", request.alias);
            run_job(&self.root, batch, request, &self.results_tx, &self.outstanding);
        }
    }
}

impl AssetLoader for FileLoader {
    fn submit(&mut self, batch: LoadBatch) {
        let LoadBatch { id, items } = batch;
        if items.is_empty() {
            // Nothing to read, report completion right away
            send_outcome(
                &self.results_tx,
                LoadOutcome {
                    event: LoadEvent::BatchComplete { batch: id },
                    data: None,
                },
            );
            return;
        }

        debug!("Submitting load batch {} with {} items", id.raw(), items.len());
        self.outstanding.lock().insert(id, items.len());
        for request in items {
            self.dispatch(Job { batch: id, request });
        }
    }
}

impl Drop for FileLoader {
    fn drop(&mut self) {
        self.jobs = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Loader thread panicked");
            }
        }
    }
}

fn worker_loop(root: &Path, jobs: &Receiver<Job>, results: &Sender<LoadOutcome>, outstanding: &Outstanding) {
    for Job { batch, request } in jobs {
        run_job(root, batch, request, results, outstanding);
    }
}

fn run_job(root: &Path, batch: BatchId, request: LoadRequest, results: &Sender<LoadOutcome>, outstanding: &Outstanding) {
    let path = root.join(&request.source_path);
    let outcome = match read_sound(&path) {
        Ok(bytes) => LoadOutcome {
            event: LoadEvent::Loaded {
                batch,
                alias: request.alias,
            },
            data: Some(bytes),
        },
        Err(e) => {
            warn!("Loading {} failed: {e}", request.alias);
            LoadOutcome {
                event: LoadEvent::Failed {
                    batch,
                    alias: request.alias,
                    reason: e.to_string(),
                },
                data: None,
            }
        },
    };
    send_outcome(results, outcome);

    // Completion goes out before the batch leaves the table so `is_busy`
    // never reports idle with the event still unsent.
    let mut outstanding = outstanding.lock();
    match outstanding.get_mut(&batch) {
        Some(left) if *left > 1 => *left -= 1,
        Some(_) => {
            send_outcome(
                results,
                LoadOutcome {
                    event: LoadEvent::BatchComplete { batch },
                    data: None,
                },
            );
            outstanding.remove(&batch);
        },
        None => {},
    }
}

fn send_outcome(results: &Sender<LoadOutcome>, outcome: LoadOutcome) {
    if let Err(e) = results.send(outcome) {
        debug!("Dropping load result after shutdown: {:?}", e.into_inner().event);
    }
}

/// Read a sound file fully into memory.
pub fn read_sound(path: &Path) -> Result<Vec<u8>, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    Ok(bytes)
}
