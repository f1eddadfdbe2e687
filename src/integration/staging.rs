//! Asynchronous staging of trackable asset files.
//!
//! Some trackable kinds need files on local disk before the engine can load
//! them (multimarker configs, NFT datasets, 2D target images). On platforms
//! where assets ship packaged or remote, staging can span many ticks, so it
//! runs as a background task the registry polls. The per-frame tick is never
//! blocked on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use thiserror::Error;

/// Staging failure. Fatal to the load attempt that requested it; the
/// trackable is marked failed and not retried automatically.
#[derive(Debug, Clone, Error)]
pub enum StagingError {
    #[error("asset not found: {0}")]
    Missing(String),

    #[error("fetch failed for {path}: {reason}")]
    Fetch { path: String, reason: String },
}

/// Resolves asset references to locally resident files.
///
/// `stage` is allowed to block (network fetch, archive extraction); it runs
/// on a background thread, never on the tick path.
pub trait AssetStore: Send + Sync {
    /// Whether the asset is already locally resident. Resident assets skip
    /// the background task entirely.
    fn resident(&self, path: &str) -> bool;

    /// Fetch the assets into the local cache, returning their resolved
    /// local paths in input order.
    fn stage(&self, paths: &[String]) -> Result<Vec<PathBuf>, StagingError>;
}

/// Store for assets that are plain files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResidentStore;

impl AssetStore for ResidentStore {
    fn resident(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn stage(&self, paths: &[String]) -> Result<Vec<PathBuf>, StagingError> {
        let mut out = Vec::with_capacity(paths.len());
        for p in paths {
            if !Path::new(p).exists() {
                return Err(StagingError::Missing(p.clone()));
            }
            out.push(PathBuf::from(p));
        }
        Ok(out)
    }
}

/// Result of polling a [`StagingTask`].
#[derive(Debug)]
pub enum StagingPoll {
    /// Still running; poll again next tick.
    Pending,
    Ready(Result<Vec<PathBuf>, StagingError>),
}

/// Handle to one in-flight staging run.
///
/// Carries the generation of the trackable that requested it: if the
/// trackable was unloaded in the meantime the generations no longer match
/// and the completed result is discarded, so a late completion can never
/// write to a since-reset trackable.
#[derive(Debug)]
pub struct StagingTask {
    rx: Receiver<Result<Vec<PathBuf>, StagingError>>,
    generation: u64,
}

impl StagingTask {
    /// Spawn the staging run on a background thread.
    pub fn spawn(store: Arc<dyn AssetStore>, paths: Vec<String>, generation: u64) -> Self {
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            // the receiver may be gone if the task was abandoned
            let _ = tx.send(store.stage(&paths));
        });
        Self { rx, generation }
    }

    /// Generation of the requesting trackable at spawn time.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Non-blocking check for completion.
    pub fn poll(&self) -> StagingPoll {
        match self.rx.try_recv() {
            Ok(result) => StagingPoll::Ready(result),
            Err(TryRecvError::Empty) => StagingPoll::Pending,
            Err(TryRecvError::Disconnected) => StagingPoll::Ready(Err(StagingError::Fetch {
                path: String::new(),
                reason: "staging worker terminated".into(),
            })),
        }
    }
}
