//! Error types for trackable loading and projection updates.

use thiserror::Error;

use crate::integration::StagingError;

/// Errors raised while loading trackables or updating camera projections.
///
/// None of these escape the per-tick update path: the pipeline isolates
/// per-trackable failures and logs them, so one broken trackable cannot
/// block the others in the same tick.
#[derive(Debug, Error)]
pub enum TrackError {
    /// The trackable configuration is missing a required payload for its
    /// kind. Fatal to the load attempt; not retried automatically.
    #[error("invalid trackable configuration: {0}")]
    Configuration(String),

    /// Asset staging failed. Fatal to the load attempt; retryable only via
    /// an explicit re-load.
    #[error("asset staging failed: {0}")]
    AssetUnavailable(#[from] StagingError),

    /// The tracking engine has not started yet. Transient; the registry
    /// retries silently on the next tick.
    #[error("tracking engine not started")]
    EngineNotStarted,

    /// A call into the tracking engine failed.
    #[error("engine call failed: {0}")]
    Engine(String),

    /// The engine refused to produce a projection matrix. The previously
    /// set projection is retained.
    #[error("projection unavailable: {0}")]
    Projection(String),
}

impl TrackError {
    /// Whether the load attempt that produced this error should be marked
    /// failed (sticky) rather than silently retried next tick.
    pub fn is_sticky(&self) -> bool {
        !matches!(self, TrackError::EngineNotStarted)
    }
}
