use thiserror::Error;

use crate::types::Mode;

/// Result type alias for keepstack operations.
pub type Result<T> = std::result::Result<T, KeepstackError>;

#[derive(Error, Debug)]
pub enum KeepstackError {
    /// Extraction capability is missing or threw. Treated as an empty round
    /// by the engine, never fatal.
    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    /// The persistent store rejected a chunk after retry exhaustion. Fatal
    /// for the run.
    #[error("Background merge failed: {0}")]
    BackgroundMergeFailure(String),

    /// A target sub-view never stabilized within the route timeout. The
    /// orchestrator skips the target and continues.
    #[error("Navigation timeout: {0}")]
    NavigationTimeout(String),

    /// A start request arrived while this mode's engine was already active.
    #[error("{0} collection is already running")]
    AlreadyRunning(Mode),

    /// Invalid mode string. Rejected before any state mutation.
    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
