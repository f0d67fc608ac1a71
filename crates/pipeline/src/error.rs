use physio_core::analysis::AnalysisKey;
use physio_core::error::{AnalysisError, CoreError};

/// Errors from an [`AnalysisStore`](crate::store::AnalysisStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Analysis {0} not found")]
    NotFound(AnalysisKey),

    /// The update closure rejected the mutation; the record is unchanged.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors returned by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A run for this key is already pending or analyzing.
    #[error("An analysis for {0} is already in progress")]
    ConcurrentRunRejected(AnalysisKey),

    #[error("Analysis {0} is already completed")]
    AlreadyCompleted(AnalysisKey),

    #[error("Analysis {0} not found")]
    NotFound(AnalysisKey),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(StoreError),

    /// The run task panicked or was aborted.
    #[error("Analysis task failed: {0}")]
    Join(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => PipelineError::NotFound(key),
            StoreError::Rejected(core) => PipelineError::Core(core),
            other => PipelineError::Store(other),
        }
    }
}
