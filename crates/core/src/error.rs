use crate::analysis::AnalysisStatus;
use crate::metrics::MetricName;
use crate::reference::ExerciseType;

/// Validation and state errors for domain objects and configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AnalysisStatus,
        to: AnalysisStatus,
    },

    #[error("Analysis is frozen in status {0}")]
    Frozen(AnalysisStatus),
}

/// Fatal errors raised by the analysis stages.
///
/// Any of these moves the owning run to `failed`; the display text is the
/// reason recorded on the analysis.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Insufficient data: {valid} valid frames, at least {required} required")]
    InsufficientData { valid: usize, required: usize },

    #[error("No reference configuration for exercise type '{0}'")]
    ConfigurationMissing(ExerciseType),

    #[error("Analysis cancelled: {0}")]
    Cancelled(String),
}

/// A metric that could not be computed for this sequence.
///
/// Never fatal: the extractor substitutes [`NEUTRAL_SCORE`](crate::metrics::NEUTRAL_SCORE)
/// and reports the error alongside the metrics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{metric} is indeterminate: {reason}")]
pub struct DegenerateMetricError {
    pub metric: MetricName,
    pub reason: &'static str,
}
