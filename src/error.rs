use thiserror::Error;

/// Failures surfaced by the scoring and forecasting pipeline.
///
/// None of these are retried internally; callers decide whether to retry the
/// whole request or report the error.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The aligned matrix is missing a column the model package expects.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("fit failure: {0}")]
    FitFailure(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("invalid model artifact {path}: {reason}")]
    Artifact { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
