//! Error kinds surfaced by the decision engine and its control loop

use thiserror::Error;

/// Errors produced by the scaler library
#[derive(Debug, Error)]
pub enum ScalerError {
    /// Feature extraction was asked to run on an empty history
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Invalid weights, bounds or thresholds; fatal at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The metrics source failed to return a snapshot
    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(String),

    /// The scaling sink rejected or failed the resize call
    #[error("scale action failed: {0}")]
    ScaleActionFailed(String),

    /// Loading or saving the trained model failed
    #[error("model store error: {0}")]
    ModelStore(String),

    /// The regressor failed to fit or predict
    #[error("training error: {0}")]
    Training(String),
}

impl ScalerError {
    /// Short machine-friendly label used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            ScalerError::InsufficientData(_) => "insufficient_data",
            ScalerError::Configuration(_) => "configuration",
            ScalerError::MetricsUnavailable(_) => "metrics_unavailable",
            ScalerError::ScaleActionFailed(_) => "scale_action_failed",
            ScalerError::ModelStore(_) => "model_store",
            ScalerError::Training(_) => "training",
        }
    }

    /// Whether the control loop may carry on after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ScalerError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, ScalerError>;
