use thiserror::Error;

use shared_models::AppError;

#[derive(Error, Debug)]
pub enum ThresholdError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unknown threshold type: {0}")]
    UnknownThresholdType(String),

    #[error("Unknown vital type: {0}")]
    UnknownVitalType(String),

    #[error("Store error: {0}")]
    StoreError(#[from] anyhow::Error),
}

impl From<ThresholdError> for AppError {
    fn from(err: ThresholdError) -> Self {
        match err {
            ThresholdError::ValidationError(_)
            | ThresholdError::UnknownThresholdType(_)
            | ThresholdError::UnknownVitalType(_) => AppError::ValidationError(err.to_string()),
            ThresholdError::StoreError(e) => AppError::Database(e.to_string()),
        }
    }
}
