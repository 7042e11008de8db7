use thiserror::Error;

use care_team_cell::CareTeamError;
use messaging_cell::MessagingError;
use shared_models::AppError;
use threshold_cell::ThresholdError;

#[derive(Error, Debug)]
pub enum AlertingError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    CareTeam(#[from] CareTeamError),

    #[error("Store error: {0}")]
    StoreError(#[from] anyhow::Error),
}

impl From<AlertingError> for AppError {
    fn from(err: AlertingError) -> Self {
        match err {
            AlertingError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            AlertingError::NotFound(_) => AppError::NotFound(err.to_string()),
            AlertingError::Threshold(e) => e.into(),
            AlertingError::Messaging(e) => e.into(),
            AlertingError::CareTeam(e) => e.into(),
            AlertingError::StoreError(e) => AppError::Database(e.to_string()),
        }
    }
}
