use thiserror::Error;

use shared_models::AppError;

#[derive(Error, Debug)]
pub enum CareTeamError {
    #[error("Invalid clinic timezone: {0}")]
    InvalidTimezone(String),

    #[error("Store error: {0}")]
    StoreError(#[from] anyhow::Error),
}

impl From<CareTeamError> for AppError {
    fn from(err: CareTeamError) -> Self {
        match err {
            CareTeamError::InvalidTimezone(_) => AppError::Configuration(err.to_string()),
            CareTeamError::StoreError(e) => AppError::Database(e.to_string()),
        }
    }
}
