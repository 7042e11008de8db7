use thiserror::Error;

use messaging_cell::MessagingError;
use shared_models::AppError;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No schedule stored for patient {0}")]
    NotFound(String),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("Store error: {0}")]
    StoreError(#[from] anyhow::Error),
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::ValidationError(_)
            | ScheduleError::InvalidTimezone(_)
            | ScheduleError::InvalidTime(_) => AppError::ValidationError(err.to_string()),
            ScheduleError::NotFound(_) => AppError::NotFound(err.to_string()),
            ScheduleError::Messaging(e) => e.into(),
            ScheduleError::StoreError(e) => AppError::Database(e.to_string()),
        }
    }
}
