use thiserror::Error;

use shared_models::AppError;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("{provider} API error: {message}")]
    ProviderApi { provider: String, message: String },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} is not configured")]
    NotConfigured { provider: String },

    #[error("No provider named {0}")]
    UnknownProvider(String),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl MessagingError {
    pub fn api(provider: &str, message: impl Into<String>) -> Self {
        MessagingError::ProviderApi {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn transport(provider: &str, source: reqwest::Error) -> Self {
        MessagingError::Transport {
            provider: provider.to_string(),
            source,
        }
    }
}

impl From<MessagingError> for AppError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::ValidationError(_) | MessagingError::UnknownTemplate(_) => {
                AppError::ValidationError(err.to_string())
            }
            MessagingError::UnknownProvider(_) => AppError::NotFound(err.to_string()),
            MessagingError::NotConfigured { .. } => AppError::Configuration(err.to_string()),
            MessagingError::ProviderApi { .. } | MessagingError::Transport { .. } => {
                AppError::ExternalService(err.to_string())
            }
        }
    }
}
