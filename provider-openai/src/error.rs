//! Error types for OpenAI provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenAiError {
    #[error("OpenAI API error (status {status_code}, type {error_type}): {message}")]
    ApiError {
        status_code: u16,
        error_type: String,
        message: String,
    },

    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, OpenAiError>;

impl From<OpenAiError> for BridgeError {
    fn from(error: OpenAiError) -> Self {
        match error {
            OpenAiError::ApiError {
                status_code,
                error_type,
                message,
            } => BridgeError::Remote {
                status_code,
                message: format!("OpenAI {}: {}", error_type, message),
            },
            OpenAiError::RateLimitExceeded {
                retry_after_seconds,
            } => BridgeError::RateLimited {
                retry_after_seconds,
            },
            OpenAiError::NotFound(resource) => BridgeError::NotFound(resource),
            OpenAiError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            OpenAiError::BridgeError(e) => e,
        }
    }
}
