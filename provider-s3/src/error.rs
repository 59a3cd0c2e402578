//! Error types for S3 provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum S3Error {
    /// S3 returned an error document
    #[error("S3 error (status {status_code}, code {code}): {message}")]
    ApiError {
        status_code: u16,
        code: String,
        message: String,
    },

    #[error("Object not found: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    #[error("Slow down requested by S3")]
    SlowDown,

    #[error("Failed to parse S3 response: {0}")]
    ParseError(String),

    #[error("Invalid S3 configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, S3Error>;

impl From<S3Error> for BridgeError {
    fn from(error: S3Error) -> Self {
        match error {
            S3Error::ApiError {
                status_code,
                code,
                message,
            } => BridgeError::Remote {
                status_code,
                message: format!("S3 {}: {}", code, message),
            },
            S3Error::NoSuchKey { bucket, key } => {
                BridgeError::NotFound(format!("{}/{}", bucket, key))
            }
            S3Error::SlowDown => BridgeError::RateLimited {
                retry_after_seconds: 1,
            },
            S3Error::ParseError(msg) => BridgeError::OperationFailed(format!("Parse error: {}", msg)),
            S3Error::InvalidConfig(msg) => BridgeError::NotAvailable(msg),
            S3Error::BridgeError(e) => e,
        }
    }
}
