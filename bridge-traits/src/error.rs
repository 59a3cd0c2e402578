use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Remote service error (status {status_code}): {message}")]
    Remote { status_code: u16, message: String },

    #[error("Rate limited by remote service, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure is worth retrying later (rate limits, network, 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::RateLimited { .. } | BridgeError::Network(_) => true,
            BridgeError::Remote { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BridgeError::RateLimited {
            retry_after_seconds: 2
        }
        .is_transient());
        assert!(BridgeError::Network("connection reset".to_string()).is_transient());
        assert!(BridgeError::Remote {
            status_code: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!BridgeError::Remote {
            status_code: 404,
            message: "missing".to_string()
        }
        .is_transient());
        assert!(!BridgeError::NotFound("file-1".to_string()).is_transient());
    }
}
