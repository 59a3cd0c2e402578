use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Ingestion already in progress for index: {index_id}")]
    SyncInProgress { index_id: String },

    #[error("Ingestion job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error(transparent)]
    Provider(#[from] BridgeError),

    #[error("Filename collision on '{filename}'")]
    FilenameCollision { filename: String },

    #[error("Folder {folder_id} contains itself through a shortcut cycle")]
    TraversalCycle { folder_id: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },
}

impl SyncError {
    /// Short machine-readable name used in failure payloads
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::UnknownProfile(_) => "UnknownProfile",
            SyncError::Configuration(_) => "Configuration",
            SyncError::SyncInProgress { .. } => "SyncInProgress",
            SyncError::JobNotFound { .. } => "JobNotFound",
            SyncError::Provider(_) => "Provider",
            SyncError::FilenameCollision { .. } => "FilenameCollision",
            SyncError::TraversalCycle { .. } => "TraversalCycle",
            SyncError::Cancelled => "Cancelled",
            SyncError::InvalidJobId(_) => "InvalidJobId",
            SyncError::InvalidStatus(_) => "InvalidStatus",
            SyncError::InvalidStateTransition { .. } => "InvalidStateTransition",
        }
    }

    /// Whether a later run may succeed without any change on the caller side
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Provider(err) => err.is_transient(),
            SyncError::SyncInProgress { .. } | SyncError::Cancelled => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
