//! Payloads returned to the request layer

use serde::{Deserialize, Serialize};

use crate::report::SyncSummary;
use crate::SyncError;

pub const SENT_TO_INDEX_MESSAGE: &str = "Transfer status details sent to vector store";
pub const NOTHING_UPLOADED: &str = "No files uploaded";

/// `details` of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IngestionDetails {
    Summary(SyncSummary),
    Note(String),
}

/// Outcome of `run_ingestion`. Failures are data, never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IngestionResponse {
    Success {
        message: String,
        details: IngestionDetails,
    },
    Failure {
        status: String,
        message: String,
        error: String,
        #[serde(rename = "type")]
        kind: String,
    },
    /// The profile has no source to ingest from
    Skipped { message: String },
}

impl IngestionResponse {
    pub fn synchronized(summary: SyncSummary) -> Self {
        IngestionResponse::Success {
            message: SENT_TO_INDEX_MESSAGE.to_string(),
            details: IngestionDetails::Summary(summary),
        }
    }

    pub fn nothing_uploaded() -> Self {
        IngestionResponse::Success {
            message: SENT_TO_INDEX_MESSAGE.to_string(),
            details: IngestionDetails::Note(NOTHING_UPLOADED.to_string()),
        }
    }

    pub fn no_source(profile: &str) -> Self {
        IngestionResponse::Skipped {
            message: format!("No source configured for {}", profile),
        }
    }

    pub fn failure(profile: &str, err: &SyncError) -> Self {
        IngestionResponse::Failure {
            status: "error".to_string(),
            message: format!("Unexpected error while refreshing the index for {}", profile),
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IngestionResponse::Success { .. })
    }

    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            IngestionResponse::Success {
                details: IngestionDetails::Summary(summary),
                ..
            } => Some(summary),
            _ => None,
        }
    }

    /// `message` field of any variant
    pub fn message(&self) -> &str {
        match self {
            IngestionResponse::Success { message, .. }
            | IngestionResponse::Failure { message, .. }
            | IngestionResponse::Skipped { message } => message,
        }
    }
}

/// Outcome of clearing an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearIndexResponse {
    pub deleted_count: usize,
}

/// Outcome of clearing a document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearDocumentsResponse {
    pub message: String,
    pub deleted_file_ids: Vec<String>,
}
