//! Search Index Abstraction
//!
//! A named index holds membership entries for documents. Entries are created
//! by batch submission and mutated asynchronously by the backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Hard ceiling on document ids per batch imposed by the index backend
pub const MAX_BATCH_SIZE: usize = 50;

/// Membership status of a document inside an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::InProgress => "in_progress",
            IndexStatus::Completed => "completed",
            IndexStatus::Failed => "failed",
            IndexStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the backend has stopped working on the entry
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IndexStatus::InProgress)
    }
}

impl FromStr for IndexStatus {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(IndexStatus::InProgress),
            "completed" => Ok(IndexStatus::Completed),
            "failed" => Ok(IndexStatus::Failed),
            "cancelled" => Ok(IndexStatus::Cancelled),
            other => Err(BridgeError::OperationFailed(format!(
                "Unknown index status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A document's membership record inside an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub document_id: String,
    pub status: IndexStatus,
}

/// Reference to a submitted batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRef {
    pub id: String,
    pub status: IndexStatus,
}

/// Remote search index backend
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Submit up to [`MAX_BATCH_SIZE`] documents for indexing
    async fn submit_batch(&self, index_id: &str, document_ids: &[String]) -> Result<BatchRef>;

    /// List one page of entries, optionally filtered by status
    async fn list_entries(
        &self,
        index_id: &str,
        status: Option<IndexStatus>,
        page_token: Option<String>,
    ) -> Result<(Vec<IndexEntry>, Option<String>)>;

    /// Remove a document from the index (the document itself is kept)
    async fn delete_entry(&self, index_id: &str, document_id: &str) -> Result<()>;
}
