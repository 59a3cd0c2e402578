//! Document Store Abstraction
//!
//! The document store owns uploaded files and assigns their identity. Index
//! membership refers to documents by the id it hands out.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Backend-assigned identity of an uploaded document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub id: String,
    pub filename: String,
    pub bytes: u64,
    /// Creation time (Unix seconds)
    pub created_at: Option<i64>,
}

/// Remote document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upload `data` under `name`
    async fn create(&self, name: &str, data: Bytes) -> Result<DocumentHandle>;

    /// List one page of stored documents
    async fn list(&self, after: Option<String>) -> Result<(Vec<DocumentHandle>, Option<String>)>;

    /// Delete a document
    async fn delete(&self, id: &str) -> Result<()>;
}
