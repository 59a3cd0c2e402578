//! OpenAI API request and response types

use serde::{Deserialize, Serialize};

/// File object returned by the Files API
#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub purpose: Option<String>,
}

/// Generic cursor-paginated list envelope
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

impl<T> ListResponse<T> {
    /// Cursor for the next page: the explicit `last_id`, else the id of the
    /// final item, and only when `has_more` is set
    pub fn next_cursor(&self, id_of: impl Fn(&T) -> &str) -> Option<String> {
        if !self.has_more {
            return None;
        }
        self.last_id
            .clone()
            .or_else(|| self.data.last().map(|item| id_of(item).to_string()))
    }
}

/// Vector store file object
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub last_error: Option<ApiErrorBody>,
}

/// `POST /vector_stores/{id}/file_batches` body
#[derive(Debug, Serialize)]
pub struct CreateFileBatchRequest<'a> {
    pub file_ids: &'a [String],
}

/// Vector store file batch object
#[derive(Debug, Clone, Deserialize)]
pub struct FileBatch {
    pub id: String,
    pub status: String,
}

/// `DELETE` acknowledgement
#[derive(Debug, Deserialize)]
pub struct DeletionStatus {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ApiErrorBody,
}
