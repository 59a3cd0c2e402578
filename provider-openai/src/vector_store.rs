//! Vector store index backend

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpMethod, HttpRequest};
use bridge_traits::index::{BatchRef, IndexBackend, IndexEntry, IndexStatus, MAX_BATCH_SIZE};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::client::OpenAiClient;
use crate::types::{CreateFileBatchRequest, DeletionStatus, FileBatch, ListResponse, VectorStoreFile};

/// Page size for `GET /vector_stores/{id}/files` (API maximum)
const LIST_PAGE_SIZE: u32 = 100;

pub struct OpenAiIndexBackend {
    client: Arc<OpenAiClient>,
}

impl OpenAiIndexBackend {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }

    fn parse_status(raw: &str) -> IndexStatus {
        raw.parse().unwrap_or_else(|_| {
            warn!(status = raw, "Unknown vector store file status, treating as failed");
            IndexStatus::Failed
        })
    }
}

#[async_trait]
impl IndexBackend for OpenAiIndexBackend {
    #[instrument(skip(self, document_ids), fields(count = document_ids.len()))]
    async fn submit_batch(&self, index_id: &str, document_ids: &[String]) -> Result<BatchRef> {
        if document_ids.is_empty() || document_ids.len() > MAX_BATCH_SIZE {
            return Err(BridgeError::OperationFailed(format!(
                "File batch must hold 1..={} ids, got {}",
                MAX_BATCH_SIZE,
                document_ids.len()
            )));
        }

        let url = self.client.url(&format!(
            "/vector_stores/{}/file_batches",
            urlencoding::encode(index_id)
        ));
        let request = HttpRequest::new(HttpMethod::Post, url).json(&CreateFileBatchRequest {
            file_ids: document_ids,
        })?;

        let batch: FileBatch = self.client.send_json(request, index_id).await?;
        info!(batch_id = %batch.id, status = %batch.status, "Submitted file batch");

        Ok(BatchRef {
            status: Self::parse_status(&batch.status),
            id: batch.id,
        })
    }

    #[instrument(skip(self, page_token))]
    async fn list_entries(
        &self,
        index_id: &str,
        status: Option<IndexStatus>,
        page_token: Option<String>,
    ) -> Result<(Vec<IndexEntry>, Option<String>)> {
        let mut url = self.client.url(&format!(
            "/vector_stores/{}/files?limit={}",
            urlencoding::encode(index_id),
            LIST_PAGE_SIZE
        ));
        if let Some(status) = status {
            url.push_str(&format!("&filter={}", status.as_str()));
        }
        if let Some(after) = page_token {
            url.push_str(&format!("&after={}", urlencoding::encode(&after)));
        }

        let page: ListResponse<VectorStoreFile> = self
            .client
            .send_json(HttpRequest::new(HttpMethod::Get, url), index_id)
            .await?;
        let next = page.next_cursor(|file| &file.id);

        let entries: Vec<IndexEntry> = page
            .data
            .into_iter()
            .map(|file| {
                if let Some(error) = &file.last_error {
                    debug!(file_id = %file.id, error = %error.message, "Vector store file error");
                }
                IndexEntry {
                    status: Self::parse_status(&file.status),
                    document_id: file.id,
                }
            })
            .collect();

        Ok((entries, next))
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, index_id: &str, document_id: &str) -> Result<()> {
        let url = self.client.url(&format!(
            "/vector_stores/{}/files/{}",
            urlencoding::encode(index_id),
            urlencoding::encode(document_id)
        ));
        let status: DeletionStatus = self
            .client
            .send_json(HttpRequest::new(HttpMethod::Delete, url), document_id)
            .await?;

        debug!(file_id = %status.id, deleted = status.deleted, "Removed file from vector store");
        Ok(())
    }
}
