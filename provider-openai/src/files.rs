//! Files API document store

use async_trait::async_trait;
use bridge_traits::documents::{DocumentHandle, DocumentStore};
use bridge_traits::error::Result;
use bridge_traits::http::{HttpMethod, HttpRequest, MultipartForm};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::client::OpenAiClient;
use crate::types::{DeletionStatus, FileObject, ListResponse};

/// Purpose tag required for files attached to vector stores
const FILE_PURPOSE: &str = "assistants";

/// Page size for `GET /files`
const LIST_PAGE_SIZE: u32 = 10_000;

pub struct OpenAiDocumentStore {
    client: Arc<OpenAiClient>,
}

impl OpenAiDocumentStore {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }

    fn to_handle(file: FileObject) -> DocumentHandle {
        DocumentHandle {
            id: file.id,
            filename: file.filename,
            bytes: file.bytes,
            created_at: file.created_at,
        }
    }
}

#[async_trait]
impl DocumentStore for OpenAiDocumentStore {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn create(&self, name: &str, data: Bytes) -> Result<DocumentHandle> {
        let boundary = format!("docsync-{}", Uuid::new_v4().simple());
        let form = MultipartForm::new(boundary)
            .text("purpose", FILE_PURPOSE)
            .file("file", name, "application/octet-stream", &data);

        let request = HttpRequest::new(HttpMethod::Post, self.client.url("/files")).multipart(form);
        let file: FileObject = self.client.send_json(request, "files").await?;

        info!(file_id = %file.id, "Uploaded document");
        Ok(Self::to_handle(file))
    }

    #[instrument(skip(self))]
    async fn list(&self, after: Option<String>) -> Result<(Vec<DocumentHandle>, Option<String>)> {
        let mut url = self.client.url(&format!(
            "/files?purpose={}&limit={}&order=asc",
            FILE_PURPOSE, LIST_PAGE_SIZE
        ));
        if let Some(after) = after {
            url.push_str(&format!("&after={}", urlencoding::encode(&after)));
        }

        let page: ListResponse<FileObject> = self
            .client
            .send_json(HttpRequest::new(HttpMethod::Get, url), "files")
            .await?;
        let next = page.next_cursor(|file| &file.id);

        let handles = page.data.into_iter().map(Self::to_handle).collect();
        Ok((handles, next))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        let url = self.client.url(&format!("/files/{}", urlencoding::encode(id)));
        let status: DeletionStatus = self
            .client
            .send_json(HttpRequest::new(HttpMethod::Delete, url), id)
            .await?;

        info!(file_id = %status.id, deleted = status.deleted, "Deleted document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OpenAiConfig;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::{HttpClient, HttpResponse, RetryPolicy};
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
            async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> Result<HttpResponse>;
        }
    }

    fn store(mock_http: MockHttpClient) -> OpenAiDocumentStore {
        let client = OpenAiClient::new(Arc::new(mock_http), OpenAiConfig::new("sk-test"));
        OpenAiDocumentStore::new(Arc::new(client))
    }

    fn ok(body: &'static str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    #[tokio::test]
    async fn test_create_uploads_multipart() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert!(req.url.ends_with("/files"));
            let content_type = req.headers.get("Content-Type").unwrap();
            assert!(content_type.starts_with("multipart/form-data; boundary=docsync-"));
            let body = String::from_utf8(req.body.unwrap().to_vec()).unwrap();
            assert!(body.contains("filename=\"hr__handbook.pdf\""));
            assert!(body.contains("assistants"));
            ok(r#"{"id": "file-abc", "filename": "hr__handbook.pdf", "bytes": 4, "created_at": 1700000000}"#)
        });

        let handle = store(mock_http)
            .create("hr__handbook.pdf", Bytes::from_static(b"%PDF"))
            .await
            .unwrap();

        assert_eq!(handle.id, "file-abc");
        assert_eq!(handle.bytes, 4);
    }

    #[tokio::test]
    async fn test_list_follows_has_more() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains("after=file-1"));
            ok(r#"{"data": [{"id": "file-2", "filename": "b.pdf", "bytes": 1}], "has_more": true}"#)
        });

        let (handles, next) = store(mock_http)
            .list(Some("file-1".to_string()))
            .await
            .unwrap();

        assert_eq!(handles.len(), 1);
        assert_eq!(next.as_deref(), Some("file-2"));
    }

    #[tokio::test]
    async fn test_delete_missing_file() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 404,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        });

        let err = store(mock_http).delete("file-gone").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(id) if id == "file-gone"));
    }
}
