//! Google Drive API connector implementation
//!
//! Implements the `TreeSource` trait for Google Drive API v3.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::tree::{NodeKind, RemoteNode, SharedDrive, ShortcutTarget, TreeSource};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GoogleDriveError;
use crate::types::{
    DriveFile, DrivesListResponse, FilesListResponse, FOLDER_MIME_TYPE, SHORTCUT_MIME_TYPE,
};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Maximum results per page (Google Drive API limit)
const MAX_PAGE_SIZE: u32 = 1000;

/// Maximum drives per drives.list page
const MAX_DRIVES_PAGE_SIZE: u32 = 100;

/// Fields to request for file resources
const FILE_FIELDS: &str =
    "id,name,mimeType,modifiedTime,md5Checksum,shortcutDetails(targetId,targetMimeType)";

/// Attempts per request before giving up on 429/5xx
const MAX_RETRIES: u32 = 4;

/// Google Drive API connector
///
/// Implements `TreeSource` for Google Drive API v3.
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveConnector;
/// use bridge_traits::tree::TreeSource;
///
/// let connector = GoogleDriveConnector::new(http_client, access_token);
/// let (children, next) = connector.list_children("root", None, None).await?;
/// ```
pub struct GoogleDriveConnector {
    http_client: Arc<dyn HttpClient>,

    /// OAuth 2.0 access token with `drive.readonly` scope
    access_token: String,

    base_url: String,
}

impl GoogleDriveConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: String) -> Self {
        Self {
            http_client,
            access_token,
            base_url: DRIVE_API_BASE.to_string(),
        }
    }

    /// Point the connector at a different API root (emulators, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn classify(mime_type: &str) -> NodeKind {
        match mime_type {
            FOLDER_MIME_TYPE => NodeKind::Folder,
            SHORTCUT_MIME_TYPE => NodeKind::Shortcut,
            _ => NodeKind::File,
        }
    }

    /// Convert DriveFile to RemoteNode
    fn convert_file(drive_file: DriveFile) -> RemoteNode {
        let kind = Self::classify(&drive_file.mime_type);
        let shortcut = match kind {
            NodeKind::Shortcut => drive_file.shortcut_details.map(|details| ShortcutTarget {
                target_kind: Self::classify(&details.target_mime_type),
                target_id: details.target_id,
                target_mime_type: Some(details.target_mime_type),
            }),
            _ => None,
        };

        RemoteNode {
            id: drive_file.id,
            name: drive_file.name,
            kind,
            mime_type: Some(drive_file.mime_type),
            shortcut,
            md5_checksum: drive_file.md5_checksum,
            modified_time: drive_file.modified_time,
        }
    }

    fn retry_after(response: &HttpResponse) -> u64 {
        response
            .header("Retry-After")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(1)
    }

    /// Execute a GET with retry logic
    ///
    /// Implements exponential backoff for rate limiting and transient errors.
    #[instrument(skip(self), fields(url = %url))]
    async fn execute_with_retry(&self, url: String, resource_id: &str) -> Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            let request = HttpRequest::new(HttpMethod::Get, url.clone())
                .bearer_token(self.access_token.clone())
                .timeout(Duration::from_secs(60));

            attempt += 1;
            let outcome = self.http_client.execute(request).await;

            let retryable = match outcome {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.status == 404 => {
                    return Err(GoogleDriveError::FileNotFound {
                        file_id: resource_id.to_string(),
                    }
                    .into());
                }
                Ok(response) if response.status == 429 || response.is_server_error() => {
                    if attempt >= MAX_RETRIES {
                        warn!(
                            status = response.status,
                            attempts = attempt,
                            "API request failed after retries"
                        );
                        let error = if response.status == 429 {
                            GoogleDriveError::RateLimitExceeded {
                                retry_after_seconds: Self::retry_after(&response),
                            }
                        } else {
                            GoogleDriveError::ApiError {
                                status_code: response.status,
                                message: String::from_utf8_lossy(&response.body).to_string(),
                            }
                        };
                        return Err(error.into());
                    }
                    format!("status={}", response.status)
                }
                Ok(response) => {
                    warn!(status = response.status, "API request failed");
                    return Err(GoogleDriveError::ApiError {
                        status_code: response.status,
                        message: String::from_utf8_lossy(&response.body).to_string(),
                    }
                    .into());
                }
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => e.to_string(),
                Err(e) => return Err(e),
            };

            let backoff_ms = 100u64 * 2u64.pow(attempt);
            warn!(
                "API request failed (attempt {}/{}): {}, retrying in {}ms",
                attempt, MAX_RETRIES, retryable, backoff_ms
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse {}: {}", what, e)).into()
        })
    }
}

#[async_trait]
impl TreeSource for GoogleDriveConnector {
    #[instrument(skip(self, page_token))]
    async fn list_children(
        &self,
        folder_id: &str,
        drive_id: Option<&str>,
        page_token: Option<String>,
    ) -> Result<(Vec<RemoteNode>, Option<String>)> {
        let query = format!("'{}' in parents and trashed=false", folder_id);

        let mut url = format!(
            "{}/files?q={}&pageSize={}&fields=nextPageToken,incompleteSearch,files({})&supportsAllDrives=true&includeItemsFromAllDrives=true",
            self.base_url,
            urlencoding::encode(&query),
            MAX_PAGE_SIZE,
            FILE_FIELDS
        );

        if let Some(drive_id) = drive_id {
            url.push_str(&format!(
                "&corpora=drive&driveId={}",
                urlencoding::encode(drive_id)
            ));
        }

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(&token)));
        }

        let response = self.execute_with_retry(url, folder_id).await?;
        let list_response: FilesListResponse = Self::parse(&response, "files list response")?;

        if list_response.incomplete_search {
            warn!(folder_id, "Drive reported an incomplete search");
        }

        let nodes: Vec<RemoteNode> = list_response
            .files
            .into_iter()
            .map(Self::convert_file)
            .collect();

        debug!(folder_id, count = nodes.len(), "Listed folder children");

        Ok((nodes, list_response.next_page_token))
    }

    #[instrument(skip(self))]
    async fn list_drives(
        &self,
        page_token: Option<String>,
    ) -> Result<(Vec<SharedDrive>, Option<String>)> {
        let mut url = format!(
            "{}/drives?pageSize={}&fields=nextPageToken,drives(id,name)",
            self.base_url, MAX_DRIVES_PAGE_SIZE
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(&token)));
        }

        let response = self.execute_with_retry(url, "drives").await?;
        let list_response: DrivesListResponse = Self::parse(&response, "drives list response")?;

        let drives = list_response
            .drives
            .into_iter()
            .map(|drive| SharedDrive {
                id: drive.id,
                name: drive.name,
            })
            .collect();

        Ok((drives, list_response.next_page_token))
    }

    #[instrument(skip(self), fields(file_id = %file_id))]
    async fn download(&self, file_id: &str) -> Result<Bytes> {
        let url = format!(
            "{}/files/{}?alt=media&supportsAllDrives=true",
            self.base_url,
            urlencoding::encode(file_id)
        );

        let response = self.execute_with_retry(url, file_id).await?;
        info!(bytes = response.body.len(), "Downloaded file");

        Ok(response.body)
    }

    #[instrument(skip(self), fields(file_id = %file_id))]
    async fn export(&self, file_id: &str, mime_type: &str) -> Result<Bytes> {
        let url = format!(
            "{}/files/{}/export?mimeType={}",
            self.base_url,
            urlencoding::encode(file_id),
            urlencoding::encode(mime_type)
        );

        let response = self.execute_with_retry(url, file_id).await?;
        info!(bytes = response.body.len(), mime_type, "Exported document");

        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::RetryPolicy;
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

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_convert_shortcut_to_folder() {
        let node = GoogleDriveConnector::convert_file(DriveFile {
            id: "sc1".to_string(),
            name: "Linked".to_string(),
            mime_type: SHORTCUT_MIME_TYPE.to_string(),
            modified_time: None,
            md5_checksum: None,
            shortcut_details: Some(crate::types::ShortcutDetails {
                target_id: "folder9".to_string(),
                target_mime_type: FOLDER_MIME_TYPE.to_string(),
            }),
        });

        assert_eq!(node.kind, NodeKind::Shortcut);
        let target = node.shortcut.unwrap();
        assert_eq!(target.target_id, "folder9");
        assert_eq!(target.target_kind, NodeKind::Folder);
    }

    #[test]
    fn test_convert_plain_file_has_no_shortcut() {
        let node = GoogleDriveConnector::convert_file(DriveFile {
            id: "f1".to_string(),
            name: "notes.gdoc".to_string(),
            mime_type: "application/vnd.google-apps.document".to_string(),
            modified_time: Some("2024-01-01T00:00:00Z".to_string()),
            md5_checksum: None,
            shortcut_details: None,
        });

        assert_eq!(node.kind, NodeKind::File);
        assert!(node.shortcut.is_none());
    }

    #[tokio::test]
    async fn test_list_children_builds_query() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains("%27folder1%27%20in%20parents"));
            assert!(req.url.contains("driveId=drive7"));
            assert!(req.url.contains("pageToken=p2"));
            assert_eq!(
                req.headers.get("Authorization"),
                Some(&"Bearer test_token".to_string())
            );

            Ok(json_response(
                200,
                r#"{
                    "files": [
                        {"id": "a", "name": "Sub", "mimeType": "application/vnd.google-apps.folder"},
                        {"id": "b", "name": "x.pdf", "mimeType": "application/pdf", "md5Checksum": "00"}
                    ],
                    "nextPageToken": "p3"
                }"#,
            ))
        });

        let connector = GoogleDriveConnector::new(Arc::new(mock_http), "test_token".to_string());
        let (nodes, next) = connector
            .list_children("folder1", Some("drive7"), Some("p2".to_string()))
            .await
            .unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, NodeKind::Folder);
        assert_eq!(nodes[1].md5_checksum.as_deref(), Some("00"));
        assert_eq!(next, Some("p3".to_string()));
    }

    #[tokio::test]
    async fn test_list_drives() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains("/drives?"));
            Ok(json_response(
                200,
                r#"{"drives": [{"id": "d1", "name": "Finance"}]}"#,
            ))
        });

        let connector = GoogleDriveConnector::new(Arc::new(mock_http), "test_token".to_string());
        let (drives, next) = connector.list_drives(None).await.unwrap();

        assert_eq!(drives, vec![SharedDrive {
            id: "d1".to_string(),
            name: "Finance".to_string(),
        }]);
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_export_uses_export_endpoint() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains("/files/doc1/export?mimeType=text%2Fplain"));
            Ok(json_response(200, "plain text"))
        });

        let connector = GoogleDriveConnector::new(Arc::new(mock_http), "test_token".to_string());
        let data = connector.export("doc1", "text/plain").await.unwrap();

        assert_eq!(&data[..], b"plain text");
    }

    #[tokio::test]
    async fn test_download_not_found() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(404, "File not found")));

        let connector = GoogleDriveConnector::new(Arc::new(mock_http), "test_token".to_string());
        let result = connector.download("missing").await;

        assert!(matches!(result, Err(BridgeError::NotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(403, "forbidden")));

        let connector = GoogleDriveConnector::new(Arc::new(mock_http), "test_token".to_string());
        let result = connector.list_children("root", None, None).await;

        assert!(matches!(
            result,
            Err(BridgeError::Remote {
                status_code: 403,
                ..
            })
        ));
    }
}
