//! HTTP Client Abstraction
//!
//! Provides async HTTP operations with bearer auth, retry logic, and TLS support.
//! Every remote connector (Drive, S3, document store, index backend) talks to
//! its service through this trait so tests can substitute a mock.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Attach a `multipart/form-data` body
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.headers.insert(
            "Content-Type".to_string(),
            format!("multipart/form-data; boundary={}", form.boundary),
        );
        self.body = Some(form.finish());
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Minimal `multipart/form-data` encoder for upload endpoints.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    buffer: BytesMut,
}

impl MultipartForm {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buffer: BytesMut::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Append a plain text field
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.part_header(name, None, None);
        self.buffer.put_slice(value.as_bytes());
        self.buffer.put_slice(b"\r\n");
        self
    }

    /// Append a file field
    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.part_header(name, Some(file_name), Some(content_type));
        self.buffer.put_slice(data);
        self.buffer.put_slice(b"\r\n");
        self
    }

    fn part_header(&mut self, name: &str, file_name: Option<&str>, content_type: Option<&str>) {
        self.buffer
            .put_slice(format!("--{}\r\n", self.boundary).as_bytes());
        let disposition = match file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name,
                file_name.replace('"', "%22")
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", name),
        };
        self.buffer.put_slice(disposition.as_bytes());
        if let Some(content_type) = content_type {
            self.buffer
                .put_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        self.buffer.put_slice(b"\r\n");
    }

    fn finish(mut self) -> Bytes {
        self.buffer
            .put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.buffer.freeze()
    }
}

/// HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 5xx, worth retrying
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Header lookup ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Exponential backoff for rate limits and server errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Ceiling for a single delay (also caps `Retry-After`)
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the given (1-based) retry attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Async HTTP client used by every connector
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest, HttpMethod};
///
/// async fn list_files(client: &dyn HttpClient, key: &str) -> Result<FileList> {
///     let request = HttpRequest::new(HttpMethod::Get, "https://api.openai.com/v1/files")
///         .bearer_token(key);
///
///     client.execute(request).await?.json()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send one request. Non-2xx statuses come back as responses; only
    /// transport failures are errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute an HTTP request with custom retry policy
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        // Implementations can override for custom retry logic
        let _ = policy;
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::new(HttpMethod::Get, "https://example.com")
            .header("User-Agent", "test")
            .bearer_token("secret")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.headers.get("User-Agent"), Some(&"test".to_string()));
        assert!(request.headers.contains_key("Authorization"));
    }

    #[test]
    fn test_http_response_status_checks() {
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from("test"),
        };

        assert!(response.is_success());
        assert!(!response.is_server_error());

        let response = HttpResponse {
            status: 503,
            headers: HashMap::new(),
            body: Bytes::new(),
        };
        assert!(response.is_server_error());
    }

    #[test]
    fn test_multipart_body_layout() {
        let form = MultipartForm::new("XBOUNDARY")
            .text("purpose", "assistants")
            .file("file", "a.pdf", "application/octet-stream", b"abc");
        let request = HttpRequest::new(HttpMethod::Post, "https://example.com/files").multipart(form);

        let body = String::from_utf8(request.body.unwrap().to_vec()).unwrap();
        assert!(body.starts_with("--XBOUNDARY\r\n"));
        assert!(body.contains("name=\"purpose\"\r\n\r\nassistants\r\n"));
        assert!(body.contains("filename=\"a.pdf\""));
        assert!(body.ends_with("--XBOUNDARY--\r\n"));
        assert_eq!(
            request.headers.get("Content-Type").unwrap(),
            "multipart/form-data; boundary=XBOUNDARY"
        );
    }

    #[test]
    fn test_retry_policy_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "7".to_string());
        let response = HttpResponse {
            status: 429,
            headers,
            body: Bytes::new(),
        };

        assert_eq!(response.header("Retry-After"), Some("7"));
    }
}
