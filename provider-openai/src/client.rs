//! Shared OpenAI HTTP client
//!
//! Adds authentication headers and retries rate limited or failed requests
//! with exponential backoff.

use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::OpenAiError;
use crate::types::ErrorEnvelope;

/// Default API root
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const MAX_RETRIES: u32 = 4;

/// Connection settings for one OpenAI account
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub organization: Option<String>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE.to_string(),
            organization: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Authenticated client shared by the document store and index backend
pub struct OpenAiClient {
    http_client: Arc<dyn HttpClient>,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: OpenAiConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        let request = request
            .bearer_token(self.config.api_key.clone())
            .header("OpenAI-Beta", "assistants=v2")
            .timeout(Duration::from_secs(120));
        match &self.config.organization {
            Some(org) => request.header("OpenAI-Organization", org.clone()),
            None => request,
        }
    }

    fn retry_after(response: &HttpResponse) -> u64 {
        response
            .header("Retry-After")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(1)
    }

    fn api_error(response: &HttpResponse, resource: &str) -> OpenAiError {
        if response.status == 404 {
            return OpenAiError::NotFound(resource.to_string());
        }
        match serde_json::from_slice::<ErrorEnvelope>(&response.body) {
            Ok(envelope) => OpenAiError::ApiError {
                status_code: response.status,
                error_type: envelope
                    .error
                    .error_type
                    .or(envelope.error.code)
                    .unwrap_or_else(|| "unknown".to_string()),
                message: envelope.error.message,
            },
            Err(_) => OpenAiError::ApiError {
                status_code: response.status,
                error_type: "unknown".to_string(),
                message: String::from_utf8_lossy(&response.body).to_string(),
            },
        }
    }

    /// Execute with authentication and retry on 429/5xx
    #[instrument(skip(self, request), fields(method = request.method.as_str(), url = %request.url))]
    pub async fn send(&self, request: HttpRequest, resource: &str) -> Result<HttpResponse> {
        let request = self.authorize(request);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = self.http_client.execute(request.clone()).await;

            let reason = match outcome {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.status == 429 || response.is_server_error() => {
                    if attempt >= MAX_RETRIES {
                        warn!(status = response.status, attempts = attempt, "API request failed after retries");
                        let error = if response.status == 429 {
                            OpenAiError::RateLimitExceeded {
                                retry_after_seconds: Self::retry_after(&response),
                            }
                        } else {
                            Self::api_error(&response, resource)
                        };
                        return Err(error.into());
                    }
                    format!("status={}", response.status)
                }
                Ok(response) => {
                    warn!(status = response.status, "API request failed");
                    return Err(Self::api_error(&response, resource).into());
                }
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => e.to_string(),
                Err(e) => return Err(e),
            };

            let backoff_ms = 250u64 * 2u64.pow(attempt);
            warn!(
                "API request failed (attempt {}/{}): {}, retrying in {}ms",
                attempt, MAX_RETRIES, reason, backoff_ms
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        resource: &str,
    ) -> Result<T> {
        let response = self.send(request, resource).await?;
        serde_json::from_slice(&response.body).map_err(|e| {
            OpenAiError::ParseError(format!("Failed to parse {} response: {}", resource, e)).into()
        })
    }
}
