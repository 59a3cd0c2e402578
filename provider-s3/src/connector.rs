//! S3 REST connector implementation
//!
//! Implements `ObjectStore` with path-style requests signed by SigV4.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::object_store::ObjectStore;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::S3Error;
use crate::signing::{self, Credentials, SigningRequest};
use crate::types;

/// Connection settings for one S3 account
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    /// Custom endpoint (`https://host[:port]`); defaults to the regional AWS endpoint
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl S3Config {
    fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

/// S3 connector
///
/// # Example
///
/// ```ignore
/// use provider_s3::{S3Config, S3Connector};
/// use bridge_traits::object_store::ObjectStore;
///
/// let store = S3Connector::new(http_client, config)?;
/// let (keys, next) = store.list("docs", None).await?;
/// ```
pub struct S3Connector {
    http_client: Arc<dyn HttpClient>,
    credentials: Credentials,
    region: String,
    endpoint: String,
    host: String,
}

impl S3Connector {
    pub fn new(http_client: Arc<dyn HttpClient>, config: S3Config) -> Result<Self> {
        let endpoint = config.endpoint();
        let host = endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(endpoint.as_str())
            .split('/')
            .next()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| S3Error::InvalidConfig(format!("Invalid endpoint: {}", endpoint)))?
            .to_string();

        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(S3Error::InvalidConfig("S3 credentials are empty".to_string()).into());
        }

        Ok(Self {
            http_client,
            credentials: Credentials {
                access_key_id: config.access_key_id,
                secret_access_key: config.secret_access_key,
                session_token: config.session_token,
            },
            region: config.region,
            endpoint,
            host,
        })
    }

    /// Build and sign a request against `/{bucket}/{key}`
    fn signed_request(
        &self,
        method: HttpMethod,
        bucket: &str,
        key: Option<&str>,
        query: &[(String, String)],
        extra_headers: BTreeMap<String, String>,
        payload: &[u8],
    ) -> HttpRequest {
        let mut canonical_uri = format!("/{}", signing::uri_encode(bucket));
        if let Some(key) = key {
            canonical_uri.push('/');
            canonical_uri.push_str(&signing::encode_key(key));
        }

        let signing_request = SigningRequest {
            method: method.as_str(),
            host: &self.host,
            canonical_uri: &canonical_uri,
            query,
            headers: &extra_headers,
            payload,
        };
        let headers = signing::sign(&signing_request, &self.credentials, &self.region, Utc::now());

        let mut url = format!("{}{}", self.endpoint, canonical_uri);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&signing::canonical_query(query));
        }

        headers
            .into_iter()
            .fold(HttpRequest::new(method, url), |request, (name, value)| {
                request.header(name, value)
            })
            .timeout(Duration::from_secs(120))
    }

    fn error_for(response: &HttpResponse, bucket: &str, key: &str) -> S3Error {
        if response.status == 404 {
            return S3Error::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            };
        }
        if response.status == 503 || response.status == 429 {
            return S3Error::SlowDown;
        }
        let document = types::parse_error(&response.body);
        S3Error::ApiError {
            status_code: response.status,
            code: document
                .as_ref()
                .map(|doc| doc.code.clone())
                .unwrap_or_default(),
            message: document
                .map(|doc| doc.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&response.body).to_string()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Connector {
    #[instrument(skip(self, continuation_token))]
    async fn list(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<(Vec<String>, Option<String>)> {
        let mut query = vec![("list-type".to_string(), "2".to_string())];
        if let Some(token) = continuation_token {
            query.push(("continuation-token".to_string(), token));
        }

        let request =
            self.signed_request(HttpMethod::Get, bucket, None, &query, BTreeMap::new(), b"");
        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            warn!(status = response.status, bucket, "ListObjectsV2 failed");
            return Err(Self::error_for(&response, bucket, "").into());
        }

        let listing = types::parse_list(&response.body)?;
        let keys: Vec<String> = listing.contents.into_iter().map(|obj| obj.key).collect();
        debug!(bucket, count = keys.len(), truncated = listing.is_truncated, "Listed objects");

        let next = if listing.is_truncated {
            listing.next_continuation_token
        } else {
            None
        };

        Ok((keys, next))
    }

    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let request =
            self.signed_request(HttpMethod::Get, bucket, Some(key), &[], BTreeMap::new(), b"");
        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            return Err(Self::error_for(&response, bucket, key).into());
        }

        debug!(bytes = response.body.len(), "Fetched object");
        Ok(response.body)
    }

    #[instrument(skip(self))]
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let request =
            self.signed_request(HttpMethod::Head, bucket, Some(key), &[], BTreeMap::new(), b"");
        let response = self.http_client.execute(request).await?;

        match response.status {
            200..=299 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::error_for(&response, bucket, key).into()),
        }
    }

    #[instrument(skip(self, data, metadata), fields(bytes = data.len()))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let headers: BTreeMap<String, String> = metadata
            .into_iter()
            .map(|(name, value)| (format!("x-amz-meta-{}", name.to_lowercase()), value))
            .collect();

        let request = self
            .signed_request(HttpMethod::Put, bucket, Some(key), &[], headers, &data)
            .body(data);
        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            return Err(Self::error_for(&response, bucket, key).into());
        }

        info!("Uploaded object");
        Ok(())
    }
}
