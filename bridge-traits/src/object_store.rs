//! Flat Object Store Abstraction
//!
//! Bucket/key storage with paginated listing (S3 and compatible services).

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::Result;

/// Flat, prefix-addressed object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of keys in `bucket`
    async fn list(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<(Vec<String>, Option<String>)>;

    /// Fetch the content stored under `key`
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Check whether `key` exists
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Store `data` under `key` with user metadata
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<()>;
}
