//! # Flat-Store Lister
//!
//! Reads documents out of a bucket. Keys are filtered by folder prefix and
//! by extension; the surviving keys are renamed to a canonical document
//! filename before their content is fetched.
//!
//! ## Extension rules
//!
//! | Key extension | Kept | Canonical name |
//! |---|---|---|
//! | `.html` `.doc` `.docx` `.pdf` `.pptx` `.ppt` `.xlsx` | yes | unchanged |
//! | `.gdoc` | yes | extension rewritten to `.docx` |
//! | none | yes | `.docx` appended |
//! | anything else | no | |

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::object_store::ObjectStore;
use bytes::Bytes;
use core_runtime::config::CollisionPolicy;
use futures::stream::{BoxStream, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::naming::DocumentSet;
use crate::pagination::paginate;
use crate::Result;

/// Extensions (including the leading dot) that pass the filter unchanged
const KEPT_EXTENSIONS: &[&str] = &[".html", ".doc", ".docx", ".pdf", ".pptx", ".ppt", ".xlsx"];

/// Canonical document name for `key`, or `None` when the key is filtered out
pub fn canonical_document_name(key: &str) -> Option<String> {
    let extension = extension_of(key);
    match extension {
        "" => Some(format!("{}.docx", key)),
        ".gdoc" => Some(format!("{}.docx", &key[..key.len() - extension.len()])),
        ext if KEPT_EXTENSIONS.contains(&ext) => Some(key.to_string()),
        _ => None,
    }
}

/// Extension of the last path segment, with its dot. Leading-dot names such
/// as `.profile` have no extension.
fn extension_of(key: &str) -> &str {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    match file_name.rfind('.') {
        Some(0) | None => "",
        Some(dot) => &file_name[dot..],
    }
}

pub struct FlatLister {
    store: Arc<dyn ObjectStore>,
}

impl FlatLister {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Every key in `bucket`, fetched page by page as the stream is polled
    pub fn list<'a>(&'a self, bucket: &'a str) -> BoxStream<'a, BridgeResult<String>> {
        let store = self.store.as_ref();
        paginate(move |token| store.list(bucket, token))
    }

    pub async fn get(&self, bucket: &str, key: &str) -> BridgeResult<Bytes> {
        self.store.get(bucket, key).await
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> BridgeResult<bool> {
        self.store.exists(bucket, key).await
    }

    /// Fetch every kept document under one of `folder_prefixes`.
    ///
    /// Documents come back keyed by destination filename; `policy` settles
    /// names that collide after flattening.
    #[instrument(skip(self, folder_prefixes), fields(prefixes = folder_prefixes.len()))]
    pub async fn collect_documents(
        &self,
        bucket: &str,
        folder_prefixes: &[String],
        policy: CollisionPolicy,
    ) -> Result<DocumentSet> {
        let mut documents = DocumentSet::new(policy);
        let mut keys = self.list(bucket);
        let mut scanned = 0usize;

        while let Some(key) = keys.try_next().await? {
            scanned += 1;
            if !folder_prefixes.iter().any(|prefix| key.starts_with(prefix.as_str())) {
                continue;
            }
            let Some(name) = canonical_document_name(&key) else {
                debug!(key = %key, "Skipping key with unsupported extension");
                continue;
            };

            let data = self.get(bucket, &key).await?;
            documents.insert(&name, data)?;
        }

        info!(scanned, kept = documents.len(), "Collected documents from bucket");
        Ok(documents)
    }
}
