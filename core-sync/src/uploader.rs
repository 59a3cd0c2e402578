//! # Dedup / Uploader
//!
//! Maps incoming documents onto document-store handles. Existing documents
//! are matched by filename; the [`UploadPolicy`] decides whether a match is
//! replaced or reused.

use bridge_traits::documents::{DocumentHandle, DocumentStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::naming::DocumentSet;
use crate::pagination::collect_all;
use crate::{Result, SyncError};

/// How incoming documents that already exist in the store are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPolicy {
    /// Delete the existing document, then upload the new bytes
    ReplaceExisting,
    /// Reuse the existing handle and upload only missing names
    #[default]
    UploadMissingOnly,
}

impl UploadPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadPolicy::ReplaceExisting => "replace_existing",
            UploadPolicy::UploadMissingOnly => "upload_missing_only",
        }
    }
}

impl FromStr for UploadPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "replace_existing" => Ok(UploadPolicy::ReplaceExisting),
            "upload_missing_only" => Ok(UploadPolicy::UploadMissingOnly),
            other => Err(SyncError::Configuration(format!(
                "Unknown upload policy '{}' (expected replace_existing or upload_missing_only)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for UploadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of [`DocumentUploader::reconcile`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Exactly one handle per incoming filename
    pub handles: BTreeMap<String, DocumentHandle>,
    pub uploaded: usize,
    pub reused: usize,
    pub replaced: usize,
}

pub struct DocumentUploader {
    store: Arc<dyn DocumentStore>,
}

impl DocumentUploader {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Every stored document keyed by filename.
    ///
    /// When several documents share a filename the most recently listed one
    /// wins.
    #[instrument(skip(self))]
    pub async fn existing_documents(&self) -> Result<HashMap<String, DocumentHandle>> {
        let store = self.store.as_ref();
        let documents = collect_all(move |after| store.list(after)).await?;
        debug!(count = documents.len(), "Listed existing documents");

        Ok(documents
            .into_iter()
            .map(|handle| (handle.filename.clone(), handle))
            .collect())
    }

    /// Resolve every incoming document to a handle.
    ///
    /// Uploads happen one at a time in incoming order. An upload error
    /// propagates immediately; documents uploaded before it stay in the store
    /// and are picked up as existing by the next run.
    #[instrument(skip(self, existing, incoming), fields(incoming = incoming.len(), existing = existing.len()))]
    pub async fn reconcile(
        &self,
        existing: &HashMap<String, DocumentHandle>,
        incoming: DocumentSet,
        policy: UploadPolicy,
    ) -> Result<Reconciliation> {
        let mut outcome = Reconciliation::default();

        for (filename, data) in incoming {
            match (existing.get(&filename), policy) {
                (Some(current), UploadPolicy::UploadMissingOnly) => {
                    debug!(filename = %filename, id = %current.id, "Reusing existing document");
                    outcome.handles.insert(filename, current.clone());
                    outcome.reused += 1;
                }
                (current, _) => {
                    if let Some(current) = current {
                        debug!(filename = %filename, id = %current.id, "Deleting document before replacement");
                        self.store.delete(&current.id).await?;
                        outcome.replaced += 1;
                    }
                    let handle = self.store.create(&filename, data).await?;
                    debug!(filename = %filename, id = %handle.id, "Uploaded document");
                    outcome.handles.insert(filename, handle);
                    outcome.uploaded += 1;
                }
            }
        }

        info!(
            uploaded = outcome.uploaded,
            reused = outcome.reused,
            replaced = outcome.replaced,
            "Reconciled documents"
        );
        Ok(outcome)
    }

    /// Delete every stored document. Failures are logged and skipped.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<Vec<String>> {
        let store = self.store.as_ref();
        let documents = collect_all(move |after| store.list(after)).await?;
        let mut deleted = Vec::with_capacity(documents.len());

        for document in documents {
            match self.store.delete(&document.id).await {
                Ok(()) => deleted.push(document.id),
                Err(err) => warn!(id = %document.id, error = %err, "Failed to delete document"),
            }
        }

        info!(deleted = deleted.len(), "Cleared document store");
        Ok(deleted)
    }
}
