//! # Drive to Bucket Transfer
//!
//! Copies a folder tree (or a whole shared drive) into a bucket so the flat
//! lister can ingest it later.
//!
//! Each document lands at `prefix/<directory>/<name>` where `/` inside a
//! name becomes `-` and the extension implied by the MIME type is enforced.
//! Keys that already exist are never overwritten. Native documents are
//! exported as plain text; everything else is downloaded as-is.

use bridge_traits::object_store::ObjectStore;
use bridge_traits::tree::{SharedDrive, TreeSource};
use core_runtime::config::CyclePolicy;
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::harvester::{RemoteEntry, TreeHarvester};
use crate::mime;
use crate::pagination::paginate;
use crate::{Result, SyncError};

/// User metadata key carrying the source modification time
pub const MODIFIED_TIME_METADATA: &str = "modifiedTime";

/// Outcome of a transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    /// Documents written (or that would be written on a dry run)
    pub copied: u64,
    /// Keys that already existed
    pub skipped: u64,
    /// Entries whose content could not be fetched
    pub failed: u64,
}

/// Bucket key for `entry` under `prefix`
pub fn bucket_key(prefix: &str, entry: &RemoteEntry) -> String {
    let name = entry.name.replace('/', "-");
    let extension = entry.mime_type.as_deref().map_or("", mime::bucket_extension);

    let key = [prefix.trim_matches('/'), entry.directory.as_str(), name.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    let key = key.trim();

    match key.strip_suffix(extension) {
        Some(stem) if !extension.is_empty() => format!("{}{}", stem, extension),
        _ => format!("{}{}", key, extension),
    }
}

pub struct DriveTransfer {
    harvester: TreeHarvester,
    store: Arc<dyn ObjectStore>,
    event_bus: Option<Arc<EventBus>>,
}

impl DriveTransfer {
    pub fn new(
        source: Arc<dyn TreeSource>,
        store: Arc<dyn ObjectStore>,
        cycle_policy: CyclePolicy,
    ) -> Self {
        Self {
            harvester: TreeHarvester::new(source, cycle_policy),
            store,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Copy everything below `folder_id` into `bucket` under `prefix`
    #[instrument(skip(self))]
    pub async fn copy_folder(
        &self,
        folder_id: &str,
        bucket: &str,
        prefix: &str,
        dry_run: bool,
    ) -> Result<TransferReport> {
        self.copy_tree(folder_id, None, bucket, prefix, dry_run).await
    }

    /// Copy the shared drive named `drive_name` into `bucket` under `prefix`.
    ///
    /// # Errors
    ///
    /// `Configuration` when no visible shared drive has that name.
    #[instrument(skip(self))]
    pub async fn copy_shared_drive(
        &self,
        drive_name: &str,
        bucket: &str,
        prefix: &str,
    ) -> Result<TransferReport> {
        let drive = self.find_drive(drive_name).await?.ok_or_else(|| {
            SyncError::Configuration(format!("No shared drive named '{}' is visible", drive_name))
        })?;
        info!(drive_id = %drive.id, "Processing shared drive");

        self.copy_tree(&drive.id, Some(&drive.id), bucket, prefix, false)
            .await
    }

    async fn find_drive(&self, drive_name: &str) -> Result<Option<SharedDrive>> {
        let source = self.harvester.source().as_ref();
        let mut drives = paginate(move |token| source.list_drives(token));

        while let Some(drive) = drives.try_next().await? {
            if drive.name == drive_name {
                return Ok(Some(drive));
            }
        }
        Ok(None)
    }

    async fn copy_tree(
        &self,
        root_id: &str,
        drive_id: Option<&str>,
        bucket: &str,
        prefix: &str,
        dry_run: bool,
    ) -> Result<TransferReport> {
        self.emit(TransferEvent::Started {
            source: root_id.to_string(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            dry_run,
        });

        let mut report = TransferReport::default();
        let mut entries = self.harvester.harvest(root_id, drive_id);

        while let Some(entry) = entries.try_next().await? {
            let key = bucket_key(prefix, &entry);

            if self.store.exists(bucket, &key).await? {
                debug!(key = %key, "Key already exists, skipping");
                report.skipped += 1;
                continue;
            }
            info!(key = %key, "Not in bucket, copying");

            let data = if entry.needs_export() {
                match self.harvester.source().export(&entry.id, mime::TEXT_PLAIN).await {
                    Ok(data) => data,
                    Err(err) => {
                        warn!(key = %key, error = %err, "Export failed, skipping");
                        report.failed += 1;
                        continue;
                    }
                }
            } else {
                self.harvester.source().download(&entry.id).await?
            };

            if dry_run {
                info!(key = %key, bytes = data.len(), "Dry run, not uploading");
            } else {
                let mut metadata = HashMap::new();
                if let Some(modified) = &entry.modified_time {
                    metadata.insert(MODIFIED_TIME_METADATA.to_string(), modified.clone());
                }
                self.store.put(bucket, &key, data, metadata).await?;
            }
            report.copied += 1;
        }

        info!(
            copied = report.copied,
            skipped = report.skipped,
            failed = report.failed,
            "Transfer finished"
        );
        self.emit(TransferEvent::Completed {
            source: root_id.to_string(),
            copied: report.copied,
            skipped: report.skipped,
            failed: report.failed,
            dry_run,
        });

        Ok(report)
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Transfer(event)).ok();
        }
    }
}
