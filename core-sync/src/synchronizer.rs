//! # Index Synchronizer
//!
//! Moves uploaded documents into a search index and waits for the backend
//! to finish processing them.
//!
//! ## Rounds
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   incomplete and
//! │ submit chunks├──>│ poll pending ├──>│   classify   ├── attempt < max ──┐
//! └──────▲───────┘   └──────────────┘   └──────────────┘                   │
//!        └─────────────────────────── incomplete subset ───────────────────┘
//! ```
//!
//! 1. Handles are submitted in batches of at most `batch_size`, pausing
//!    `submission_delay` between submissions.
//! 2. The index is polled every `poll_interval` until no entry of this
//!    submission is `in_progress`, or until `poll_timeout` elapses.
//! 3. Every submitted handle defaults to `completed`. Entries still
//!    `in_progress` or `failed` are removed from the index and keep that
//!    status.
//! 4. The incomplete subset is resubmitted. Attempts are counted from 0 and
//!    the loop stops after attempt `max_attempts`, so at most
//!    `max_attempts + 1` rounds run. Statuses settled in earlier rounds are
//!    carried forward untouched.
//!
//! Cancellation is observed between submissions and during every wait. A
//! cancelled round removes its `in_progress` and `failed` entries before
//! returning, as classification would have.

use bridge_traits::documents::DocumentHandle;
use bridge_traits::index::{IndexBackend, IndexEntry, IndexStatus};
use core_runtime::config::SyncSettings;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::pagination::collect_all;
use crate::{Result, SyncError};

/// Final state of one handle after synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub file_name: String,
    pub file_id: String,
    pub transfer_status: IndexStatus,
}

/// Per-handle statuses in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub statuses: Vec<TransferStatus>,
    /// Submission rounds that ran
    pub rounds: u32,
}

impl SyncResult {
    pub fn count(&self, status: IndexStatus) -> usize {
        self.statuses
            .iter()
            .filter(|s| s.transfer_status == status)
            .count()
    }

    pub fn incomplete(&self) -> impl Iterator<Item = &TransferStatus> {
        self.statuses
            .iter()
            .filter(|s| s.transfer_status != IndexStatus::Completed)
    }
}

/// Handles that still need submitting after comparing with the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screening {
    pub pending: Vec<DocumentHandle>,
    /// Handles already present in the index and left alone
    pub already_indexed: usize,
    /// Incomplete entries removed so their handles can be resubmitted
    pub purged: usize,
}

pub struct IndexSynchronizer {
    backend: Arc<dyn IndexBackend>,
    settings: SyncSettings,
}

impl IndexSynchronizer {
    pub fn new(backend: Arc<dyn IndexBackend>, settings: SyncSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Every entry of `index_id`, optionally restricted to one status
    pub async fn list_entries(
        &self,
        index_id: &str,
        status: Option<IndexStatus>,
    ) -> Result<Vec<IndexEntry>> {
        let backend = self.backend.as_ref();
        Ok(collect_all(move |token| backend.list_entries(index_id, status, token)).await?)
    }

    /// Submit `handles` and drive them to a final status.
    ///
    /// Every distinct handle appears exactly once in the result. Backend
    /// errors propagate; work already submitted is not rolled back.
    #[instrument(skip(self, handles, cancel), fields(handles = handles.len()))]
    pub async fn synchronize(
        &self,
        index_id: &str,
        handles: &[DocumentHandle],
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        let mut result = SyncResult::default();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for handle in handles {
            if positions.contains_key(handle.id.as_str()) {
                warn!(id = %handle.id, "Duplicate handle passed to synchronizer, ignoring");
                continue;
            }
            positions.insert(handle.id.as_str(), result.statuses.len());
            result.statuses.push(TransferStatus {
                file_name: handle.filename.clone(),
                file_id: handle.id.clone(),
                transfer_status: IndexStatus::Completed,
            });
        }

        let mut pending: Vec<String> = result.statuses.iter().map(|s| s.file_id.clone()).collect();
        let mut attempt: u32 = 0;

        while !pending.is_empty() {
            result.rounds += 1;
            info!(attempt, documents = pending.len(), "Starting synchronization round");

            let submitted: HashSet<&str> = pending.iter().map(String::as_str).collect();
            let settled = match self.submit(index_id, &pending, cancel).await {
                Ok(()) => self.wait_for_settlement(index_id, &submitted, cancel).await,
                Err(err) => Err(err),
            };
            if let Err(err) = settled {
                if matches!(err, SyncError::Cancelled) {
                    self.abandon_round(index_id, &submitted).await;
                }
                return Err(err);
            }

            let unsettled = self.collect_unsettled(index_id, &submitted).await?;

            for id in &pending {
                let status = unsettled.get(id.as_str()).copied().unwrap_or(IndexStatus::Completed);
                if let Some(&position) = positions.get(id.as_str()) {
                    result.statuses[position].transfer_status = status;
                }
            }

            pending.retain(|id| unsettled.contains_key(id.as_str()));

            if pending.is_empty() {
                break;
            }
            if attempt >= self.settings.max_attempts {
                warn!(
                    incomplete = pending.len(),
                    rounds = result.rounds,
                    "Giving up on incomplete documents"
                );
                break;
            }

            attempt += 1;
            warn!(incomplete = pending.len(), attempt, "Retrying index submissions");
        }

        Ok(result)
    }

    /// Submit `ids` in paced batches
    async fn submit(&self, index_id: &str, ids: &[String], cancel: &CancellationToken) -> Result<()> {
        let mut chunks = ids.chunks(self.settings.batch_size.max(1)).peekable();

        while let Some(chunk) = chunks.next() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let batch = self.backend.submit_batch(index_id, chunk).await?;
            debug!(batch_id = %batch.id, size = chunk.len(), status = %batch.status, "Submitted batch");

            if chunks.peek().is_some() {
                pause(self.settings.submission_delay, cancel).await?;
            }
        }

        Ok(())
    }

    /// Poll until no submitted entry is `in_progress` or the window closes
    async fn wait_for_settlement(
        &self,
        index_id: &str,
        submitted: &HashSet<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let deadline = Instant::now() + self.settings.poll_timeout;

        loop {
            let in_progress = self
                .list_entries(index_id, Some(IndexStatus::InProgress))
                .await?
                .into_iter()
                .filter(|entry| submitted.contains(entry.document_id.as_str()))
                .count();

            if in_progress == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                info!(in_progress, "Poll window elapsed with documents still processing");
                return Ok(());
            }

            debug!(in_progress, "Waiting for index to finish processing");
            pause(self.settings.poll_interval, cancel).await?;
        }
    }

    /// Remove submitted entries that are still `in_progress` or `failed`,
    /// returning their statuses
    async fn collect_unsettled(
        &self,
        index_id: &str,
        submitted: &HashSet<&str>,
    ) -> Result<HashMap<String, IndexStatus>> {
        let mut unsettled = HashMap::new();

        for status in [IndexStatus::InProgress, IndexStatus::Failed] {
            for entry in self.list_entries(index_id, Some(status)).await? {
                if !submitted.contains(entry.document_id.as_str()) {
                    continue;
                }
                if let Err(err) = self.backend.delete_entry(index_id, &entry.document_id).await {
                    warn!(id = %entry.document_id, error = %err, "Failed to remove unsettled entry");
                }
                unsettled.insert(entry.document_id, entry.status);
            }
        }

        Ok(unsettled)
    }

    /// Remove this round's unsettled entries after a cancellation so the
    /// index holds no half-processed members
    async fn abandon_round(&self, index_id: &str, submitted: &HashSet<&str>) {
        match self.collect_unsettled(index_id, submitted).await {
            Ok(removed) => info!(removed = removed.len(), "Removed unsettled entries after cancellation"),
            Err(err) => warn!(error = %err, "Could not clean up index after cancellation"),
        }
    }

    /// Drop handles the index already holds.
    ///
    /// A handle present as `completed` is never resubmitted. An incomplete
    /// one is removed and resubmitted when `purge_incomplete` is set, and
    /// otherwise left alone like a completed one.
    #[instrument(skip(self, handles), fields(handles = handles.len()))]
    pub async fn screen_pending(
        &self,
        index_id: &str,
        handles: Vec<DocumentHandle>,
        purge_incomplete: bool,
    ) -> Result<Screening> {
        let indexed: HashMap<String, IndexStatus> = self
            .list_entries(index_id, None)
            .await?
            .into_iter()
            .map(|entry| (entry.document_id, entry.status))
            .collect();

        let mut screening = Screening::default();
        for handle in handles {
            match indexed.get(&handle.id) {
                None => screening.pending.push(handle),
                Some(status) if purge_incomplete && *status != IndexStatus::Completed => {
                    debug!(id = %handle.id, status = %status, "Purging incomplete index entry");
                    self.backend.delete_entry(index_id, &handle.id).await?;
                    screening.purged += 1;
                    screening.pending.push(handle);
                }
                Some(_) => screening.already_indexed += 1,
            }
        }

        info!(
            pending = screening.pending.len(),
            already_indexed = screening.already_indexed,
            purged = screening.purged,
            "Screened handles against index"
        );
        Ok(screening)
    }

    /// Remove every entry from `index_id`, returning how many were removed.
    /// Individual failures are logged and skipped.
    #[instrument(skip(self))]
    pub async fn clear_index(&self, index_id: &str) -> Result<usize> {
        let entries = self.list_entries(index_id, None).await?;
        let mut deleted = 0;

        for entry in entries {
            match self.backend.delete_entry(index_id, &entry.document_id).await {
                Ok(()) => deleted += 1,
                Err(err) => warn!(id = %entry.document_id, error = %err, "Failed to remove index entry"),
            }
        }

        info!(deleted, "Cleared index");
        Ok(deleted)
    }
}

/// Sleep for `duration` unless cancelled first
async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::index::BatchRef;
    use std::sync::Mutex;

    /// Index whose entries settle to a fixed status as soon as submitted
    struct SettlingIndex {
        outcome: fn(&str, u32) -> IndexStatus,
        entries: Mutex<HashMap<String, IndexStatus>>,
        submissions: Mutex<Vec<usize>>,
        rounds: Mutex<u32>,
    }

    impl SettlingIndex {
        fn new(outcome: fn(&str, u32) -> IndexStatus) -> Self {
            Self {
                outcome,
                entries: Mutex::new(HashMap::new()),
                submissions: Mutex::new(Vec::new()),
                rounds: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl IndexBackend for SettlingIndex {
        async fn submit_batch(&self, _index_id: &str, ids: &[String]) -> BridgeResult<BatchRef> {
            let mut submissions = self.submissions.lock().unwrap();
            submissions.push(ids.len());
            let round = *self.rounds.lock().unwrap();
            let mut entries = self.entries.lock().unwrap();
            for id in ids {
                entries.insert(id.clone(), (self.outcome)(id, round));
            }
            Ok(BatchRef {
                id: format!("batch-{}", submissions.len()),
                status: IndexStatus::InProgress,
            })
        }

        async fn list_entries(
            &self,
            _index_id: &str,
            status: Option<IndexStatus>,
            _page_token: Option<String>,
        ) -> BridgeResult<(Vec<IndexEntry>, Option<String>)> {
            let entries = self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, s)| status.map_or(true, |wanted| **s == wanted))
                .map(|(id, s)| IndexEntry {
                    document_id: id.clone(),
                    status: *s,
                })
                .collect();
            Ok((entries, None))
        }

        async fn delete_entry(&self, _index_id: &str, document_id: &str) -> BridgeResult<()> {
            self.entries.lock().unwrap().remove(document_id);
            // Each classification pass ends a round
            *self.rounds.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn handles(count: usize) -> Vec<DocumentHandle> {
        (0..count)
            .map(|i| DocumentHandle {
                id: format!("file-{}", i),
                filename: format!("doc-{}.pdf", i),
                bytes: 1,
                created_at: None,
            })
            .collect()
    }

    fn fast_settings() -> SyncSettings {
        SyncSettings {
            submission_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
            poll_timeout: Duration::from_millis(50),
            ..SyncSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_into_batches_of_fifty() {
        let index = Arc::new(SettlingIndex::new(|_, _| IndexStatus::Completed));
        let synchronizer = IndexSynchronizer::new(index.clone(), fast_settings());

        let result = synchronizer
            .synchronize("vs_1", &handles(120), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*index.submissions.lock().unwrap(), vec![50, 50, 20]);
        assert_eq!(result.rounds, 1);
        assert_eq!(result.count(IndexStatus::Completed), 120);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_stops_after_max_attempts_plus_one_rounds() {
        let index = Arc::new(SettlingIndex::new(|_, _| IndexStatus::Failed));
        let settings = SyncSettings {
            max_attempts: 3,
            ..fast_settings()
        };
        let synchronizer = IndexSynchronizer::new(index.clone(), settings);

        let result = synchronizer
            .synchronize("vs_1", &handles(7), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.rounds, 4);
        assert_eq!(index.submissions.lock().unwrap().len(), 4);
        assert_eq!(result.statuses.len(), 7);
        assert_eq!(result.count(IndexStatus::Failed), 7);
        assert!(index.entries.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_only_resubmits_incomplete_subset() {
        // file-0 fails on the first round only
        let index = Arc::new(SettlingIndex::new(|id, round| {
            if id == "file-0" && round == 0 {
                IndexStatus::Failed
            } else {
                IndexStatus::Completed
            }
        }));
        let synchronizer = IndexSynchronizer::new(index.clone(), fast_settings());

        let result = synchronizer
            .synchronize("vs_1", &handles(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*index.submissions.lock().unwrap(), vec![3, 1]);
        assert_eq!(result.rounds, 2);
        assert_eq!(result.count(IndexStatus::Completed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_progress_past_timeout_is_reported_incomplete() {
        let index = Arc::new(SettlingIndex::new(|_, _| IndexStatus::InProgress));
        let settings = SyncSettings {
            max_attempts: 0,
            ..fast_settings()
        };
        let synchronizer = IndexSynchronizer::new(index.clone(), settings);

        let result = synchronizer
            .synchronize("vs_1", &handles(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.rounds, 1);
        assert_eq!(result.incomplete().count(), 2);
        assert_eq!(result.count(IndexStatus::InProgress), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_handles_reported_once() {
        let index = Arc::new(SettlingIndex::new(|_, _| IndexStatus::Completed));
        let synchronizer = IndexSynchronizer::new(index, fast_settings());
        let mut input = handles(2);
        input.push(input[0].clone());

        let result = synchronizer
            .synchronize("vs_1", &input, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.statuses.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_stops_before_submitting() {
        let index = Arc::new(SettlingIndex::new(|_, _| IndexStatus::Completed));
        let synchronizer = IndexSynchronizer::new(index.clone(), fast_settings());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = synchronizer.synchronize("vs_1", &handles(3), &cancel).await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(index.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_polling_removes_unsettled_entries() {
        let index = Arc::new(SettlingIndex::new(|_, _| IndexStatus::InProgress));
        let settings = SyncSettings {
            poll_timeout: Duration::from_secs(3600),
            ..fast_settings()
        };
        let synchronizer = IndexSynchronizer::new(index.clone(), settings);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = synchronizer.synchronize("vs_1", &handles(60), &cancel).await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(*index.submissions.lock().unwrap(), vec![50, 10]);
        assert!(index.entries.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_batches_keeps_settled_entries() {
        let index = Arc::new(SettlingIndex::new(|id, _| {
            if id == "file-0" {
                IndexStatus::Failed
            } else {
                IndexStatus::Completed
            }
        }));
        let settings = SyncSettings {
            batch_size: 2,
            submission_delay: Duration::from_secs(10),
            ..fast_settings()
        };
        let synchronizer = IndexSynchronizer::new(index.clone(), settings);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = synchronizer.synchronize("vs_1", &handles(4), &cancel).await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(*index.submissions.lock().unwrap(), vec![2]);
        let entries = index.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get("file-1"), Some(&IndexStatus::Completed));
    }

    #[tokio::test]
    async fn test_screen_pending_skips_completed_and_purges_incomplete() {
        let index = Arc::new(SettlingIndex::new(|_, _| IndexStatus::Completed));
        index
            .entries
            .lock()
            .unwrap()
            .extend([
                ("file-0".to_string(), IndexStatus::Completed),
                ("file-1".to_string(), IndexStatus::Failed),
            ]);
        let synchronizer = IndexSynchronizer::new(index.clone(), fast_settings());

        let screening = synchronizer.screen_pending("vs_1", handles(3), true).await.unwrap();

        let pending: Vec<&str> = screening.pending.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(pending, vec!["file-1", "file-2"]);
        assert_eq!(screening.already_indexed, 1);
        assert_eq!(screening.purged, 1);
        assert!(!index.entries.lock().unwrap().contains_key("file-1"));
    }

    #[tokio::test]
    async fn test_clear_index_counts_removed_entries() {
        let index = Arc::new(SettlingIndex::new(|_, _| IndexStatus::Completed));
        index.submit_batch("vs_1", &["a".to_string(), "b".to_string()]).await.unwrap();
        let synchronizer = IndexSynchronizer::new(index.clone(), fast_settings());

        assert_eq!(synchronizer.clear_index("vs_1").await.unwrap(), 2);
        assert!(index.entries.lock().unwrap().is_empty());
    }
}
