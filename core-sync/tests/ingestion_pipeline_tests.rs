//! Integration tests for the ingestion pipeline
//!
//! These tests drive `IngestionCoordinator` end to end against in-memory
//! collaborators:
//! - Flat bucket ingestion with batching, retries and summary
//! - Idempotent re-runs
//! - Tree ingestion with native export
//! - Profile resolution before any I/O
//! - Background jobs, index locking and cancellation

use async_trait::async_trait;
use bridge_traits::{
    documents::{DocumentHandle, DocumentStore},
    error::{BridgeError, Result as BridgeResult},
    index::{BatchRef, IndexBackend, IndexEntry, IndexStatus},
    object_store::ObjectStore,
    tree::{NodeKind, RemoteNode, SharedDrive, TreeSource},
};
use bytes::Bytes;
use core_runtime::config::{CollisionPolicy, CoreConfig, ProfileConfig, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus, IngestEvent};
use core_sync::{
    DocumentPreprocessor, DocumentSet, IngestionCoordinator, IngestionDetails, IngestionResponse,
    JobStatus, ProfileClients, SyncError, UploadPolicy,
};
use mockall::mock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// In-memory collaborators
// ============================================================================

/// Bucket contents served two keys per page
#[derive(Default)]
struct MemoryBucket {
    objects: BTreeMap<String, Bytes>,
}

impl MemoryBucket {
    fn with_documents(folders: &[&str], per_folder: usize) -> Self {
        let mut objects = BTreeMap::new();
        for folder in folders {
            for i in 0..per_folder {
                let key = format!("{}/doc-{:03}.pdf", folder, i);
                objects.insert(key.clone(), Bytes::from(key));
            }
        }
        objects.insert("hr/notes.txt".to_string(), Bytes::from_static(b"skip me"));
        Self { objects }
    }
}

#[async_trait]
impl ObjectStore for MemoryBucket {
    async fn list(
        &self,
        _bucket: &str,
        continuation_token: Option<String>,
    ) -> BridgeResult<(Vec<String>, Option<String>)> {
        let keys: Vec<String> = self.objects.keys().cloned().collect();
        let start: usize = continuation_token.map_or(0, |t| t.parse().unwrap());
        let end = (start + 2).min(keys.len());
        let next = (end < keys.len()).then(|| end.to_string());
        Ok((keys[start..end].to_vec(), next))
    }

    async fn get(&self, _bucket: &str, key: &str) -> BridgeResult<Bytes> {
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::NotAvailable(key.to_string()))
    }

    async fn exists(&self, _bucket: &str, key: &str) -> BridgeResult<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn put(
        &self,
        _bucket: &str,
        _key: &str,
        _data: Bytes,
        _metadata: HashMap<String, String>,
    ) -> BridgeResult<()> {
        Ok(())
    }
}

/// Document store assigning ids derived from the filename
#[derive(Default)]
struct MemoryDocuments {
    documents: Mutex<BTreeMap<String, DocumentHandle>>,
    uploads: Mutex<usize>,
}

impl MemoryDocuments {
    fn seed(&self, filename: &str) -> DocumentHandle {
        let handle = DocumentHandle {
            id: document_id(filename),
            filename: filename.to_string(),
            bytes: 1,
            created_at: None,
        };
        self.documents
            .lock()
            .unwrap()
            .insert(handle.id.clone(), handle.clone());
        handle
    }

    fn uploads(&self) -> usize {
        *self.uploads.lock().unwrap()
    }
}

fn document_id(filename: &str) -> String {
    format!("file-{}", filename)
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn create(&self, name: &str, data: Bytes) -> BridgeResult<DocumentHandle> {
        *self.uploads.lock().unwrap() += 1;
        let handle = DocumentHandle {
            id: document_id(name),
            filename: name.to_string(),
            bytes: data.len() as u64,
            created_at: None,
        };
        self.documents
            .lock()
            .unwrap()
            .insert(handle.id.clone(), handle.clone());
        Ok(handle)
    }

    async fn list(&self, _after: Option<String>) -> BridgeResult<(Vec<DocumentHandle>, Option<String>)> {
        Ok((self.documents.lock().unwrap().values().cloned().collect(), None))
    }

    async fn delete(&self, id: &str) -> BridgeResult<()> {
        self.documents.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Index that settles immediately; ids in `failing` always fail and ids in
/// `stuck` never leave `in_progress`
#[derive(Default)]
struct MemoryIndex {
    entries: Mutex<HashMap<String, IndexStatus>>,
    failing: HashSet<String>,
    stuck: bool,
    submissions: Mutex<Vec<usize>>,
}

impl MemoryIndex {
    fn failing(ids: &[String]) -> Self {
        Self {
            failing: ids.iter().cloned().collect(),
            ..Self::default()
        }
    }

    fn stuck() -> Self {
        Self {
            stuck: true,
            ..Self::default()
        }
    }

    fn seed(&self, id: &str, status: IndexStatus) {
        self.entries.lock().unwrap().insert(id.to_string(), status);
    }

    fn submissions(&self) -> Vec<usize> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexBackend for MemoryIndex {
    async fn submit_batch(&self, _index_id: &str, document_ids: &[String]) -> BridgeResult<BatchRef> {
        self.submissions.lock().unwrap().push(document_ids.len());
        let mut entries = self.entries.lock().unwrap();
        for id in document_ids {
            let status = if self.stuck {
                IndexStatus::InProgress
            } else if self.failing.contains(id) {
                IndexStatus::Failed
            } else {
                IndexStatus::Completed
            };
            entries.insert(id.clone(), status);
        }
        Ok(BatchRef {
            id: "batch".to_string(),
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
        Ok(())
    }
}

/// Single folder holding one binary file and one native document
struct MemoryTree;

#[async_trait]
impl TreeSource for MemoryTree {
    async fn list_children(
        &self,
        folder_id: &str,
        _drive_id: Option<&str>,
        _page_token: Option<String>,
    ) -> BridgeResult<(Vec<RemoteNode>, Option<String>)> {
        let children = match folder_id {
            "root" => vec![RemoteNode {
                id: "policies".to_string(),
                name: "Policies".to_string(),
                kind: NodeKind::Folder,
                mime_type: Some("application/vnd.google-apps.folder".to_string()),
                shortcut: None,
                md5_checksum: None,
                modified_time: None,
            }],
            "policies" => vec![
                RemoteNode {
                    id: "pdf-1".to_string(),
                    name: "Leave.pdf".to_string(),
                    kind: NodeKind::File,
                    mime_type: Some("application/pdf".to_string()),
                    shortcut: None,
                    md5_checksum: Some("abc".to_string()),
                    modified_time: None,
                },
                RemoteNode {
                    id: "doc-1".to_string(),
                    name: "Handbook".to_string(),
                    kind: NodeKind::File,
                    mime_type: Some("application/vnd.google-apps.document".to_string()),
                    shortcut: None,
                    md5_checksum: None,
                    modified_time: None,
                },
            ],
            _ => Vec::new(),
        };
        Ok((children, None))
    }

    async fn list_drives(
        &self,
        _page_token: Option<String>,
    ) -> BridgeResult<(Vec<SharedDrive>, Option<String>)> {
        Ok((Vec::new(), None))
    }

    async fn download(&self, file_id: &str) -> BridgeResult<Bytes> {
        Ok(Bytes::from(format!("binary-{}", file_id)))
    }

    async fn export(&self, file_id: &str, mime_type: &str) -> BridgeResult<Bytes> {
        Ok(Bytes::from(format!("{} as {}", file_id, mime_type)))
    }
}

mock! {
    pub Documents {}

    #[async_trait]
    impl DocumentStore for Documents {
        async fn create(&self, name: &str, data: Bytes) -> BridgeResult<DocumentHandle>;
        async fn list(&self, after: Option<String>) -> BridgeResult<(Vec<DocumentHandle>, Option<String>)>;
        async fn delete(&self, id: &str) -> BridgeResult<()>;
    }
}

mock! {
    pub Index {}

    #[async_trait]
    impl IndexBackend for Index {
        async fn submit_batch(&self, index_id: &str, document_ids: &[String]) -> BridgeResult<BatchRef>;
        async fn list_entries(
            &self,
            index_id: &str,
            status: Option<IndexStatus>,
            page_token: Option<String>,
        ) -> BridgeResult<(Vec<IndexEntry>, Option<String>)>;
        async fn delete_entry(&self, index_id: &str, document_id: &str) -> BridgeResult<()>;
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_settings(max_attempts: u32) -> SyncSettings {
    SyncSettings {
        submission_delay: Duration::from_millis(100),
        poll_interval: Duration::from_millis(100),
        poll_timeout: Duration::from_secs(1),
        max_attempts,
        ..SyncSettings::default()
    }
}

fn flat_config(max_attempts: u32) -> CoreConfig {
    CoreConfig::builder()
        .profile(
            "hr",
            ProfileConfig::new("vs_hr").with_flat_source("docs", ["hr", "legal"]),
        )
        .profile("empty", ProfileConfig::new("vs_empty"))
        .sync(fast_settings(max_attempts))
        .build()
        .unwrap()
}

struct Harness {
    coordinator: IngestionCoordinator,
    documents: Arc<MemoryDocuments>,
    index: Arc<MemoryIndex>,
    event_bus: Arc<EventBus>,
}

async fn flat_harness(config: CoreConfig, index: MemoryIndex) -> Harness {
    let event_bus = Arc::new(EventBus::new(256));
    let coordinator = IngestionCoordinator::new(config, event_bus.clone());
    let documents = Arc::new(MemoryDocuments::default());
    let index = Arc::new(index);
    let bucket = Arc::new(MemoryBucket::with_documents(&["hr", "legal"], 60));

    coordinator
        .register_profile(
            "hr",
            ProfileClients::new(documents.clone(), index.clone()).with_object_store(bucket),
        )
        .await
        .unwrap();

    Harness {
        coordinator,
        documents,
        index,
        event_bus,
    }
}

fn drain(receiver: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<IngestEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let CoreEvent::Ingest(event) = event {
            events.push(event);
        }
    }
    events
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_flat_ingestion_end_to_end() {
    let failing = vec![
        document_id("hr__doc-007.pdf"),
        document_id("legal__doc-042.pdf"),
    ];
    let harness = flat_harness(flat_config(1), MemoryIndex::failing(&failing)).await;
    let mut events = harness.event_bus.subscribe();

    // Ten documents were uploaded and indexed by an earlier run
    for i in 0..10 {
        let handle = harness.documents.seed(&format!("hr__doc-{:03}.pdf", i + 20));
        harness.index.seed(&handle.id, IndexStatus::Completed);
    }

    let response = harness
        .coordinator
        .run_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();

    let summary = response.summary().expect("run should synchronize").clone();
    assert_eq!(summary.total, 110);
    assert_eq!(summary.count(IndexStatus::Completed), 108);
    assert_eq!(summary.count(IndexStatus::Failed), 2);
    assert_eq!(
        summary.errored_files,
        vec!["hr__doc-007.pdf", "legal__doc-042.pdf"]
    );
    assert_eq!(summary.already_exist, Some(10));

    assert_eq!(harness.documents.uploads(), 110);
    // Three batches, then one retry round for the two failures
    assert_eq!(harness.index.submissions(), vec![50, 50, 10, 2]);

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(IngestEvent::Started { profile, .. }) if profile == "hr"));
    assert!(events.iter().any(|e| matches!(
        e,
        IngestEvent::Completed { total: 110, completed: 108, failed: 2, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_second_run_uploads_nothing() {
    let harness = flat_harness(flat_config(5), MemoryIndex::default()).await;

    let first = harness
        .coordinator
        .run_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();
    assert_eq!(first.summary().unwrap().total, 120);

    let second = harness
        .coordinator
        .run_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();

    assert_eq!(second, IngestionResponse::nothing_uploaded());
    assert_eq!(harness.documents.uploads(), 120);
    assert_eq!(harness.index.submissions(), vec![50, 50, 20]);
}

#[tokio::test(start_paused = true)]
async fn test_replace_existing_reuploads_and_purge_resubmits() {
    let harness = flat_harness(flat_config(0), MemoryIndex::default()).await;

    harness
        .coordinator
        .run_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();

    let response = harness
        .coordinator
        .run_ingestion("hr", UploadPolicy::ReplaceExisting, true)
        .await
        .unwrap();

    assert_eq!(response.summary().unwrap().total, 120);
    assert_eq!(harness.documents.uploads(), 240);
    assert_eq!(harness.index.submissions(), vec![50, 50, 20, 50, 50, 20]);
}

#[tokio::test(start_paused = true)]
async fn test_tree_ingestion_exports_native_documents() {
    let config = CoreConfig::builder()
        .profile("legal", ProfileConfig::new("vs_legal").with_tree_source("root", None))
        .sync(fast_settings(0))
        .build()
        .unwrap();
    let coordinator = IngestionCoordinator::new(config, Arc::new(EventBus::new(16)));
    let documents = Arc::new(MemoryDocuments::default());
    let index = Arc::new(MemoryIndex::default());
    coordinator
        .register_profile(
            "legal",
            ProfileClients::new(documents.clone(), index.clone()).with_tree_source(Arc::new(MemoryTree)),
        )
        .await
        .unwrap();

    let response = coordinator
        .run_ingestion("legal", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();

    assert_eq!(response.summary().unwrap().total, 2);
    let names: Vec<String> = documents
        .documents
        .lock()
        .unwrap()
        .values()
        .map(|h| h.filename.clone())
        .collect();
    assert_eq!(names, vec!["Policies__Handbook.docx", "Policies__Leave.pdf"]);
}

#[tokio::test]
async fn test_profile_without_source_is_skipped() {
    let harness = flat_harness(flat_config(0), MemoryIndex::default()).await;
    harness
        .coordinator
        .register_profile(
            "empty",
            ProfileClients::new(harness.documents.clone(), harness.index.clone()),
        )
        .await
        .unwrap();

    let response = harness
        .coordinator
        .run_ingestion("empty", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();

    assert_eq!(response, IngestionResponse::no_source("empty"));
}

#[tokio::test]
async fn test_unknown_profile_fails_before_any_io() {
    let event_bus = Arc::new(EventBus::new(16));
    let coordinator = IngestionCoordinator::new(flat_config(0), event_bus);

    // Mocks without expectations panic on any call
    let clients = ProfileClients::new(Arc::new(MockDocuments::new()), Arc::new(MockIndex::new()));
    let err = coordinator
        .register_profile("ghost", clients.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnknownProfile(ref name) if name == "ghost"));

    let err = coordinator
        .run_ingestion("ghost", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnknownProfile(_)));

    // Configured but never registered
    coordinator.register_profile("empty", clients).await.unwrap();
    let err = coordinator
        .run_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
}

#[tokio::test]
async fn test_backend_error_becomes_failure_payload() {
    let mut documents = MockDocuments::new();
    documents
        .expect_list()
        .returning(|_| Err(BridgeError::Remote {
            status_code: 503,
            message: "unavailable".to_string(),
        }));

    let coordinator = IngestionCoordinator::new(flat_config(0), Arc::new(EventBus::new(16)));
    let bucket = Arc::new(MemoryBucket::with_documents(&["hr"], 1));
    coordinator
        .register_profile(
            "hr",
            ProfileClients::new(Arc::new(documents), Arc::new(MockIndex::new()))
                .with_object_store(bucket),
        )
        .await
        .unwrap();

    let response = coordinator
        .run_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();

    match response {
        IngestionResponse::Failure { status, kind, error, .. } => {
            assert_eq!(status, "error");
            assert_eq!(kind, "Provider");
            assert!(error.contains("unavailable"));
        }
        other => panic!("expected failure payload, got {:?}", other),
    }

    let jobs = coordinator.list_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_background_job_completes() {
    let harness = flat_harness(flat_config(0), MemoryIndex::default()).await;

    let job_id = harness
        .coordinator
        .start_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();

    let mut job = harness.coordinator.get_status(job_id).await.unwrap();
    for _ in 0..100 {
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        job = harness.coordinator.get_status(job_id).await.unwrap();
    }

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.summary.as_ref().map(|s| s.total), Some(120));
    assert_eq!(job.progress.percent, 100);
    assert!(matches!(
        job.summary.map(|s| s.already_exist),
        Some(Some(0))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_start_is_rejected_and_cancel_stops_job() {
    let config = CoreConfig::builder()
        .profile(
            "hr",
            ProfileConfig::new("vs_hr").with_flat_source("docs", ["hr", "legal"]),
        )
        .sync(SyncSettings {
            poll_timeout: Duration::from_secs(3600),
            ..fast_settings(5)
        })
        .build()
        .unwrap();
    let harness = flat_harness(config, MemoryIndex::stuck()).await;

    let job_id = harness
        .coordinator
        .start_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();

    let err = harness
        .coordinator
        .start_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SyncInProgress { ref index_id } if index_id == "vs_hr"));

    // Let the job reach its polling loop
    tokio::time::sleep(Duration::from_secs(5)).await;

    harness.coordinator.cancel_ingestion(job_id).await.unwrap();
    let job = harness.coordinator.get_status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    // The index lock is released once the run has observed the cancellation
    // and removed the entries it left processing
    let cleared = tokio::time::timeout(
        Duration::from_secs(60),
        harness.coordinator.clear_index("hr"),
    )
    .await
    .expect("index lock should be released")
    .unwrap();
    assert_eq!(cleared.deleted_count, 0);
    assert_eq!(harness.index.submissions(), vec![50, 50, 20]);
    assert!(harness
        .index
        .entries
        .lock()
        .unwrap()
        .values()
        .all(|status| *status != IndexStatus::InProgress));

    let err = harness.coordinator.cancel_ingestion(job_id).await.unwrap_err();
    assert!(matches!(err, SyncError::JobNotFound { .. }));
}

#[tokio::test]
async fn test_finished_jobs_are_capped_by_history_setting() {
    let config = CoreConfig::builder()
        .profile("empty", ProfileConfig::new("vs_empty"))
        .sync(SyncSettings {
            job_history: 3,
            ..fast_settings(0)
        })
        .build()
        .unwrap();
    let coordinator = IngestionCoordinator::new(config, Arc::new(EventBus::new(64)));
    coordinator
        .register_profile(
            "empty",
            ProfileClients::new(
                Arc::new(MemoryDocuments::default()),
                Arc::new(MemoryIndex::default()),
            ),
        )
        .await
        .unwrap();

    let mut first_job = None;
    for _ in 0..20 {
        coordinator
            .run_ingestion("empty", UploadPolicy::UploadMissingOnly, false)
            .await
            .unwrap();
        if first_job.is_none() {
            first_job = coordinator.list_jobs().await.first().map(|job| job.id);
        }
    }

    let jobs = coordinator.list_jobs().await;
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|job| job.status == JobStatus::Completed));

    let err = coordinator.get_status(first_job.unwrap()).await.unwrap_err();
    assert!(matches!(err, SyncError::JobNotFound { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_preprocessor_rewrites_documents_before_upload() {
    let event_bus = Arc::new(EventBus::new(64));
    let coordinator = IngestionCoordinator::new(flat_config(0), event_bus);
    let documents = Arc::new(MemoryDocuments::default());
    let index = Arc::new(MemoryIndex::default());
    let bucket = Arc::new(MemoryBucket::with_documents(&["hr", "legal"], 60));

    let legal_only: DocumentPreprocessor = Arc::new(|incoming: DocumentSet| {
        let mut kept = DocumentSet::new(CollisionPolicy::KeepLast);
        for (name, data) in incoming {
            if name.starts_with("legal__") {
                kept.insert(&name, data).unwrap();
            }
        }
        kept
    });
    coordinator
        .register_profile(
            "hr",
            ProfileClients::new(documents.clone(), index.clone())
                .with_object_store(bucket)
                .with_preprocessor(legal_only),
        )
        .await
        .unwrap();

    let response = coordinator
        .run_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
        .await
        .unwrap();

    assert_eq!(response.summary().unwrap().total, 60);
    assert_eq!(documents.uploads(), 60);
    assert!(documents
        .documents
        .lock()
        .unwrap()
        .values()
        .all(|handle| handle.filename.starts_with("legal__")));
    assert_eq!(index.submissions(), vec![50, 10]);
}

#[tokio::test]
async fn test_clear_documents_reports_deleted_ids() {
    let harness = flat_harness(flat_config(0), MemoryIndex::default()).await;
    harness.documents.seed("a.pdf");
    harness.documents.seed("b.pdf");

    let response = harness.coordinator.clear_documents("hr").await.unwrap();

    assert_eq!(response.deleted_file_ids, vec!["file-a.pdf", "file-b.pdf"]);
    assert!(harness.documents.documents.lock().unwrap().is_empty());
    assert!(matches!(
        IngestionResponse::nothing_uploaded(),
        IngestionResponse::Success { details: IngestionDetails::Note(_), .. }
    ));
}
