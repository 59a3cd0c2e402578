//! # Ingestion Coordinator
//!
//! Runs the ingestion pipeline for named profiles.
//!
//! ## Overview
//!
//! Each profile names a search index and a source. The coordinator owns the
//! collaborators registered for every profile and chains the stages:
//!
//! 1. Optionally purge the profile's index
//! 2. Collect documents from the flat store or the tree source
//! 3. Reconcile them against the document store ([`DocumentUploader`])
//! 4. Screen out handles the index already holds
//! 5. Synchronize the rest ([`IndexSynchronizer`]) and summarize
//!
//! At most one run touches an index at a time. [`run_ingestion`] waits for
//! the index to be free; [`start_ingestion`] refuses with `SyncInProgress`
//! and otherwise runs in the background, returning a job id to poll with
//! [`get_status`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{IngestionCoordinator, ProfileClients, UploadPolicy};
//!
//! coordinator
//!     .register_profile("hr", ProfileClients::new(documents, index).with_object_store(s3))
//!     .await?;
//!
//! let job_id = coordinator
//!     .start_ingestion("hr", UploadPolicy::UploadMissingOnly, false)
//!     .await?;
//! let job = coordinator.get_status(job_id).await?;
//! println!("{}: {}%", job.status, job.progress.percent);
//! ```
//!
//! [`run_ingestion`]: IngestionCoordinator::run_ingestion
//! [`start_ingestion`]: IngestionCoordinator::start_ingestion
//! [`get_status`]: IngestionCoordinator::get_status

use bridge_traits::documents::{DocumentHandle, DocumentStore};
use bridge_traits::index::{IndexBackend, IndexStatus};
use bridge_traits::object_store::ObjectStore;
use bridge_traits::tree::TreeSource;
use core_runtime::config::{CoreConfig, ProfileConfig, SourceConfig};
use core_runtime::events::{CoreEvent, EventBus, IngestEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::harvester::TreeHarvester;
use crate::job::{IngestJob, IngestJobId};
use crate::lister::FlatLister;
use crate::naming::DocumentSet;
use crate::report::summarize;
use crate::response::{ClearDocumentsResponse, ClearIndexResponse, IngestionResponse};
use crate::synchronizer::IndexSynchronizer;
use crate::uploader::{DocumentUploader, UploadPolicy};
use crate::{Result, SyncError};

/// Rewrites the collected documents before they are uploaded
pub type DocumentPreprocessor = Arc<dyn Fn(DocumentSet) -> DocumentSet + Send + Sync>;

/// Collaborators one profile ingests with
#[derive(Clone)]
pub struct ProfileClients {
    pub documents: Arc<dyn DocumentStore>,
    pub index: Arc<dyn IndexBackend>,
    /// Required when the profile reads from a bucket
    pub object_store: Option<Arc<dyn ObjectStore>>,
    /// Required when the profile reads from a tree
    pub tree_source: Option<Arc<dyn TreeSource>>,
    /// Applied to every run's documents between collection and upload
    pub preprocessor: Option<DocumentPreprocessor>,
}

impl ProfileClients {
    pub fn new(documents: Arc<dyn DocumentStore>, index: Arc<dyn IndexBackend>) -> Self {
        Self {
            documents,
            index,
            object_store: None,
            tree_source: None,
            preprocessor: None,
        }
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn with_tree_source(mut self, source: Arc<dyn TreeSource>) -> Self {
        self.tree_source = Some(source);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: DocumentPreprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }
}

/// Everything a run needs, resolved before any I/O
#[derive(Clone)]
struct ResolvedProfile {
    name: String,
    config: ProfileConfig,
    clients: ProfileClients,
}

/// Job records, plus finished job ids oldest first
#[derive(Default)]
struct JobTable {
    jobs: HashMap<IngestJobId, IngestJob>,
    finished: VecDeque<IngestJobId>,
}

impl JobTable {
    /// Store a terminal job and evict the oldest finished ones beyond `limit`
    fn retire(&mut self, job: IngestJob, limit: usize) {
        let job_id = job.id;
        self.jobs.insert(job_id, job);
        self.finished.push_back(job_id);

        while self.finished.len() > limit {
            let Some(evicted) = self.finished.pop_front() else {
                break;
            };
            self.jobs.remove(&evicted);
            debug!(job_id = %evicted, "Evicted finished job");
        }
    }
}

#[derive(Clone)]
pub struct IngestionCoordinator {
    config: Arc<CoreConfig>,

    /// Registered collaborators by profile name
    clients: Arc<RwLock<HashMap<String, ProfileClients>>>,

    /// One lock per index id, held for the duration of a run
    index_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,

    /// Running jobs and the most recent `job_history` finished ones
    jobs: Arc<RwLock<JobTable>>,

    /// Cancellation handles of running jobs
    active: Arc<Mutex<HashMap<IngestJobId, CancellationToken>>>,

    event_bus: Arc<EventBus>,
}

impl IngestionCoordinator {
    pub fn new(config: CoreConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            config: Arc::new(config),
            clients: Arc::new(RwLock::new(HashMap::new())),
            index_locks: Arc::new(Mutex::new(HashMap::new())),
            jobs: Arc::new(RwLock::new(JobTable::default())),
            active: Arc::new(Mutex::new(HashMap::new())),
            event_bus,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Attach collaborators to a configured profile (replacing earlier ones)
    ///
    /// # Errors
    ///
    /// `UnknownProfile` when the configuration does not name `profile`.
    pub async fn register_profile(&self, profile: &str, clients: ProfileClients) -> Result<()> {
        if self.config.profile(profile).is_none() {
            return Err(SyncError::UnknownProfile(profile.to_string()));
        }
        self.clients
            .write()
            .await
            .insert(profile.to_string(), clients);
        info!(profile, "Registered profile clients");
        Ok(())
    }

    async fn resolve(&self, profile: &str) -> Result<ResolvedProfile> {
        let config = self
            .config
            .profile(profile)
            .cloned()
            .ok_or_else(|| SyncError::UnknownProfile(profile.to_string()))?;

        let clients = self
            .clients
            .read()
            .await
            .get(profile)
            .cloned()
            .ok_or_else(|| {
                SyncError::Configuration(format!("No clients registered for profile '{}'", profile))
            })?;

        match config.source() {
            Some(SourceConfig::Flat { .. }) if clients.object_store.is_none() => {
                return Err(SyncError::Configuration(format!(
                    "Profile '{}' reads from a bucket but has no object store client",
                    profile
                )));
            }
            Some(SourceConfig::Tree { .. }) if clients.tree_source.is_none() => {
                return Err(SyncError::Configuration(format!(
                    "Profile '{}' reads from a tree but has no tree source client",
                    profile
                )));
            }
            _ => {}
        }

        Ok(ResolvedProfile {
            name: profile.to_string(),
            config,
            clients,
        })
    }

    async fn index_lock(&self, index_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.index_locks.lock().await;
        locks
            .entry(index_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run an ingestion to completion.
    ///
    /// Waits while another run holds the profile's index. Pipeline failures
    /// come back as a failure payload.
    ///
    /// # Errors
    ///
    /// Only for problems found before any I/O: unknown profile or missing
    /// collaborators.
    #[instrument(skip(self))]
    pub async fn run_ingestion(
        &self,
        profile: &str,
        policy: UploadPolicy,
        purge_before: bool,
    ) -> Result<IngestionResponse> {
        let resolved = self.resolve(profile).await?;
        let lock = self.index_lock(&resolved.config.index_id).await;
        let _guard = lock.lock_owned().await;

        let (job_id, cancellation_token) = self.begin_job(&resolved, policy).await?;
        Ok(self
            .run_job(job_id, resolved, policy, purge_before, cancellation_token)
            .await)
    }

    /// Start an ingestion in the background and return its job id.
    ///
    /// # Errors
    ///
    /// `SyncInProgress` when a run already holds the profile's index, plus
    /// the errors of [`run_ingestion`](Self::run_ingestion).
    #[instrument(skip(self))]
    pub async fn start_ingestion(
        &self,
        profile: &str,
        policy: UploadPolicy,
        purge_before: bool,
    ) -> Result<IngestJobId> {
        let resolved = self.resolve(profile).await?;
        let index_id = resolved.config.index_id.clone();
        let guard: OwnedMutexGuard<()> = self
            .index_lock(&index_id)
            .await
            .try_lock_owned()
            .map_err(|_| SyncError::SyncInProgress {
                index_id: index_id.clone(),
            })?;

        let (job_id, cancellation_token) = self.begin_job(&resolved, policy).await?;

        let coordinator = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let response = coordinator
                .run_job(job_id, resolved, policy, purge_before, cancellation_token)
                .await;
            if !response.is_success() {
                warn!(job_id = %job_id, message = response.message(), "Background ingestion did not succeed");
            }
        });

        info!(job_id = %job_id, index_id = %index_id, "Started background ingestion");
        Ok(job_id)
    }

    pub async fn get_status(&self, job_id: IngestJobId) -> Result<IngestJob> {
        self.jobs
            .read()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Running and recently finished jobs, most recent first
    pub async fn list_jobs(&self) -> Vec<IngestJob> {
        let mut jobs: Vec<IngestJob> = self.jobs.read().await.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Cancel a running job. The run stops at its next stage boundary,
    /// batch submission or wait.
    ///
    /// # Errors
    ///
    /// `JobNotFound` when the job is not running.
    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    pub async fn cancel_ingestion(&self, job_id: IngestJobId) -> Result<()> {
        let token = self.active.lock().await.get(&job_id).cloned();
        let Some(token) = token else {
            return Err(SyncError::JobNotFound {
                job_id: job_id.to_string(),
            });
        };

        token.cancel();

        let items_processed = {
            let mut table = self.jobs.write().await;
            match table.jobs.get(&job_id).cloned() {
                Some(job) => {
                    let processed = job.progress.items_processed;
                    if let Ok(cancelled) = job.cancel() {
                        table.retire(cancelled, self.config.sync.job_history);
                    }
                    processed
                }
                None => 0,
            }
        };

        self.event_bus
            .emit(CoreEvent::Ingest(IngestEvent::Cancelled {
                job_id: job_id.to_string(),
                items_processed,
            }))
            .ok();

        info!("Cancelled ingestion job");
        Ok(())
    }

    /// Remove every entry from the profile's index
    #[instrument(skip(self))]
    pub async fn clear_index(&self, profile: &str) -> Result<ClearIndexResponse> {
        let resolved = self.resolve(profile).await?;
        let lock = self.index_lock(&resolved.config.index_id).await;
        let _guard = lock.lock_owned().await;

        let synchronizer =
            IndexSynchronizer::new(resolved.clients.index.clone(), self.config.sync.clone());
        let deleted_count = synchronizer.clear_index(&resolved.config.index_id).await?;

        Ok(ClearIndexResponse { deleted_count })
    }

    /// Delete every document in the profile's document store
    #[instrument(skip(self))]
    pub async fn clear_documents(&self, profile: &str) -> Result<ClearDocumentsResponse> {
        let resolved = self.resolve(profile).await?;
        let uploader = DocumentUploader::new(resolved.clients.documents.clone());
        let deleted_file_ids = uploader.clear_all().await?;

        Ok(ClearDocumentsResponse {
            message: format!(
                "Deleted {} documents for profile {}",
                deleted_file_ids.len(),
                profile
            ),
            deleted_file_ids,
        })
    }

    async fn begin_job(
        &self,
        resolved: &ResolvedProfile,
        policy: UploadPolicy,
    ) -> Result<(IngestJobId, CancellationToken)> {
        let job = IngestJob::new(&resolved.name, &resolved.config.index_id, policy).start()?;
        let job_id = job.id;
        let cancellation_token = CancellationToken::new();

        self.jobs.write().await.jobs.insert(job_id, job);
        self.active
            .lock()
            .await
            .insert(job_id, cancellation_token.clone());

        self.event_bus
            .emit(CoreEvent::Ingest(IngestEvent::Started {
                job_id: job_id.to_string(),
                profile: resolved.name.clone(),
                index_id: resolved.config.index_id.clone(),
                policy: policy.to_string(),
            }))
            .ok();

        Ok((job_id, cancellation_token))
    }

    /// Execute the pipeline and record the outcome on the job
    #[instrument(skip(self, resolved, cancellation_token), fields(profile = %resolved.name))]
    async fn run_job(
        &self,
        job_id: IngestJobId,
        resolved: ResolvedProfile,
        policy: UploadPolicy,
        purge_before: bool,
        cancellation_token: CancellationToken,
    ) -> IngestionResponse {
        let profile = resolved.name.clone();
        let outcome = self
            .execute(job_id, &resolved, policy, purge_before, &cancellation_token)
            .await;

        self.active.lock().await.remove(&job_id);

        match outcome {
            Ok(response) => {
                let summary = response.summary().cloned();
                let finished = self
                    .finish_job(job_id, |job| {
                        job.complete(response.message().to_string(), summary.clone())
                    })
                    .await;
                // Cancelled after the last check point; the Cancelled event already went out
                let Some(job) = finished else {
                    return response;
                };

                let (total, completed, failed) = summary.as_ref().map_or((0, 0, 0), |s| {
                    (
                        s.total as u64,
                        s.count(IndexStatus::Completed) as u64,
                        s.errored_files.len() as u64,
                    )
                });
                self.event_bus
                    .emit(CoreEvent::Ingest(IngestEvent::Completed {
                        job_id: job_id.to_string(),
                        total,
                        completed,
                        failed,
                        duration_secs: job.duration_secs().unwrap_or(0),
                    }))
                    .ok();

                response
            }
            Err(SyncError::Cancelled) => {
                info!(job_id = %job_id, "Ingestion stopped after cancellation");
                self.finish_job(job_id, |job| job.cancel()).await;
                IngestionResponse::failure(&profile, &SyncError::Cancelled)
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "Ingestion failed");
                self.finish_job(job_id, |job| job.fail(err.to_string())).await;
                self.event_bus
                    .emit(CoreEvent::Ingest(IngestEvent::Failed {
                        job_id: job_id.to_string(),
                        message: err.to_string(),
                        recoverable: err.is_recoverable(),
                    }))
                    .ok();
                IngestionResponse::failure(&profile, &err)
            }
        }
    }

    /// Apply a terminal transition; jobs already terminal (e.g. cancelled
    /// by the caller) are left as they are
    async fn finish_job<F>(&self, job_id: IngestJobId, transition: F) -> Option<IngestJob>
    where
        F: FnOnce(IngestJob) -> Result<IngestJob>,
    {
        let mut table = self.jobs.write().await;
        let job = table.jobs.get(&job_id)?.clone();
        match transition(job) {
            Ok(finished) => {
                table.retire(finished.clone(), self.config.sync.job_history);
                Some(finished)
            }
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "Job already finished");
                None
            }
        }
    }

    async fn progress(&self, job_id: IngestJobId, processed: u64, total: Option<u64>, phase: &str) {
        if let Some(job) = self.jobs.write().await.jobs.get_mut(&job_id) {
            if let Err(err) = job.update_progress(processed, total, phase) {
                warn!(job_id = %job_id, error = %err, "Progress update ignored");
            }
        }

        self.event_bus
            .emit(CoreEvent::Ingest(IngestEvent::Progress {
                job_id: job_id.to_string(),
                phase: phase.to_string(),
                items_processed: processed,
                total_items: total,
            }))
            .ok();
    }

    async fn collect(&self, resolved: &ResolvedProfile, source: SourceConfig) -> Result<DocumentSet> {
        let collision_policy = self.config.collision_policy_for(&resolved.name);

        match source {
            SourceConfig::Flat {
                bucket,
                folder_prefixes,
            } => {
                let store = resolved.clients.object_store.clone().ok_or_else(|| {
                    SyncError::Configuration("Flat source without object store".to_string())
                })?;
                FlatLister::new(store)
                    .collect_documents(&bucket, &folder_prefixes, collision_policy)
                    .await
            }
            SourceConfig::Tree { root_id, drive_id } => {
                let source = resolved.clients.tree_source.clone().ok_or_else(|| {
                    SyncError::Configuration("Tree source without tree client".to_string())
                })?;
                TreeHarvester::new(source, self.config.sync.cycle_policy)
                    .collect_documents(&root_id, drive_id.as_deref(), collision_policy)
                    .await
            }
        }
    }

    async fn execute(
        &self,
        job_id: IngestJobId,
        resolved: &ResolvedProfile,
        policy: UploadPolicy,
        purge_before: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestionResponse> {
        let index_id = resolved.config.index_id.as_str();
        let synchronizer =
            IndexSynchronizer::new(resolved.clients.index.clone(), self.config.sync.clone());

        if purge_before {
            let purged = synchronizer.clear_index(index_id).await?;
            info!(purged, "Purged index before ingestion");
        }

        let Some(source) = resolved.config.source() else {
            warn!(profile = %resolved.name, "No source configured");
            return Ok(IngestionResponse::no_source(&resolved.name));
        };

        // Phase 1: collect
        self.progress(job_id, 0, None, "listing").await;
        let mut incoming = self.collect(resolved, source).await?;
        if let Some(preprocessor) = &resolved.clients.preprocessor {
            let collected = incoming.len();
            incoming = preprocessor(incoming);
            info!(collected, kept = incoming.len(), "Applied document preprocessor");
        }
        let incoming_count = incoming.len();
        info!(documents = incoming_count, "Collected source documents");
        ensure_active(cancel)?;

        // Phase 2: reconcile with the document store
        self.progress(job_id, 0, Some(incoming_count as u64), "uploading")
            .await;
        let uploader = DocumentUploader::new(resolved.clients.documents.clone());
        let existing = uploader.existing_documents().await?;
        let reconciliation = uploader.reconcile(&existing, incoming, policy).await?;
        ensure_active(cancel)?;

        // Phase 3: skip what the index already holds
        let handles: Vec<DocumentHandle> = reconciliation.handles.into_values().collect();
        let screening = synchronizer.screen_pending(index_id, handles, true).await?;
        if screening.pending.is_empty() {
            info!("No new documents to add to the index");
            return Ok(IngestionResponse::nothing_uploaded());
        }
        ensure_active(cancel)?;

        // Phase 4: synchronize
        let pending = screening.pending.len();
        self.progress(job_id, 0, Some(pending as u64), "synchronizing")
            .await;
        let result = synchronizer
            .synchronize(index_id, &screening.pending, cancel)
            .await?;

        let summary = summarize(&result.statuses)
            .with_already_exist(incoming_count.saturating_sub(pending));
        info!(
            total = summary.total,
            failed = summary.errored_files.len(),
            rounds = result.rounds,
            "Index synchronization finished"
        );

        Ok(IngestionResponse::synchronized(summary))
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}
