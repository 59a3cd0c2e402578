//! # Ingestion Job State Machine
//!
//! Tracks one ingestion run from trigger to outcome so callers can poll
//! instead of holding a request open for the whole run.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//!     └──────→ Cancelled
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_sync::job::{IngestJob, JobStatus};
//! use core_sync::uploader::UploadPolicy;
//!
//! let job = IngestJob::new("hr", "vs_hr", UploadPolicy::UploadMissingOnly);
//! let mut job = job.start().unwrap();
//! job.update_progress(10, Some(40), "uploading").unwrap();
//! assert_eq!(job.progress.percent, 25);
//!
//! let job = job.cancel().unwrap();
//! assert_eq!(job.status, JobStatus::Cancelled);
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::report::SyncSummary;
use crate::uploader::UploadPolicy;
use crate::{Result, SyncError};

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for an ingestion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngestJobId(Uuid);

impl IngestJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidJobId(e.to_string()))?,
        ))
    }
}

impl Default for IngestJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IngestJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IngestJobId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for JobStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Progress of a running job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Current stage ("listing", "uploading", "synchronizing", ...)
    pub phase: String,
    pub items_processed: u64,
    /// Unknown while the source is still being listed
    pub total_items: Option<u64>,
    /// 0-100, stays 0 while the total is unknown
    pub percent: u8,
}

impl JobProgress {
    pub fn new() -> Self {
        Self {
            phase: "Initializing".to_string(),
            items_processed: 0,
            total_items: None,
            percent: 0,
        }
    }

    pub fn update(&mut self, items_processed: u64, total_items: Option<u64>, phase: &str) {
        self.items_processed = items_processed;
        self.total_items = total_items;
        self.phase = phase.to_string();

        // Cap at 100
        self.percent = match total_items {
            Some(total) if total > 0 => {
                ((items_processed as f64 / total as f64) * 100.0).min(100.0) as u8
            }
            _ => 0,
        };
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Ingest Job Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: IngestJobId,
    pub profile: String,
    pub index_id: String,
    pub policy: UploadPolicy,
    pub status: JobStatus,
    pub progress: JobProgress,
    /// Present once the job completed with a synchronization
    pub summary: Option<SyncSummary>,
    /// Human-readable outcome ("No files uploaded", ...)
    pub message: Option<String>,
    pub error_message: Option<String>,
    /// Unix timestamps (seconds)
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl IngestJob {
    pub fn new(profile: impl Into<String>, index_id: impl Into<String>, policy: UploadPolicy) -> Self {
        Self {
            id: IngestJobId::new(),
            profile: profile.into(),
            index_id: index_id.into(),
            policy,
            status: JobStatus::Pending,
            progress: JobProgress::new(),
            summary: None,
            message: None,
            error_message: None,
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the job is not `Pending`
    pub fn start(mut self) -> Result<Self> {
        self.validate_transition(JobStatus::Running)?;
        self.status = JobStatus::Running;
        self.started_at = Some(current_timestamp());
        self.progress.phase = "Starting".to_string();
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns an error if the job is not `Running`
    pub fn update_progress(
        &mut self,
        items_processed: u64,
        total_items: Option<u64>,
        phase: &str,
    ) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "update_progress".to_string(),
                reason: "Job must be running to update progress".to_string(),
            });
        }

        self.progress.update(items_processed, total_items, phase);
        Ok(())
    }

    pub fn complete(mut self, message: String, summary: Option<SyncSummary>) -> Result<Self> {
        self.validate_transition(JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.completed_at = Some(current_timestamp());
        self.message = Some(message);
        self.summary = summary;
        self.progress.percent = 100;
        self.progress.phase = "Completed".to_string();
        Ok(self)
    }

    pub fn fail(mut self, error_message: String) -> Result<Self> {
        self.validate_transition(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.completed_at = Some(current_timestamp());
        self.error_message = Some(error_message);
        self.progress.phase = "Failed".to_string();
        Ok(self)
    }

    pub fn cancel(mut self) -> Result<Self> {
        self.validate_transition(JobStatus::Cancelled)?;
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(current_timestamp());
        self.progress.phase = "Cancelled".to_string();
        Ok(self)
    }

    /// `None` until the job has started and finished
    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start).max(0) as u64),
            _ => None,
        }
    }

    fn validate_transition(&self, to: JobStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}
