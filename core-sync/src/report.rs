//! Status summaries

use bridge_traits::index::IndexStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

use crate::synchronizer::TransferStatus;

/// Aggregate view of a synchronization result.
///
/// Serializes flat, e.g.
/// `{"total": 110, "errored_files": ["a.pdf"], "completed": 108, "failed": 2}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub total: usize,
    /// Names of documents that ended `failed`
    pub errored_files: Vec<String>,
    /// Count per final status
    #[serde(flatten)]
    pub counts: BTreeMap<String, usize>,
    /// Incoming documents that did not need submitting
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub already_exist: Option<usize>,
}

impl SyncSummary {
    pub fn count(&self, status: IndexStatus) -> usize {
        self.counts.get(status.as_str()).copied().unwrap_or(0)
    }

    pub fn with_already_exist(mut self, already_exist: usize) -> Self {
        self.already_exist = Some(already_exist);
        self
    }
}

pub fn summarize(statuses: &[TransferStatus]) -> SyncSummary {
    let mut summary = SyncSummary {
        total: statuses.len(),
        ..SyncSummary::default()
    };

    for status in statuses {
        *summary
            .counts
            .entry(status.transfer_status.as_str().to_string())
            .or_insert(0) += 1;

        if status.transfer_status == IndexStatus::Failed {
            error!(file_name = %status.file_name, "Document failed to reach the index");
            summary.errored_files.push(status.file_name.clone());
        }
    }

    summary
}
