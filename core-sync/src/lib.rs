//! # Sync & Indexing Module
//!
//! Moves documents from cloud storage into a hosted search index.
//!
//! ## Overview
//!
//! This module manages the lifecycle of ingestion runs, including:
//! - Listing a flat bucket or walking a folder tree
//! - Filtering and renaming documents into flat, collision-checked names
//! - Reconciling them with the document store (upload, reuse, replace)
//! - Submitting batches to the index and retrying what fails to settle
//! - Summarizing per-document outcomes
//!
//! ## Components
//!
//! - **Pagination** (`pagination`): Turns token-paged listings into streams
//! - **Flat Lister** (`lister`): Bucket listing and document name rules
//! - **Tree Harvester** (`harvester`): Depth-first walk with shortcut and cycle handling
//! - **Uploader** (`uploader`): Document store reconciliation under an upload policy
//! - **Index Synchronizer** (`synchronizer`): Batching, settlement polling and retry rounds
//! - **Ingest Job State Machine** (`job`): Job lifecycle with validated transitions
//! - **Ingestion Coordinator** (`coordinator`): Per-profile pipeline and index locking
//! - **Drive Transfer** (`transfer`): Copies a tree into a bucket

pub mod coordinator;
pub mod error;
pub mod harvester;
pub mod job;
pub mod lister;
pub mod mime;
pub mod naming;
pub mod pagination;
pub mod report;
pub mod response;
pub mod synchronizer;
pub mod transfer;
pub mod uploader;

pub use coordinator::{DocumentPreprocessor, IngestionCoordinator, ProfileClients};
pub use error::{Result, SyncError};
pub use harvester::{RemoteEntry, TreeHarvester};
pub use job::{IngestJob, IngestJobId, JobProgress, JobStatus};
pub use lister::{canonical_document_name, FlatLister};
pub use naming::{destination_filename, DocumentSet};
pub use pagination::{collect_all, paginate};
pub use report::{summarize, SyncSummary};
pub use response::{
    ClearDocumentsResponse, ClearIndexResponse, IngestionDetails, IngestionResponse,
};
pub use synchronizer::{IndexSynchronizer, Screening, SyncResult, TransferStatus};
pub use transfer::{bucket_key, DriveTransfer, TransferReport};
pub use uploader::{DocumentUploader, Reconciliation, UploadPolicy};
