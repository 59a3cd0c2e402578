//! # Collaborator Bridge Traits
//!
//! Contracts between the ingestion core and the external systems it
//! reconciles.
//!
//! ## Overview
//!
//! The ingestion pipeline never talks to a remote API directly. Each external
//! system sits behind one of these traits so that connectors are injected per
//! profile and tests can swap in fakes:
//!
//! ### Sources
//! - [`TreeSource`](tree::TreeSource) - Hierarchical source (folders, shortcuts)
//! - [`ObjectStore`](object_store::ObjectStore) - Flat bucket/key storage
//!
//! ### Destinations
//! - [`DocumentStore`](documents::DocumentStore) - Uploaded document ownership
//! - [`IndexBackend`](index::IndexBackend) - Asynchronous search index membership
//!
//! ### Plumbing
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry policy
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to the host
//!
//! ## Error Handling
//!
//! All bridge traits return [`BridgeError`](error::BridgeError). Connectors
//! convert their service-specific errors into it; the pipeline propagates it
//! upward unmodified and uses [`BridgeError::is_transient`] where it needs to
//! tell retryable failures apart.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; one connector instance is shared
//! by every run of its profile.

pub mod documents;
pub mod error;
pub mod http;
pub mod index;
pub mod log;
pub mod object_store;
pub mod tree;

pub use error::BridgeError;

// Re-export commonly used types
pub use documents::{DocumentHandle, DocumentStore};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartForm, RetryPolicy};
pub use index::{BatchRef, IndexBackend, IndexEntry, IndexStatus, MAX_BATCH_SIZE};
pub use log::{LogEntry, LogLevel, LoggerSink};
pub use object_store::ObjectStore;
pub use tree::{NodeKind, RemoteNode, SharedDrive, ShortcutTarget, TreeSource};
