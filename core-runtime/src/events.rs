//! # Event Bus System
//!
//! Broadcasts pipeline lifecycle events using `tokio::sync::broadcast` so
//! that hosts (request handlers, dashboards, alerting) can observe runs
//! without polling.
//!
//! ## Overview
//!
//! - **Event Types**: `CoreEvent` wraps per-domain enums
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ IngestionCoordinator ├─────────>│           ├────────────>│ Subscriber │
//! └──────────────────────┘          │ EventBus  │             └────────────┘
//! ┌──────────────────────┐   emit   │           │  subscribe  ┌────────────┐
//! │ DriveTransfer        ├─────────>│           ├────────────>│ Subscriber │
//! └──────────────────────┘          └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, IngestEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Ingest(IngestEvent::Cancelled {
//!     job_id: "job-1".to_string(),
//!     items_processed: 0,
//! }))
//! .ok();
//!
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Ingest(_))));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `emit` fails only when nobody is subscribed; publishers ignore that with
//! `.ok()`. Slow subscribers receive `RecvError::Lagged(n)` and can continue;
//! `RecvError::Closed` means every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Ingestion run lifecycle
    Ingest(IngestEvent),
    /// Drive to bucket copies
    Transfer(TransferEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Ingest(e) => e.description(),
            CoreEvent::Transfer(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Ingest(IngestEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Ingest(IngestEvent::Completed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Transfer(TransferEvent::Completed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Ingest(IngestEvent::Completed { .. })
            | CoreEvent::Transfer(TransferEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Ingest(IngestEvent::Cancelled { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events emitted by an ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum IngestEvent {
    Started {
        job_id: String,
        profile: String,
        index_id: String,
        /// Upload policy (`replace_existing` / `upload_missing_only`)
        policy: String,
    },
    /// A pipeline stage finished or a synchronization round advanced
    Progress {
        job_id: String,
        /// Stage name (e.g. "listing", "uploading", "synchronizing")
        phase: String,
        items_processed: u64,
        total_items: Option<u64>,
    },
    Completed {
        job_id: String,
        total: u64,
        completed: u64,
        failed: u64,
        duration_secs: u64,
    },
    Failed {
        job_id: String,
        message: String,
        /// Whether a later run may succeed (rate limits, network, 5xx)
        recoverable: bool,
    },
    Cancelled {
        job_id: String,
        items_processed: u64,
    },
}

impl IngestEvent {
    fn description(&self) -> &str {
        match self {
            IngestEvent::Started { .. } => "Ingestion started",
            IngestEvent::Progress { .. } => "Ingestion in progress",
            IngestEvent::Completed { .. } => "Ingestion completed",
            IngestEvent::Failed { .. } => "Ingestion failed",
            IngestEvent::Cancelled { .. } => "Ingestion cancelled",
        }
    }
}

/// Events emitted while copying a Drive tree into a bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TransferEvent {
    Started {
        source: String,
        bucket: String,
        prefix: String,
        dry_run: bool,
    },
    Completed {
        source: String,
        copied: u64,
        skipped: u64,
        failed: u64,
        dry_run: bool,
    },
}

impl TransferEvent {
    fn description(&self) -> &str {
        match self {
            TransferEvent::Started { .. } => "Transfer started",
            TransferEvent::Completed { .. } => "Transfer completed",
        }
    }
}

/// Central event bus built on a broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber; past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::default();
/// let transfers = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Transfer(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
