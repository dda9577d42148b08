//! Batch event types, envelope schema, and event bus for observers.
//!
//! The orchestrator publishes every observable step of a batch here. Status
//! bars, notification layers and history views subscribe without the
//! orchestrator knowing about them. Internal control flow never goes
//! through the bus.
//!
//! Two delivery paths exist:
//!
//! - [`EventBus::on`] registers a synchronous handler invoked on the emitting
//!   task, in emission order. Handlers never miss an event.
//! - [`EventBus::subscribe`] returns a bounded broadcast receiver. Receivers
//!   that fall more than the bus capacity behind observe `Lagged` and skip
//!   the oldest events.
//!
//! Broadcast receivers always see envelopes in `sequence` order, even when
//! several threads emit at once. Handlers run after the broadcast send, so
//! across concurrently emitting tasks their call order follows each task's
//! own emission order only.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{FileProcessingResult, ProcessingError, ProcessingStats, ProcessingStatus};

// ============================================================================
// Batch Event (domain payloads)
// ============================================================================

/// Observable events of a batch run.
///
/// Serialized as JSON with a `type` tag field, e.g.
/// `{"type":"chunk_start","index":0,"files":["a.md"],"size":1}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A batch started.
    Start { total_files: usize },
    /// A chunk is about to be processed.
    ChunkStart {
        index: usize,
        files: Vec<String>,
        size: usize,
    },
    /// Every file of a chunk has settled.
    ChunkComplete {
        index: usize,
        files: Vec<String>,
        size: usize,
    },
    /// A file entered processing.
    FileStart { file: String },
    /// A file produced its result.
    FileComplete { result: FileProcessingResult },
    /// Progress snapshot after a file completed.
    Progress { status: ProcessingStatus },
    /// The batch was paused.
    Pause,
    /// The batch was resumed.
    Resume,
    /// A file failed after exhausting its retries.
    Error(ProcessingError),
    /// The batch completed. Terminal.
    Complete { stats: ProcessingStats },
}

impl BatchEvent {
    /// The kind used for handler filtering.
    pub fn kind(&self) -> EventKind {
        match self {
            BatchEvent::Start { .. } => EventKind::Start,
            BatchEvent::ChunkStart { .. } => EventKind::ChunkStart,
            BatchEvent::ChunkComplete { .. } => EventKind::ChunkComplete,
            BatchEvent::FileStart { .. } => EventKind::FileStart,
            BatchEvent::FileComplete { .. } => EventKind::FileComplete,
            BatchEvent::Progress { .. } => EventKind::Progress,
            BatchEvent::Pause => EventKind::Pause,
            BatchEvent::Resume => EventKind::Resume,
            BatchEvent::Error(_) => EventKind::Error,
            BatchEvent::Complete { .. } => EventKind::Complete,
        }
    }

    /// Returns the namespaced event type for the envelope (e.g., `"batch.progress"`).
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            BatchEvent::Start { .. } => "batch.start",
            BatchEvent::ChunkStart { .. } => "batch.chunk_start",
            BatchEvent::ChunkComplete { .. } => "batch.chunk_complete",
            BatchEvent::FileStart { .. } => "batch.file_start",
            BatchEvent::FileComplete { .. } => "batch.file_complete",
            BatchEvent::Progress { .. } => "batch.progress",
            BatchEvent::Pause => "batch.pause",
            BatchEvent::Resume => "batch.resume",
            BatchEvent::Error(_) => "batch.error",
            BatchEvent::Complete { .. } => "batch.complete",
        }
    }
}

/// Event names for [`EventBus::on`] filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    ChunkStart,
    ChunkComplete,
    FileStart,
    FileComplete,
    Progress,
    Pause,
    Resume,
    Error,
    Complete,
    /// Matches every event.
    Any,
}

impl EventKind {
    fn matches(self, event: &BatchEvent) -> bool {
        self == EventKind::Any || self == event.kind()
    }
}

// ============================================================================
// Event Envelope
// ============================================================================

/// Envelope around every emitted [`BatchEvent`].
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type (e.g., `"batch.chunk_start"`).
    pub event_type: &'static str,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Batch this event belongs to. None for events outside a run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    /// Per-bus emission counter, strictly increasing.
    pub sequence: u64,
    /// Domain-specific event data.
    pub payload: BatchEvent,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Handler = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

struct HandlerEntry {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

struct BusInner {
    tx: broadcast::Sender<EventEnvelope>,
    handlers: RwLock<Vec<HandlerEntry>>,
    next_id: AtomicU64,
    /// Next sequence number. Held while sending so numbering and broadcast
    /// order agree.
    sequence: Mutex<u64>,
}

/// Typed publish/subscribe channel for batch events.
///
/// Cloning is cheap; clones share subscribers.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a new event bus with the given broadcast capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                tx,
                handlers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                sequence: Mutex::new(0),
            }),
        }
    }

    /// Emit an event that is not tied to a batch.
    pub fn emit(&self, event: BatchEvent) {
        self.publish(None, event);
    }

    /// Emit an event for a batch.
    pub fn emit_for_batch(&self, batch_id: Uuid, event: BatchEvent) {
        self.publish(Some(batch_id), event);
    }

    fn publish(&self, batch_id: Option<Uuid>, event: BatchEvent) {
        let envelope = {
            let mut sequence = self
                .inner
                .sequence
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let envelope = EventEnvelope {
                event_id: Uuid::now_v7(),
                event_type: event.namespaced_event_type(),
                occurred_at: Utc::now(),
                batch_id,
                sequence: *sequence,
                payload: event,
            };
            *sequence += 1;
            let _ = self.inner.tx.send(envelope.clone());
            envelope
        };

        // Handlers run outside the lock so they may call `on`/`off`.
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.kind.matches(&envelope.payload))
            .map(|entry| entry.handler.clone())
            .collect();

        tracing::trace!(
            event_type = envelope.event_type,
            sequence = envelope.sequence,
            handler_count = handlers.len(),
            subscriber_count = self.inner.tx.receiver_count(),
            "EventBus emit"
        );

        for handler in handlers {
            handler(&envelope);
        }
    }

    /// Register a handler for one event kind (or [`EventKind::Any`]).
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HandlerEntry {
                id,
                kind,
                handler: Arc::new(handler),
            });
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|entry| entry.id != id);
        handlers.len() != before
    }

    /// Subscribe to receive enveloped events. Each subscriber gets its own independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.inner.tx.subscribe()
    }

    /// Returns the number of broadcast subscribers plus registered handlers.
    pub fn subscriber_count(&self) -> usize {
        let handlers = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        self.inner.tx.receiver_count() + handlers
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
