//! # Sync Event Bus
//!
//! Broadcasts sync lifecycle and progress events over `tokio::sync::broadcast`
//! so UI layers can observe a running session without polling the database.
//!
//! Subscribers that fall behind receive `RecvError::Lagged` and keep receiving
//! newer events; `RecvError::Closed` signals shutdown.

use core_store::{CourseSyncState, FileSyncState, WorkerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Event Types
// ============================================================================

/// Events emitted by the sync engine during a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A sync session started.
    SessionStarted {
        /// Session identifier.
        worker_id: WorkerId,
        /// Number of courses participating.
        course_count: usize,
    },
    /// A course began syncing within a session.
    CourseStarted {
        worker_id: WorkerId,
        course_id: i64,
        /// Number of files scheduled for this course.
        file_count: usize,
    },
    /// Byte-level progress for one file.
    FileProgress {
        worker_id: WorkerId,
        course_id: i64,
        file_id: i64,
        bytes_done: i64,
        bytes_total: i64,
    },
    /// A file reached a terminal state.
    FileFinished {
        worker_id: WorkerId,
        course_id: i64,
        file_id: i64,
        state: FileSyncState,
    },
    /// A course's aggregate state was recomputed.
    CourseProgress {
        worker_id: WorkerId,
        course_id: i64,
        state: CourseSyncState,
        /// Byte-weighted completion in the range 0.0 to 1.0.
        fraction_complete: f64,
    },
    /// The session reached its final state.
    SessionFinished {
        worker_id: WorkerId,
        state: CourseSyncState,
    },
    /// The session was cancelled by the user.
    SessionCancelled { worker_id: WorkerId },
}

impl SyncEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            SyncEvent::SessionStarted { .. } => "Sync session started",
            SyncEvent::CourseStarted { .. } => "Course sync started",
            SyncEvent::FileProgress { .. } => "File download progress",
            SyncEvent::FileFinished { .. } => "File download finished",
            SyncEvent::CourseProgress { .. } => "Course progress updated",
            SyncEvent::SessionFinished { .. } => "Sync session finished",
            SyncEvent::SessionCancelled { .. } => "Sync session cancelled",
        }
    }

    /// The session this event belongs to.
    pub fn worker_id(&self) -> WorkerId {
        match self {
            SyncEvent::SessionStarted { worker_id, .. }
            | SyncEvent::CourseStarted { worker_id, .. }
            | SyncEvent::FileProgress { worker_id, .. }
            | SyncEvent::FileFinished { worker_id, .. }
            | SyncEvent::CourseProgress { worker_id, .. }
            | SyncEvent::SessionFinished { worker_id, .. }
            | SyncEvent::SessionCancelled { worker_id } => *worker_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for sync events.
///
/// Fully thread-safe; share across tasks with `Arc`.
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: SyncEvent) -> Result<usize, SendError<SyncEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver. Past events are not
    /// replayed.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
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

// ============================================================================
// Tests
// ============================================================================
