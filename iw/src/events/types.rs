//! Event types for image pipeline activity
//!
//! Two layers of notifications share one stream:
//! - Preheat lifecycle: a registry entry was created or removed
//! - Task lifecycle: an executor task started, finished, failed or was cancelled

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an executor task
pub type TaskId = u64;

/// Observable pipeline activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImageEvent {
    // === Preheat Lifecycle ===
    /// A new preheat entry was registered
    PreheatStarted { key: String },
    /// A preheat entry was removed (refcount hit zero or stop-all)
    PreheatStopped { key: String },

    // === Task Lifecycle ===
    /// The executor created a task and triggered its load
    TaskStarted { task_id: TaskId, key: String },
    /// The load finished and produced an image
    TaskCompleted {
        task_id: TaskId,
        key: String,
        bytes: usize,
        duration_ms: u64,
    },
    /// The load failed
    TaskFailed {
        task_id: TaskId,
        key: String,
        message: String,
    },
    /// The task was cancelled; no further events follow for it
    TaskCancelled { task_id: TaskId, key: String },
}

impl ImageEvent {
    /// Request key this event refers to
    pub fn key(&self) -> &str {
        match self {
            ImageEvent::PreheatStarted { key }
            | ImageEvent::PreheatStopped { key }
            | ImageEvent::TaskStarted { key, .. }
            | ImageEvent::TaskCompleted { key, .. }
            | ImageEvent::TaskFailed { key, .. }
            | ImageEvent::TaskCancelled { key, .. } => key,
        }
    }

    /// Executor task id, for task lifecycle events
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            ImageEvent::TaskStarted { task_id, .. }
            | ImageEvent::TaskCompleted { task_id, .. }
            | ImageEvent::TaskFailed { task_id, .. }
            | ImageEvent::TaskCancelled { task_id, .. } => Some(*task_id),
            ImageEvent::PreheatStarted { .. } | ImageEvent::PreheatStopped { .. } => None,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            ImageEvent::PreheatStarted { .. } => "PreheatStarted",
            ImageEvent::PreheatStopped { .. } => "PreheatStopped",
            ImageEvent::TaskStarted { .. } => "TaskStarted",
            ImageEvent::TaskCompleted { .. } => "TaskCompleted",
            ImageEvent::TaskFailed { .. } => "TaskFailed",
            ImageEvent::TaskCancelled { .. } => "TaskCancelled",
        }
    }

    /// True for events after which the task emits nothing more
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImageEvent::TaskCompleted { .. } | ImageEvent::TaskFailed { .. } | ImageEvent::TaskCancelled { .. }
        )
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// Run that produced the event
    pub run_id: Uuid,
    /// The event
    pub event: ImageEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(run_id: Uuid, event: ImageEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id,
            event,
        }
    }
}
