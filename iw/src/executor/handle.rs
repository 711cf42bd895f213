//! Executor task handles

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::events::TaskId;
use crate::queue::WorkTicket;
use crate::request::RequestKey;

/// Lifecycle of an executor task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

struct HandleInner {
    id: TaskId,
    key: RequestKey,
    state: watch::Sender<TaskState>,
    ticket: OnceLock<WorkTicket>,
}

/// Opaque reference to an in-flight executor task
///
/// Cheap to clone. The first transition into a terminal state wins, so a
/// cancelled task can never later report completion.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<HandleInner>,
}

impl TaskHandle {
    pub fn new(id: TaskId, key: RequestKey) -> Self {
        let (state, _) = watch::channel(TaskState::Pending);
        Self {
            inner: Arc::new(HandleInner {
                id,
                key,
                state,
                ticket: OnceLock::new(),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn key(&self) -> &RequestKey {
        &self.inner.key
    }

    pub fn state(&self) -> TaskState {
        *self.inner.state.borrow()
    }

    /// Move to `next` unless already terminal; returns whether the state changed
    pub fn transition(&self, next: TaskState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    /// Wait until the task reaches a terminal state
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Record the queue ticket backing this task; only the first call sticks
    pub fn attach_ticket(&self, ticket: WorkTicket) {
        let _ = self.inner.ticket.set(ticket);
    }

    pub fn ticket(&self) -> Option<&WorkTicket> {
        self.inner.ticket.get()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key.to_string())
            .field("state", &self.state())
            .finish()
    }
}
