//! Queue item types: tickets, cancellation tokens, statistics

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::request::Priority;

/// A unit of work: receives its cancellation token, returns the future to run
pub type Work = Box<dyn FnOnce(CancelToken) -> BoxFuture<'static, ()> + Send>;

/// Wrap an async closure as a unit of [`Work`]
pub fn work<F, Fut>(f: F) -> Work
where
    F: FnOnce(CancelToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |token: CancelToken| f(token).boxed())
}

/// Identifier of a unit of work within one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkId(pub u64);

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work-{}", self.0)
    }
}

/// Lease on a unit of work, used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkTicket {
    pub(crate) id: WorkId,
    pub(crate) priority: Priority,
}

impl WorkTicket {
    pub fn id(&self) -> WorkId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn pending_key(&self) -> PendingKey {
        PendingKey {
            priority: self.priority,
            id: self.id,
        }
    }
}

/// Order of pending work: higher priority first, then submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingKey {
    pub priority: Priority,
    pub id: WorkId,
}

impl Ord for PendingKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.priority.cmp(&self.priority).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for PendingKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Result of cancelling a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Was still pending; removed and will never run
    Dequeued,
    /// Was running; its token fired
    Signalled,
    /// Already finished or already cancelled
    NotFound,
}

type Callback = Box<dyn FnOnce() + Send>;

struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    callbacks: Mutex<Vec<Callback>>,
}

/// One-shot cancellation signal shared between a queue and its running work
///
/// Callbacks registered with [`CancelToken::on_cancel`] run synchronously on
/// the cancelling thread; async work can await [`CancelToken::cancelled`].
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Fire the token; returns false if it had already fired
    pub fn cancel(&self) -> bool {
        let callbacks = {
            let mut callbacks = self.inner.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *callbacks)
        };
        self.inner.notify.notify_waiters();
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Run `callback` when the token fires, or right away if it already has
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.inner.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            drop(callbacks);
            callback();
        } else {
            callbacks.push(Box::new(callback));
        }
    }

    /// Resolves once the token fires
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Counters for a queue
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_started: u64,
    pub total_completed: u64,
    pub total_cancelled: u64,
    pub peak_pending: usize,
    pub peak_running: usize,
}

/// Point-in-time view of a queue
#[derive(Debug, Clone)]
pub struct QueueState {
    pub running: usize,
    pub pending: usize,
    pub suspended: bool,
    pub stats: QueueStats,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_pending_key_priority_then_fifo() {
        let high = PendingKey {
            priority: Priority::High,
            id: WorkId(5),
        };
        let normal_early = PendingKey {
            priority: Priority::Normal,
            id: WorkId(1),
        };
        let normal_late = PendingKey {
            priority: Priority::Normal,
            id: WorkId(2),
        };

        assert!(high < normal_early);
        assert!(normal_early < normal_late);
    }

    #[test]
    fn test_cancel_fires_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(token.is_cancelled());
        assert!(!token.cancel());
    }

    #[test]
    fn test_callbacks_run_once_synchronously() {
        let token = CancelToken::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        token.on_cancel(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        token.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        token.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_cancel_after_fire_runs_immediately() {
        let token = CancelToken::new();
        token.cancel();

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        token.on_cancel(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_future_wakes() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_if_already_fired() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already-fired token resolves immediately");
    }
}
