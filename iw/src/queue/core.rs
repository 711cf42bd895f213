//! Task queue implementation

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::request::Priority;

use super::config::TaskQueueConfig;
use super::item::{CancelOutcome, CancelToken, PendingKey, QueueState, QueueStats, Work, WorkId, WorkTicket};
use super::spawner::{SpawnError, TokioSpawner, WorkSpawner};

struct PendingWork {
    work: Work,
    token: CancelToken,
}

/// Work popped from the pending set, ready to hand to the spawner
struct ReadyWork {
    id: WorkId,
    work: Work,
    token: CancelToken,
}

/// Internal state protected by mutex
struct QueueInner {
    /// Waiting work, in execution order
    pending: BTreeMap<PendingKey, PendingWork>,

    /// Currently executing work
    running: HashMap<WorkId, CancelToken>,

    suspended: bool,
    next_id: u64,
    stats: QueueStats,
}

struct QueueShared {
    config: TaskQueueConfig,
    inner: Mutex<QueueInner>,
    spawner: Arc<dyn WorkSpawner>,
}

/// Ordered, cancellable work queue with a concurrency limit and suspend switch
///
/// All methods are synchronous and safe to call from any thread. Work itself
/// runs on the injected [`WorkSpawner`]. Cloning yields another handle to the
/// same queue.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<QueueShared>,
}

impl TaskQueue {
    /// Create a queue that runs work through `spawner`
    pub fn new(config: TaskQueueConfig, spawner: Arc<dyn WorkSpawner>) -> Self {
        debug!(?config, "TaskQueue::new: called");
        let suspended = config.suspended;
        Self {
            shared: Arc::new(QueueShared {
                config,
                inner: Mutex::new(QueueInner {
                    pending: BTreeMap::new(),
                    running: HashMap::new(),
                    suspended,
                    next_id: 0,
                    stats: QueueStats::default(),
                }),
                spawner,
            }),
        }
    }

    /// Create a queue on the current tokio runtime
    pub fn with_tokio(config: TaskQueueConfig) -> Result<Self, SpawnError> {
        Ok(Self::new(config, Arc::new(TokioSpawner::current()?)))
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept a unit of work; it runs once a slot is free and the queue is not suspended
    pub fn enqueue(&self, priority: Priority, work: Work) -> WorkTicket {
        let (ticket, ready) = {
            let mut inner = self.lock();
            let ticket = WorkTicket {
                id: WorkId(inner.next_id),
                priority,
            };
            inner.next_id += 1;
            inner.pending.insert(
                ticket.pending_key(),
                PendingWork {
                    work,
                    token: CancelToken::new(),
                },
            );
            inner.stats.total_enqueued += 1;
            inner.stats.peak_pending = inner.stats.peak_pending.max(inner.pending.len());
            debug!(id = %ticket.id, ?priority, pending = inner.pending.len(), "TaskQueue::enqueue: accepted");
            (ticket, self.take_ready(&mut inner))
        };
        self.launch(ready);
        ticket
    }

    /// Cancel a unit of work
    ///
    /// Pending work is dropped without ever running. Running work has its
    /// token fired on this thread, so cancellation callbacks complete before
    /// this returns.
    pub fn cancel(&self, ticket: &WorkTicket) -> CancelOutcome {
        debug!(id = %ticket.id, "TaskQueue::cancel: called");
        let (removed, token) = {
            let mut inner = self.lock();
            match inner.pending.remove(&ticket.pending_key()) {
                Some(pending) => {
                    inner.stats.total_cancelled += 1;
                    (Some(pending), None)
                }
                None => (None, inner.running.get(&ticket.id).cloned()),
            }
        };

        if removed.is_some() {
            debug!(id = %ticket.id, "TaskQueue::cancel: dequeued before start");
            return CancelOutcome::Dequeued;
        }

        match token {
            Some(token) if token.cancel() => {
                debug!(id = %ticket.id, "TaskQueue::cancel: signalled running work");
                self.lock().stats.total_cancelled += 1;
                CancelOutcome::Signalled
            }
            _ => {
                debug!(id = %ticket.id, "TaskQueue::cancel: nothing to cancel");
                CancelOutcome::NotFound
            }
        }
    }

    /// Suspend or resume execution; resuming starts pending work immediately
    pub fn set_suspended(&self, suspended: bool) {
        debug!(suspended, "TaskQueue::set_suspended: called");
        let ready = {
            let mut inner = self.lock();
            inner.suspended = suspended;
            self.take_ready(&mut inner)
        };
        self.launch(ready);
    }

    pub fn is_suspended(&self) -> bool {
        self.lock().suspended
    }

    pub fn running_count(&self) -> usize {
        self.lock().running.len()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Snapshot of queue state
    pub fn state(&self) -> QueueState {
        let inner = self.lock();
        QueueState {
            running: inner.running.len(),
            pending: inner.pending.len(),
            suspended: inner.suspended,
            stats: inner.stats.clone(),
        }
    }

    /// Move as much pending work to running as the limit allows
    fn take_ready(&self, inner: &mut QueueInner) -> Vec<ReadyWork> {
        let limit = self.shared.config.concurrency_limit();
        let mut ready = Vec::new();
        while !inner.suspended && inner.running.len() < limit {
            let Some((key, pending)) = inner.pending.pop_first() else {
                break;
            };
            inner.running.insert(key.id, pending.token.clone());
            inner.stats.total_started += 1;
            inner.stats.peak_running = inner.stats.peak_running.max(inner.running.len());
            ready.push(ReadyWork {
                id: key.id,
                work: pending.work,
                token: pending.token,
            });
        }
        ready
    }

    /// Hand ready work to the spawner; called without the lock held
    fn launch(&self, ready: Vec<ReadyWork>) {
        for ReadyWork { id, work, token } in ready {
            if token.is_cancelled() {
                debug!(%id, "TaskQueue::launch: cancelled before start, skipping");
                self.finish(id);
                continue;
            }
            debug!(%id, "TaskQueue::launch: starting work");
            let future = work(token);
            let queue = self.clone();
            self.shared.spawner.spawn(Box::pin(async move {
                future.await;
                queue.finish(id);
            }));
        }
    }

    fn finish(&self, id: WorkId) {
        let ready = {
            let mut inner = self.lock();
            if inner.running.remove(&id).is_some() {
                inner.stats.total_completed += 1;
            }
            debug!(%id, running = inner.running.len(), pending = inner.pending.len(), "TaskQueue::finish: slot freed");
            self.take_ready(&mut inner)
        };
        self.launch(ready);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::{mpsc, oneshot};

    use super::super::item::work;
    use super::*;

    fn record(tx: mpsc::UnboundedSender<&'static str>, name: &'static str) -> Work {
        work(move |_token| async move {
            let _ = tx.send(name);
        })
    }

    async fn drain(rx: &mut mpsc::UnboundedReceiver<&'static str>, n: usize) -> Vec<&'static str> {
        let mut out = Vec::new();
        for _ in 0..n {
            let item = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_runs_enqueued_work() {
        let queue = TaskQueue::with_tokio(TaskQueueConfig::default()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        queue.enqueue(Priority::Normal, record(tx, "a"));

        assert_eq!(drain(&mut rx, 1).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_suspended_queue_holds_work_until_resumed() {
        let queue = TaskQueue::with_tokio(TaskQueueConfig::default().suspended(true)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        queue.enqueue(Priority::Normal, record(tx.clone(), "a"));
        queue.enqueue(Priority::Normal, record(tx, "b"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(queue.pending_count(), 2);
        assert_eq!(queue.running_count(), 0);

        queue.set_suspended(false);
        let mut got = drain(&mut rx, 2).await;
        got.sort();
        assert_eq!(got, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_priority_then_fifo_order() {
        let queue = TaskQueue::with_tokio(TaskQueueConfig::with_max_concurrent(1).suspended(true)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        queue.enqueue(Priority::Low, record(tx.clone(), "low"));
        queue.enqueue(Priority::Normal, record(tx.clone(), "normal-1"));
        queue.enqueue(Priority::High, record(tx.clone(), "high"));
        queue.enqueue(Priority::Normal, record(tx, "normal-2"));

        queue.set_suspended(false);
        assert_eq!(drain(&mut rx, 4).await, vec!["high", "normal-1", "normal-2", "low"]);
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let queue = TaskQueue::with_tokio(TaskQueueConfig::with_max_concurrent(2)).unwrap();
        let mut gates = Vec::new();

        for _ in 0..4 {
            let (gate_tx, gate_rx) = oneshot::channel::<()>();
            gates.push(gate_tx);
            queue.enqueue(
                Priority::Normal,
                work(move |_token| async move {
                    let _ = gate_rx.await;
                }),
            );
        }

        assert_eq!(queue.running_count(), 2);
        assert_eq!(queue.pending_count(), 2);

        drop(gates.remove(0));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.running_count(), 2);
        assert_eq!(queue.pending_count(), 1);

        gates.clear();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let state = queue.state();
        assert_eq!(state.running, 0);
        assert_eq!(state.pending, 0);
        assert_eq!(state.stats.total_completed, 4);
        assert_eq!(state.stats.peak_running, 2);
    }

    #[tokio::test]
    async fn test_cancel_pending_never_runs() {
        let queue = TaskQueue::with_tokio(TaskQueueConfig::default().suspended(true)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let ticket = queue.enqueue(Priority::Normal, record(tx.clone(), "cancelled"));
        queue.enqueue(Priority::Normal, record(tx, "kept"));

        assert_eq!(queue.cancel(&ticket), CancelOutcome::Dequeued);
        assert_eq!(queue.cancel(&ticket), CancelOutcome::NotFound);

        queue.set_suspended(false);
        assert_eq!(drain(&mut rx, 1).await, vec!["kept"]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_running_fires_callbacks_synchronously() {
        let queue = TaskQueue::with_tokio(TaskQueueConfig::default()).unwrap();
        let (registered_tx, registered_rx) = oneshot::channel();
        let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel();

        let ticket = queue.enqueue(
            Priority::Normal,
            work(move |token: CancelToken| async move {
                token.on_cancel(move || {
                    let _ = cancel_tx.send("cancelled");
                });
                let _ = registered_tx.send(());
                token.cancelled().await;
            }),
        );

        registered_rx.await.unwrap();
        assert_eq!(queue.cancel(&ticket), CancelOutcome::Signalled);
        assert_eq!(cancel_rx.try_recv().unwrap(), "cancelled");
        assert_eq!(queue.cancel(&ticket), CancelOutcome::NotFound);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.running_count(), 0);
        assert_eq!(queue.state().stats.total_cancelled, 1);
    }

    #[tokio::test]
    async fn test_cancel_finished_work_is_noop() {
        let queue = TaskQueue::with_tokio(TaskQueueConfig::default()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let ticket = queue.enqueue(Priority::Normal, record(tx, "done"));
        drain(&mut rx, 1).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(queue.cancel(&ticket), CancelOutcome::NotFound);
    }
}
