//! Preheater implementation

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info};

use super::config::{PreheaterConfig, StopPolicy};
use super::registry::{Registry, Release};
use crate::events::EventBus;
use crate::executor::{TaskExecutor, TaskState};
use crate::queue::{CancelToken, SpawnError, TaskQueue, TokioSpawner, WorkSpawner, WorkTicket, work};
use crate::request::{ImageRequest, RequestKey};

struct PreheaterShared<E> {
    config: PreheaterConfig,
    executor: Arc<E>,
    queue: TaskQueue,
    events: Arc<EventBus>,
    registry: Mutex<Registry>,
}

impl<E> PreheaterShared<E> {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop an entry whose load finished, unless it was replaced meanwhile
    fn forget(&self, key: &RequestKey, seq: u64) {
        let mut registry = self.lock();
        if registry.remove_generation(key, seq).is_some() {
            debug!(%key, "Preheater: forgot completed entry");
            self.events.preheat_stopped(key);
        }
    }
}

/// Speculatively loads images before they are needed
///
/// Requests are deduplicated by [`RequestKey`] and reference counted: each
/// start adds a reference, each stop removes one, and the underlying load is
/// cancelled when the last reference goes. All methods return as soon as the
/// registry is updated; none waits for a load.
///
/// Dropping the preheater stops everything it started.
pub struct Preheater<E: TaskExecutor + 'static> {
    shared: Arc<PreheaterShared<E>>,
}

impl<E: TaskExecutor + 'static> Preheater<E> {
    /// Create a preheater whose queue runs on `spawner`
    pub fn new(
        executor: Arc<E>,
        events: Arc<EventBus>,
        config: PreheaterConfig,
        spawner: Arc<dyn WorkSpawner>,
    ) -> Self {
        debug!(?config, "Preheater::new: called");
        let queue = TaskQueue::new(config.queue_config(), spawner);
        Self {
            shared: Arc::new(PreheaterShared {
                config,
                executor,
                queue,
                events,
                registry: Mutex::new(Registry::new()),
            }),
        }
    }

    /// Create a preheater on the current tokio runtime
    pub fn with_tokio(executor: Arc<E>, events: Arc<EventBus>, config: PreheaterConfig) -> Result<Self, SpawnError> {
        Ok(Self::new(executor, events, config, Arc::new(TokioSpawner::current()?)))
    }

    pub fn config(&self) -> &PreheaterConfig {
        &self.shared.config
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.shared.executor
    }

    /// Queue that rate-limits preheat loads
    pub fn queue(&self) -> &TaskQueue {
        &self.shared.queue
    }

    /// Start preheating; every occurrence adds one reference to its key
    pub fn start_preheating<'a, I>(&self, requests: I)
    where
        I: IntoIterator<Item = &'a ImageRequest>,
    {
        let mut registry = self.shared.lock();
        let mut created = 0usize;
        let mut retained = 0usize;
        for request in requests {
            let key = request.key();
            if let Some(count) = registry.retain(&key) {
                debug!(%key, count, "Preheater::start_preheating: already preheating");
                retained += 1;
                continue;
            }

            let ticket = self.enqueue_load(request, key.clone(), registry.next_seq());
            registry.insert(key.clone(), ticket);
            self.shared.events.preheat_started(&key);
            created += 1;
        }
        debug!(created, retained, active = registry.len(), "Preheater::start_preheating: done");
    }

    /// Stop preheating; the load is cancelled once its key has no references
    pub fn stop_preheating<'a, I>(&self, requests: I)
    where
        I: IntoIterator<Item = &'a ImageRequest>,
    {
        let keys: Vec<RequestKey> = match self.shared.config.stop_policy {
            StopPolicy::PerRequest => requests.into_iter().map(|r| r.key()).collect(),
            StopPolicy::PerBatch => {
                let mut seen = HashSet::new();
                requests
                    .into_iter()
                    .map(|r| r.key())
                    .filter(|key| seen.insert(key.clone()))
                    .collect()
            }
        };

        let mut registry = self.shared.lock();
        let mut removed = 0usize;
        for key in keys {
            match registry.release(&key) {
                Release::Absent => {
                    debug!(%key, "Preheater::stop_preheating: not preheating, ignoring");
                }
                Release::Retained(count) => {
                    debug!(%key, count, "Preheater::stop_preheating: still referenced");
                }
                Release::Exhausted => {
                    if let Some(task) = registry.get(&key) {
                        self.shared.queue.cancel(&task.ticket);
                    }
                    registry.remove(&key);
                    self.shared.events.preheat_stopped(&key);
                    removed += 1;
                }
            }
        }
        debug!(removed, active = registry.len(), "Preheater::stop_preheating: done");
    }

    /// Stop every preheat regardless of reference counts
    pub fn stop_all(&self) {
        debug!("Preheater::stop_all: called");
        let mut registry = self.shared.lock();
        let tasks = registry.drain();
        for task in &tasks {
            self.shared.queue.cancel(&task.ticket);
            self.shared.events.preheat_stopped(&task.key);
        }
        if !tasks.is_empty() {
            info!(count = tasks.len(), "Preheater: stopped all preheating");
        }
    }

    /// Number of distinct keys being preheated
    pub fn active_count(&self) -> usize {
        self.shared.lock().len()
    }

    /// References held on the request's key, zero if not preheating
    pub fn reference_count(&self, request: &ImageRequest) -> usize {
        self.shared
            .lock()
            .get(&request.key())
            .map(|task| task.refcount)
            .unwrap_or(0)
    }

    pub fn is_preheating(&self, request: &ImageRequest) -> bool {
        self.reference_count(request) > 0
    }

    /// Keys being preheated, oldest first
    pub fn active_keys(&self) -> Vec<RequestKey> {
        self.shared.lock().keys()
    }

    /// Queue the unit of work that drives one executor task
    ///
    /// The work holds its queue slot until the executor task finishes, so the
    /// queue limit bounds concurrent speculative loads. Cancelling the ticket
    /// either drops the work unstarted or cancels the executor task.
    ///
    /// With `forget_completed`, the work takes the registry lock itself once
    /// the load completes. It holds no queue or executor lock at that point,
    /// and it is the only place work touches the registry.
    fn enqueue_load(&self, request: &ImageRequest, key: RequestKey, seq: u64) -> WorkTicket {
        let executor = Arc::clone(&self.shared.executor);
        let request = request.clone().with_priority(self.shared.config.priority);
        let shared: Option<Weak<PreheaterShared<E>>> = self
            .shared
            .config
            .forget_completed
            .then(|| Arc::downgrade(&self.shared));

        self.shared.queue.enqueue(
            self.shared.config.priority,
            work(move |token: CancelToken| async move {
                if token.is_cancelled() {
                    return;
                }

                let handle = executor.start(&request);
                let canceller = Arc::clone(&executor);
                let cancelled = handle.clone();
                token.on_cancel(move || canceller.cancel(&cancelled));

                tokio::select! {
                    state = handle.wait() => {
                        debug!(%key, %state, "Preheater: load finished");
                        if state == TaskState::Completed {
                            if let Some(shared) = shared.and_then(|weak| weak.upgrade()) {
                                shared.forget(&key, seq);
                            }
                        }
                    }
                    _ = token.cancelled() => {
                        debug!(%key, "Preheater: load cancelled");
                    }
                }
            }),
        )
    }
}

impl<E: TaskExecutor + 'static> Drop for Preheater<E> {
    fn drop(&mut self) {
        self.stop_all();
    }
}
