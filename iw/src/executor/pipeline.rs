//! Executor that runs loads on a task queue and reports on the event bus

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{debug, info};

use super::handle::{TaskHandle, TaskState};
use super::traits::{ImageLoader, TaskExecutor};
use crate::events::EventBus;
use crate::queue::{CancelToken, TaskQueue, work};
use crate::request::ImageRequest;

/// [`TaskExecutor`] backed by an [`ImageLoader`] and a [`TaskQueue`]
///
/// Every `start` creates a new task and emits `TaskStarted` right away; the
/// load itself waits for a slot on the queue. Suspending the queue keeps
/// tasks in flight indefinitely, which is how tests freeze the pipeline.
pub struct PipelineExecutor<L> {
    loader: Arc<L>,
    queue: TaskQueue,
    events: Arc<EventBus>,
    next_id: AtomicU64,
}

impl<L: ImageLoader> PipelineExecutor<L> {
    pub fn new(loader: L, queue: TaskQueue, events: Arc<EventBus>) -> Self {
        debug!("PipelineExecutor::new: called");
        Self {
            loader: Arc::new(loader),
            queue,
            events,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Number of tasks ever created by `start`
    pub fn created_task_count(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }
}

impl<L: ImageLoader> TaskExecutor for PipelineExecutor<L> {
    fn start(&self, request: &ImageRequest) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let key = request.key();
        debug!(task_id = id, %key, "PipelineExecutor::start: called");

        let handle = TaskHandle::new(id, key.clone());
        let emitter = self.events.emitter_for(id, &key);
        emitter.started();

        let loader = Arc::clone(&self.loader);
        let request = request.clone();
        let task = handle.clone();
        let ticket = self.queue.enqueue(
            request.priority(),
            work(move |token: CancelToken| async move {
                if !task.transition(TaskState::Running) {
                    debug!(task_id = task.id(), "PipelineExecutor: task cancelled before running");
                    return;
                }

                let started = Instant::now();
                let result = tokio::select! {
                    result = loader.load(&request) => Some(result),
                    _ = token.cancelled() => None,
                };

                match result {
                    Some(Ok(image)) => {
                        if task.transition(TaskState::Completed) {
                            let duration_ms = started.elapsed().as_millis() as u64;
                            info!(task_id = task.id(), bytes = image.byte_len(), duration_ms, "Image loaded");
                            emitter.completed(image.byte_len(), duration_ms);
                        }
                    }
                    Some(Err(e)) => {
                        if task.transition(TaskState::Failed) {
                            info!(task_id = task.id(), error = %e, "Image load failed");
                            emitter.failed(&e.to_string());
                        }
                    }
                    None => {
                        debug!(task_id = task.id(), "PipelineExecutor: load interrupted by cancellation");
                    }
                }
            }),
        );
        handle.attach_ticket(ticket);
        handle
    }

    fn cancel(&self, handle: &TaskHandle) {
        debug!(task_id = handle.id(), "PipelineExecutor::cancel: called");
        if !handle.transition(TaskState::Cancelled) {
            debug!(task_id = handle.id(), state = %handle.state(), "PipelineExecutor::cancel: already finished");
            return;
        }
        if let Some(ticket) = handle.ticket() {
            self.queue.cancel(ticket);
        }
        self.events.emitter_for(handle.id(), handle.key()).cancelled();
    }
}
