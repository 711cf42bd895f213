//! Event Bus - pub/sub for pipeline notifications
//!
//! Uses a tokio broadcast channel. Producers (executor, preheater) emit,
//! consumers (tests, CLI output, the JSONL logger) subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{ImageEvent, TaskId};
use crate::request::RequestKey;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Central event bus for image pipeline activity
pub struct EventBus {
    tx: broadcast::Sender<ImageEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped, and a slow
    /// subscriber loses the oldest events.
    pub fn emit(&self, event: ImageEvent) {
        debug!(event_type = event.event_type(), key = event.key(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ImageEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Emitter bound to one executor task
    pub fn emitter_for(&self, task_id: TaskId, key: &RequestKey) -> TaskEmitter {
        TaskEmitter {
            tx: self.tx.clone(),
            task_id,
            key: key.to_string(),
        }
    }

    /// Emit a preheat started event
    pub fn preheat_started(&self, key: &RequestKey) {
        self.emit(ImageEvent::PreheatStarted { key: key.to_string() });
    }

    /// Emit a preheat stopped event
    pub fn preheat_stopped(&self, key: &RequestKey) {
        self.emit(ImageEvent::PreheatStopped { key: key.to_string() });
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for an executor task to emit its own lifecycle events
#[derive(Clone)]
pub struct TaskEmitter {
    tx: broadcast::Sender<ImageEvent>,
    task_id: TaskId,
    key: String,
}

impl TaskEmitter {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    fn emit(&self, event: ImageEvent) {
        debug!(task_id = self.task_id, event_type = event.event_type(), "TaskEmitter::emit");
        let _ = self.tx.send(event);
    }

    pub fn started(&self) {
        self.emit(ImageEvent::TaskStarted {
            task_id: self.task_id,
            key: self.key.clone(),
        });
    }

    pub fn completed(&self, bytes: usize, duration_ms: u64) {
        self.emit(ImageEvent::TaskCompleted {
            task_id: self.task_id,
            key: self.key.clone(),
            bytes,
            duration_ms,
        });
    }

    pub fn failed(&self, message: &str) {
        self.emit(ImageEvent::TaskFailed {
            task_id: self.task_id,
            key: self.key.clone(),
            message: message.to_string(),
        });
    }

    pub fn cancelled(&self) {
        self.emit(ImageEvent::TaskCancelled {
            task_id: self.task_id,
            key: self.key.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::request::ImageRequest;

    #[test]
    fn test_event_bus_subscribe() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(ImageEvent::PreheatStarted { key: "k".to_string() });
    }

    #[tokio::test]
    async fn test_task_emitter_lifecycle() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let key = ImageRequest::new("http://example.com/a.png").key();
        let emitter = bus.emitter_for(9, &key);

        emitter.started();
        emitter.completed(100, 5);

        let started = rx.recv().await.unwrap();
        assert_eq!(started.event_type(), "TaskStarted");
        assert_eq!(started.task_id(), Some(9));
        assert_eq!(started.key(), key.to_string());

        let completed = rx.recv().await.unwrap();
        assert!(matches!(completed, ImageEvent::TaskCompleted { bytes: 100, .. }));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_preheat_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let key = ImageRequest::new("http://example.com/b.png").key();

        bus.preheat_started(&key);
        bus.preheat_stopped(&key);

        assert_eq!(rx.recv().await.unwrap().event_type(), "PreheatStarted");
        assert_eq!(rx.recv().await.unwrap().event_type(), "PreheatStopped");
    }
}
