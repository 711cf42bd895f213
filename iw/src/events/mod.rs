//! Pipeline notifications
//!
//! Every lifecycle transition is published on one [`EventBus`]. Tests and
//! the CLI subscribe to it; [`EventLogger`] persists it per run.
//!
//! ```text
//!   Preheater            PipelineExecutor
//!   - PreheatStarted     - TaskStarted / TaskCompleted
//!   - PreheatStopped     - TaskFailed / TaskCancelled
//!          \                 /
//!           +--> EventBus --+--> subscribers (tests, CLI, EventLogger)
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, TaskEmitter};
pub use logger::{EventLogger, read_run_events, spawn_event_logger};
pub use types::{EventLogEntry, ImageEvent, TaskId};
