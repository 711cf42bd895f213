//! Task queue for background image work
//!
//! An ordered, cancellable scheduler with a concurrency limit and a suspend
//! switch. Used twice: the preheater rate-limits speculative loads with one,
//! and the pipeline executor runs its loads on another.

mod config;
mod core;
mod item;
mod spawner;

pub use config::TaskQueueConfig;
pub use core::TaskQueue;
pub use item::{CancelOutcome, CancelToken, QueueState, QueueStats, Work, WorkId, WorkTicket, work};
pub use spawner::{SpawnError, TokioSpawner, WorkSpawner};
