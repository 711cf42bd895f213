//! Background preheating of images
//!
//! The [`Preheater`] keeps a registry of requests keyed by [`RequestKey`]
//! with a reference count per key:
//!
//! ```text
//! start_preheating ──► Registry ──(new key)──► preheat TaskQueue ──► TaskExecutor::start
//!                         │                          │
//! stop_preheating  ──► release ──(count 0)──► TaskQueue::cancel ──► TaskExecutor::cancel
//! ```
//!
//! Equivalent requests share one load. Loads run at low priority and are
//! rate-limited by the preheat queue, separately from the executor's own
//! queue.
//!
//! [`RequestKey`]: crate::request::RequestKey

mod config;
mod core;
mod registry;

pub use config::{PreheaterConfig, StopPolicy};
pub use core::Preheater;
pub use registry::{PreheatTask, Registry, Release};
