//! imagewarm - image request deduplication and background preheating
//!
//! Speculatively loads images before they are displayed (for example, the
//! next rows of a scrolling list) without issuing duplicate loads for
//! equivalent requests.
//!
//! # Core Concepts
//!
//! - **Request equivalence**: two requests are the same load when their
//!   [`RequestKey`]s are equal (URL, cache policy, cellular access,
//!   processor identifiers in order)
//! - **Reference counting**: every start adds a reference, every stop drops
//!   one, the load is cancelled when none remain
//! - **Rate limiting**: preheat loads run at low priority on their own queue
//!
//! # Modules
//!
//! - [`request`] - Requests, processors and equivalence keys
//! - [`queue`] - Prioritized, cancellable, suspendable task queue
//! - [`executor`] - Task executor contract and the loader pipeline
//! - [`preheater`] - The reference-counted preheat registry
//! - [`events`] - Event bus and JSONL event log
//! - [`manifest`] - YAML request lists for the CLI
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod executor;
pub mod manifest;
pub mod preheater;
pub mod queue;
pub mod request;

// Re-export commonly used types
pub use config::{Config, EventsConfig};
pub use events::{EventBus, EventLogger, ImageEvent, TaskId};
pub use executor::{
    ImageLoader, LoadError, LoaderConfig, PipelineExecutor, SimulatedLoader, TaskExecutor, TaskHandle, TaskState,
};
pub use preheater::{Preheater, PreheaterConfig, StopPolicy};
pub use queue::{TaskQueue, TaskQueueConfig, TokioSpawner, WorkSpawner};
pub use request::{CachePolicy, FnProcessor, Image, ImageProcessor, ImageRequest, Priority, RequestKey, Resource};
