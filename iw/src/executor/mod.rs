//! Task executor contract and the pipeline glue behind it
//!
//! The real fetch/decode stack is an external collaborator. The scheduling
//! core only sees [`TaskExecutor`]: `start` returns a [`TaskHandle`] at once,
//! `cancel` stops further notifications for that task.

mod error;
mod handle;
mod pipeline;
mod simulated;
mod traits;

pub use error::LoadError;
pub use handle::{TaskHandle, TaskState};
pub use pipeline::PipelineExecutor;
pub use simulated::{LoaderConfig, SimulatedLoader};
pub use traits::{ImageLoader, TaskExecutor};

#[cfg(test)]
pub use traits::mock;
