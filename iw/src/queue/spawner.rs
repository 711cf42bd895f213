//! Pluggable execution backend for queued work

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::runtime::Handle;

/// Errors building a spawner
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Runs futures on some pool of worker threads
///
/// The queue decides *when* work may run; the spawner decides *where*.
/// `spawn` is called with queue callers' locks held, so it must hand the
/// future off and never poll it on the calling thread.
pub trait WorkSpawner: Send + Sync {
    fn spawn(&self, work: BoxFuture<'static, ()>);
}

/// Spawner backed by a tokio runtime
///
/// Holding a [`Handle`] lets plain OS threads submit work.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawner for the runtime the caller is running inside
    pub fn current() -> Result<Self, SpawnError> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl WorkSpawner for TokioSpawner {
    fn spawn(&self, work: BoxFuture<'static, ()>) {
        self.handle.spawn(work);
    }
}
