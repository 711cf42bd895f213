//! Executor and loader contracts

use std::sync::Arc;

use async_trait::async_trait;

use super::error::LoadError;
use super::handle::TaskHandle;
use crate::request::{Image, ImageRequest};

/// The fetch/decode/process pipeline as seen by the scheduling core
///
/// `start` triggers a load and returns at once. `cancel` is idempotent and,
/// once it returns, the task produces no further notifications.
pub trait TaskExecutor: Send + Sync {
    fn start(&self, request: &ImageRequest) -> TaskHandle;

    fn cancel(&self, handle: &TaskHandle);
}

impl<E: TaskExecutor + ?Sized> TaskExecutor for Arc<E> {
    fn start(&self, request: &ImageRequest) -> TaskHandle {
        (**self).start(request)
    }

    fn cancel(&self, handle: &TaskHandle) {
        (**self).cancel(handle)
    }
}

/// Loads and processes the image for one request
#[async_trait]
pub trait ImageLoader: Send + Sync + 'static {
    async fn load(&self, request: &ImageRequest) -> Result<Image, LoadError>;
}
