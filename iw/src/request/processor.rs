//! Image processing pipeline steps
//!
//! Processors are opaque to the scheduling core. Only their identifier takes
//! part in request equivalence; the transform itself runs inside the loader.

use std::fmt;
use std::sync::Arc;

/// Decoded image data handed between pipeline stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// Create an image from raw pixel data
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// Size of the pixel buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// A single named transform applied to a decoded image
///
/// Two processors with the same identifier are assumed to produce the same
/// output, so the identifier must change whenever the transform does.
pub trait ImageProcessor: Send + Sync {
    /// Stable identifier used for request equivalence and cache keys
    fn identifier(&self) -> &str;

    /// Apply the transform; `None` means processing failed
    fn process(&self, image: &Image) -> Option<Image>;
}

type ProcessFn = dyn Fn(&Image) -> Option<Image> + Send + Sync;

/// Processor backed by a closure
#[derive(Clone)]
pub struct FnProcessor {
    identifier: String,
    func: Arc<ProcessFn>,
}

impl FnProcessor {
    pub fn new<F>(identifier: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Image) -> Option<Image> + Send + Sync + 'static,
    {
        Self {
            identifier: identifier.into(),
            func: Arc::new(func),
        }
    }

    /// A processor that returns its input unchanged
    pub fn identity(identifier: impl Into<String>) -> Self {
        Self::new(identifier, |image| Some(image.clone()))
    }
}

impl ImageProcessor for FnProcessor {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn process(&self, image: &Image) -> Option<Image> {
        (self.func)(image)
    }
}

impl fmt::Debug for FnProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProcessor").field("identifier", &self.identifier).finish()
    }
}
