//! Image requests and their equivalence keys
//!
//! An [`ImageRequest`] names a resource (URL plus transport policy), an
//! ordered processing pipeline, and a priority. [`RequestKey`] is the single
//! definition of "same request" used for deduplication everywhere.

mod key;
mod priority;
mod processor;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use key::RequestKey;
pub use priority::Priority;
pub use processor::{FnProcessor, Image, ImageProcessor};

/// Default transport timeout for a resource
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport cache directive attached to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Follow whatever the protocol's caching headers say
    #[default]
    UseProtocolCachePolicy,
    /// Always go to the origin, ignoring cached data
    ReloadIgnoringCacheData,
    /// Use cached data regardless of age, load only on a miss
    ReturnCacheDataElseLoad,
    /// Use cached data only, never load
    ReturnCacheDataDontLoad,
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseProtocolCachePolicy => write!(f, "use-protocol-cache-policy"),
            Self::ReloadIgnoringCacheData => write!(f, "reload-ignoring-cache-data"),
            Self::ReturnCacheDataElseLoad => write!(f, "return-cache-data-else-load"),
            Self::ReturnCacheDataDontLoad => write!(f, "return-cache-data-dont-load"),
        }
    }
}

/// The transport-level description of what to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: String,
    pub cache_policy: CachePolicy,
    pub allows_cellular_access: bool,
    pub timeout: Duration,
}

impl Resource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache_policy: CachePolicy::default(),
            allows_cellular_access: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    pub fn with_cellular_access(mut self, allowed: bool) -> Self {
        self.allows_cellular_access = allowed;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A request to load (and optionally process) an image
///
/// Requests are cheap to clone; processors are shared.
#[derive(Clone)]
pub struct ImageRequest {
    resource: Resource,
    processors: Vec<Arc<dyn ImageProcessor>>,
    priority: Priority,
}

impl ImageRequest {
    /// Request for a URL with default transport policy and no processing
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_resource(Resource::new(url))
    }

    /// Request for a fully specified resource
    pub fn with_resource(resource: Resource) -> Self {
        Self {
            resource,
            processors: Vec::new(),
            priority: Priority::default(),
        }
    }

    /// Append a processor to the pipeline
    pub fn processed(mut self, processor: impl ImageProcessor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Append a closure-based processor with the given identifier
    pub fn processed_with<F>(self, identifier: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Image) -> Option<Image> + Send + Sync + 'static,
    {
        self.processed(FnProcessor::new(identifier, func))
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn url(&self) -> &str {
        &self.resource.url
    }

    pub fn processors(&self) -> &[Arc<dyn ImageProcessor>] {
        &self.processors
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Equivalence key for deduplication and cache lookups
    pub fn key(&self) -> RequestKey {
        RequestKey::for_request(self)
    }
}

impl fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let processors: Vec<&str> = self.processors.iter().map(|p| p.identifier()).collect();
        f.debug_struct("ImageRequest")
            .field("resource", &self.resource)
            .field("processors", &processors)
            .field("priority", &self.priority)
            .finish()
    }
}
