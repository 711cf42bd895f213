//! Request equivalence keys

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{CachePolicy, ImageRequest};

/// Equivalence class of an [`ImageRequest`]
///
/// Built from the URL, every cache-affecting transport flag, and the ordered
/// processor identifiers. Timeout and priority are deliberately left out:
/// they change when a load runs, not what it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    url: String,
    cache_policy: CachePolicy,
    allows_cellular_access: bool,
    processors: Vec<String>,
}

impl RequestKey {
    /// Derive the key for a request
    pub fn for_request(request: &ImageRequest) -> Self {
        let resource = request.resource();
        Self {
            url: resource.url.clone(),
            cache_policy: resource.cache_policy,
            allows_cellular_access: resource.allows_cellular_access,
            processors: request
                .processors()
                .iter()
                .map(|p| p.identifier().to_string())
                .collect(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn processors(&self) -> &[String] {
        &self.processors
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.url,
            self.cache_policy,
            if self.allows_cellular_access { "cellular" } else { "no-cellular" },
            self.processors.join(",")
        )
    }
}
