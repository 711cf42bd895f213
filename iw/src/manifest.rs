//! Preheat manifests: YAML lists of requests for the `preheat` command

use std::fs;
use std::path::Path;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::request::{CachePolicy, FnProcessor, ImageRequest, Priority, Resource};

/// One request in a manifest
///
/// Processors are named only; the CLI runs them as identity transforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestEntry {
    pub url: String,

    #[serde(default)]
    pub cache_policy: CachePolicy,

    #[serde(default = "default_cellular_access")]
    pub allows_cellular_access: bool,

    #[serde(default)]
    pub processors: Vec<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_cellular_access() -> bool {
    true
}

impl ManifestEntry {
    pub fn to_request(&self) -> ImageRequest {
        let mut resource = Resource::new(&self.url)
            .with_cache_policy(self.cache_policy)
            .with_cellular_access(self.allows_cellular_access);
        if let Some(ms) = self.timeout_ms {
            resource = resource.with_timeout(Duration::from_millis(ms));
        }

        self.processors
            .iter()
            .fold(ImageRequest::with_resource(resource), |request, id| {
                request.processed(FnProcessor::identity(id.as_str()))
            })
            .with_priority(self.priority)
    }
}

/// Parse a manifest from YAML text
pub fn parse_manifest(yaml: &str) -> Result<Vec<ManifestEntry>> {
    serde_yaml::from_str(yaml).context("Failed to parse manifest")
}

/// Load a manifest file and build its requests
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<ImageRequest>> {
    let content = fs::read_to_string(&path)
        .context(format!("Failed to read manifest {}", path.as_ref().display()))?;
    let entries = parse_manifest(&content)?;
    tracing::info!(count = entries.len(), "Loaded manifest from: {}", path.as_ref().display());
    Ok(entries.iter().map(ManifestEntry::to_request).collect())
}
