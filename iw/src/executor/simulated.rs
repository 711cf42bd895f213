//! Simulated loader for demos, soak runs and tests
//!
//! Stands in for the real network/decode stack: sleeps for a configurable
//! latency, optionally fails, synthesizes pixels, then runs the request's
//! processor pipeline for real.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::LoadError;
use super::traits::ImageLoader;
use crate::request::{CachePolicy, Image, ImageRequest};

/// Simulated loader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base latency of every load
    #[serde(rename = "latency-ms")]
    pub latency_ms: u64,

    /// Random extra latency, uniform in `0..=jitter_ms`
    #[serde(rename = "jitter-ms")]
    pub jitter_ms: u64,

    /// Probability in `[0, 1]` that a load fails with a network error
    #[serde(rename = "failure-rate")]
    pub failure_rate: f64,

    /// Probability in `[0, 1]` that a fetched payload fails to decode
    #[serde(rename = "corrupt-rate")]
    pub corrupt_rate: f64,

    /// Edge length of the synthesized square image
    #[serde(rename = "image-size")]
    pub image_size: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            latency_ms: 150,
            jitter_ms: 100,
            failure_rate: 0.0,
            corrupt_rate: 0.0,
            image_size: 64,
        }
    }
}

impl LoaderConfig {
    /// A loader that answers immediately and never fails
    pub fn instant() -> Self {
        Self {
            latency_ms: 0,
            jitter_ms: 0,
            ..Default::default()
        }
    }
}

/// [`ImageLoader`] that fakes the network
#[derive(Debug, Default)]
pub struct SimulatedLoader {
    config: LoaderConfig,
    loads: AtomicU64,
}

impl SimulatedLoader {
    pub fn new(config: LoaderConfig) -> Self {
        debug!(?config, "SimulatedLoader::new: called");
        Self {
            config,
            loads: AtomicU64::new(0),
        }
    }

    /// Number of loads that reached the simulated network
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    fn synthesize(&self, url: &str) -> Image {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let seed = hasher.finish().to_le_bytes();

        let size = self.config.image_size.max(1);
        let len = (size as usize) * (size as usize) * 4;
        let data = seed.iter().copied().cycle().take(len).collect();
        Image::new(size, size, data)
    }
}

#[async_trait]
impl ImageLoader for SimulatedLoader {
    async fn load(&self, request: &ImageRequest) -> Result<Image, LoadError> {
        let resource = request.resource();
        debug!(url = %resource.url, "SimulatedLoader::load: called");

        // Nothing is ever cached here, so cache-only requests always miss
        if resource.cache_policy == CachePolicy::ReturnCacheDataDontLoad {
            return Err(LoadError::NotCached {
                url: resource.url.clone(),
            });
        }

        let (delay, fail, corrupt) = {
            let mut rng = rand::rng();
            let jitter = if self.config.jitter_ms > 0 {
                rng.random_range(0..=self.config.jitter_ms)
            } else {
                0
            };
            let fail = rng.random_bool(self.config.failure_rate.clamp(0.0, 1.0));
            let corrupt = rng.random_bool(self.config.corrupt_rate.clamp(0.0, 1.0));
            (Duration::from_millis(self.config.latency_ms + jitter), fail, corrupt)
        };

        self.loads.fetch_add(1, Ordering::SeqCst);
        if delay > resource.timeout {
            tokio::time::sleep(resource.timeout).await;
            return Err(LoadError::Timeout(resource.timeout));
        }
        tokio::time::sleep(delay).await;

        if fail {
            return Err(LoadError::Network(format!("simulated failure loading {}", resource.url)));
        }
        if corrupt {
            return Err(LoadError::Decode(format!("corrupt payload from {}", resource.url)));
        }

        let mut image = self.synthesize(&resource.url);
        for processor in request.processors() {
            image = processor.process(&image).ok_or_else(|| LoadError::Processing {
                processor: processor.identifier().to_string(),
            })?;
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Resource;

    #[tokio::test]
    async fn test_instant_load() {
        let loader = SimulatedLoader::new(LoaderConfig::instant());
        let image = loader.load(&ImageRequest::new("http://example.com/a.png")).await.unwrap();

        assert_eq!(image.width, 64);
        assert_eq!(image.byte_len(), 64 * 64 * 4);
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_same_url_same_pixels() {
        let loader = SimulatedLoader::new(LoaderConfig::instant());
        let a = loader.load(&ImageRequest::new("http://example.com/a.png")).await.unwrap();
        let b = loader.load(&ImageRequest::new("http://example.com/a.png")).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_processors_run_in_order() {
        let loader = SimulatedLoader::new(LoaderConfig {
            image_size: 2,
            ..LoaderConfig::instant()
        });
        let request = ImageRequest::new("http://example.com/a.png")
            .processed_with("zero", |image| Some(Image::new(image.width, image.height, vec![0; image.byte_len()])))
            .processed_with("plus-one", |image| {
                Some(Image::new(image.width, image.height, image.data.iter().map(|b| b + 1).collect()))
            });

        let image = loader.load(&request).await.unwrap();
        assert!(image.data.iter().all(|b| *b == 1));
    }

    #[tokio::test]
    async fn test_processor_failure() {
        let loader = SimulatedLoader::new(LoaderConfig::instant());
        let request = ImageRequest::new("http://example.com/a.png").processed_with("broken", |_| None);

        let err = loader.load(&request).await.unwrap_err();
        assert_eq!(
            err,
            LoadError::Processing {
                processor: "broken".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_cache_only_request_misses() {
        let loader = SimulatedLoader::new(LoaderConfig::instant());
        let request = ImageRequest::with_resource(
            Resource::new("http://example.com/a.png").with_cache_policy(CachePolicy::ReturnCacheDataDontLoad),
        );

        assert!(matches!(loader.load(&request).await, Err(LoadError::NotCached { .. })));
        assert_eq!(loader.load_count(), 0);
    }

    #[tokio::test]
    async fn test_always_failing_loader() {
        let loader = SimulatedLoader::new(LoaderConfig {
            failure_rate: 1.0,
            ..LoaderConfig::instant()
        });
        let err = loader.load(&ImageRequest::new("http://example.com/a.png")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_decode_error() {
        let loader = SimulatedLoader::new(LoaderConfig {
            corrupt_rate: 1.0,
            ..LoaderConfig::instant()
        });
        let request = ImageRequest::new("http://example.com/a.png").processed_with("never", |_| None);

        // Decoding fails before any processor runs
        let err = loader.load(&request).await.unwrap_err();
        assert!(matches!(err, LoadError::Decode(ref msg) if msg.contains("a.png")));
        assert!(!err.is_retryable());
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let loader = SimulatedLoader::new(LoaderConfig {
            latency_ms: 5_000,
            ..LoaderConfig::instant()
        });
        let request = ImageRequest::with_resource(
            Resource::new("http://example.com/a.png").with_timeout(Duration::from_millis(20)),
        );

        let err = loader.load(&request).await.unwrap_err();
        assert_eq!(err, LoadError::Timeout(Duration::from_millis(20)));
    }
}
