//! imagewarm configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::events::{DEFAULT_CHANNEL_CAPACITY, EventLogger};
use crate::executor::LoaderConfig;
use crate::preheater::PreheaterConfig;
use crate::queue::TaskQueueConfig;

/// Main imagewarm configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preheat registry and its rate-limiting queue
    pub preheater: PreheaterConfig,

    /// Queue the pipeline executor runs loads on
    pub executor: TaskQueueConfig,

    /// Simulated loader used by the CLI
    pub loader: LoaderConfig,

    /// Event bus and event log
    pub events: EventsConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .imagewarm.yml
        let local_config = PathBuf::from(".imagewarm.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/imagewarm/imagewarm.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("imagewarm").join("imagewarm.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Event bus and event log configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast buffer; slow subscribers lag past this many events
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,

    /// Where per-run event logs go; `None` uses the data directory
    #[serde(rename = "log-dir")]
    pub log_dir: Option<PathBuf>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            log_dir: None,
        }
    }
}

impl EventsConfig {
    /// Directory for per-run event logs
    pub fn runs_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(EventLogger::default_runs_dir)
    }
}
