//! Preheater configuration

use serde::{Deserialize, Serialize};

use crate::queue::TaskQueueConfig;
use crate::request::Priority;

/// How duplicate requests inside one `stop_preheating` call are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StopPolicy {
    /// Each distinct key loses at most one reference per call
    #[default]
    PerBatch,
    /// Every occurrence drops a reference, mirroring how starts are counted
    PerRequest,
}

/// Preheater configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreheaterConfig {
    /// Max speculative loads in flight at once
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Priority given to preheat loads
    pub priority: Priority,

    #[serde(rename = "stop-policy")]
    pub stop_policy: StopPolicy,

    /// Drop registry entries whose load completed successfully
    #[serde(rename = "forget-completed")]
    pub forget_completed: bool,
}

impl Default for PreheaterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            priority: Priority::Low,
            stop_policy: StopPolicy::PerBatch,
            forget_completed: false,
        }
    }
}

impl PreheaterConfig {
    /// Configuration for the queue that rate-limits preheat loads
    pub fn queue_config(&self) -> TaskQueueConfig {
        TaskQueueConfig::with_max_concurrent(self.max_concurrent)
    }
}
