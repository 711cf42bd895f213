//! Task queue configuration

use serde::{Deserialize, Serialize};

/// Task queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQueueConfig {
    /// Max units of work executing at once
    #[serde(default = "default_max_concurrent", rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Start suspended: accept work but run nothing until resumed
    #[serde(default)]
    pub suspended: bool,
}

fn default_max_concurrent() -> usize {
    6
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            suspended: false,
        }
    }
}

impl TaskQueueConfig {
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..Default::default()
        }
    }

    pub fn suspended(mut self, suspended: bool) -> Self {
        self.suspended = suspended;
        self
    }

    /// Effective limit; a zero limit would never drain, so it runs one at a time
    pub fn concurrency_limit(&self) -> usize {
        self.max_concurrent.max(1)
    }
}
