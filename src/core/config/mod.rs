use crate::core::workflow::registry::DuplicatePolicy;
use conductor_backend::BackendConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration loaded from conductor.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConductorConfig {
    /// Scheduler and worker pool settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Backoff applied between task attempts
    #[serde(default)]
    pub retry: RetryConfig,

    /// Instance store selection
    #[serde(default)]
    pub persistence: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Slots shared by all blocking task functions
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Timeout for tasks that do not set their own
    #[serde(default = "default_task_timeout_secs")]
    pub default_task_timeout_secs: u64,

    /// What happens when a definition name is registered twice
    #[serde(default)]
    pub duplicate_definitions: DuplicatePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_worker_pool_size() -> usize {
    32
}

fn default_task_timeout_secs() -> u64 {
    300
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_ms() -> u64 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            worker_pool_size: default_worker_pool_size(),
            default_task_timeout_secs: default_task_timeout_secs(),
            duplicate_definitions: DuplicatePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn default_task_timeout(&self) -> Duration {
        Duration::from_secs(self.default_task_timeout_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
