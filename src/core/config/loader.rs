use super::ConductorConfig;
use crate::Result;
use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "conductor.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with precedence defaults, then file, then environment.
    ///
    /// An explicit `path` must exist. Without one, `./conductor.toml` is used
    /// when present.
    pub fn load(path: Option<&Path>) -> Result<ConductorConfig> {
        let file_config = match path {
            Some(path) => Some(
                Self::load_from_file(path)?
                    .with_context(|| format!("config file {} not found", path.display()))?,
            ),
            None => Self::load_from_file(&Self::default_path())?,
        };

        let mut config = file_config.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        super::ConfigValidator::validate(&config)?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Returns Ok(None) if the file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<ConductorConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ConductorConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        Ok(Some(config))
    }

    /// Environment variables take precedence over config file values.
    /// Values that fail to parse are ignored with a warning.
    fn apply_env_overrides(config: &mut ConductorConfig) {
        if let Some(size) = parse_env("CONDUCTOR_WORKER_POOL_SIZE") {
            config.engine.worker_pool_size = size;
        }
        if let Some(secs) = parse_env("CONDUCTOR_DEFAULT_TASK_TIMEOUT_SECS") {
            config.engine.default_task_timeout_secs = secs;
        }
        if let Some(policy) = parse_env("CONDUCTOR_DUPLICATE_DEFINITIONS") {
            config.engine.duplicate_definitions = policy;
        }

        if let Some(delay) = parse_env("CONDUCTOR_RETRY_BASE_DELAY_MS") {
            config.retry.base_delay_ms = delay;
        }
        if let Some(multiplier) = parse_env("CONDUCTOR_RETRY_MULTIPLIER") {
            config.retry.multiplier = multiplier;
        }
        if let Some(delay) = parse_env("CONDUCTOR_RETRY_MAX_DELAY_MS") {
            config.retry.max_delay_ms = delay;
        }
        if let Some(jitter) = parse_env("CONDUCTOR_RETRY_JITTER_MS") {
            config.retry.jitter_ms = jitter;
        }

        if let Some(kind) = parse_env("CONDUCTOR_PERSISTENCE_BACKEND") {
            config.persistence.kind = kind;
        }
        if let Ok(url) = env::var("CONDUCTOR_PERSISTENCE_URL") {
            if !url.trim().is_empty() {
                config.persistence.url = url;
            }
        }
        if let Some(max) = parse_env("CONDUCTOR_PERSISTENCE_MAX_CONNECTIONS") {
            config.persistence.max_connections = max;
        }
    }

    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "CONDUCTOR_WORKER_POOL_SIZE - Slots for blocking task functions (default: 32)",
            "CONDUCTOR_DEFAULT_TASK_TIMEOUT_SECS - Timeout for tasks without one (default: 300)",
            "CONDUCTOR_DUPLICATE_DEFINITIONS - reject or overwrite (default: reject)",
            "CONDUCTOR_RETRY_BASE_DELAY_MS - First retry delay (default: 1000)",
            "CONDUCTOR_RETRY_MULTIPLIER - Backoff growth factor (default: 2.0)",
            "CONDUCTOR_RETRY_MAX_DELAY_MS - Backoff ceiling (default: 60000)",
            "CONDUCTOR_RETRY_JITTER_MS - Random delay added per retry (default: 100)",
            "CONDUCTOR_PERSISTENCE_BACKEND - memory or sqlite (default: memory)",
            "CONDUCTOR_PERSISTENCE_URL - SQLite connection URL",
            "CONDUCTOR_PERSISTENCE_MAX_CONNECTIONS - Store pool size (default: 5)",
        ]
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
