use clap::Args;
use conductor_types::{InstanceId, InstanceStatus};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML document containing workflow definitions
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Name of the workflow to start
    #[arg(long, short = 'w', value_name = "NAME")]
    pub workflow: String,

    /// Runtime parameter merged over the workflow defaults; values are parsed as JSON when possible
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// Tenant that owns the instance
    #[arg(long, default_value = "local", help_heading = "Ownership")]
    pub tenant: String,

    /// User recorded as the instance creator (default: $USER)
    #[arg(long, value_name = "USER", help_heading = "Ownership")]
    pub user: Option<String>,

    /// Give up waiting after this long, e.g. 30s or 5m (the instance keeps its state)
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Path to config file (default: ./conductor.toml)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// YAML document containing workflow definitions
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Path to config file (default: ./conductor.toml)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Identifier of the instance to inspect
    #[arg(value_name = "INSTANCE")]
    pub instance_id: InstanceId,

    /// Path to config file (default: ./conductor.toml)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list instances owned by this tenant
    #[arg(long, value_name = "TENANT")]
    pub tenant: Option<String>,

    /// Only list instances in this status
    #[arg(long, value_name = "STATUS")]
    pub status: Option<InstanceStatus>,

    /// Maximum number of instances to print
    #[arg(long, default_value = "50")]
    pub limit: usize,

    /// Number of instances to skip, newest first
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Path to config file (default: ./conductor.toml)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RecoverArgs {
    /// Wait this long for recovered instances to finish
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Path to config file (default: ./conductor.toml)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,
}

/// Parse `key=value`, reading the value as JSON and falling back to a plain string.
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter '{}' has an empty key", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
