use conductor::backend::BackendKind;
use conductor::core::workflow::{DuplicatePolicy, FunctionRegistry, TaskTemplate, WorkflowDefinition};
use conductor::core::{ConductorConfig, ConfigLoader, Engine};
use conductor::logging::{ConsoleOutput, LogFormat, LoggingConfig};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "CONDUCTOR_WORKER_POOL_SIZE",
    "CONDUCTOR_DEFAULT_TASK_TIMEOUT_SECS",
    "CONDUCTOR_DUPLICATE_DEFINITIONS",
    "CONDUCTOR_RETRY_BASE_DELAY_MS",
    "CONDUCTOR_RETRY_MULTIPLIER",
    "CONDUCTOR_RETRY_MAX_DELAY_MS",
    "CONDUCTOR_RETRY_JITTER_MS",
    "CONDUCTOR_PERSISTENCE_BACKEND",
    "CONDUCTOR_PERSISTENCE_URL",
    "CONDUCTOR_PERSISTENCE_MAX_CONNECTIONS",
    "CONDUCTOR_LOG_DIR",
    "CONDUCTOR_LOG_CONSOLE",
    "CONDUCTOR_LOG_FORMAT",
];

fn clear_conductor_env() {
    for v in ENV_VARS {
        env::remove_var(v);
    }
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("conductor.toml");
    fs::write(&path, content).unwrap();
    path
}

/// One file carries engine, retry, persistence and logging settings.
#[test]
#[serial]
fn test_full_config_file() {
    clear_conductor_env();
    let temp_dir = TempDir::new().unwrap();
    let db = temp_dir.path().join("conductor.db");
    let path = write_config(
        &temp_dir,
        &format!(
            r#"
[engine]
worker_pool_size = 8
default_task_timeout_secs = 45
duplicate_definitions = "overwrite"

[retry]
base_delay_ms = 250
multiplier = 3.0
max_delay_ms = 5000
jitter_ms = 0

[persistence]
backend = "sqlite"
url = "sqlite://{}"
max_connections = 2

[logging]
default_level = "conductor=debug,info"
console_output = "stderr"
format = "json"
"#,
            db.display()
        ),
    );

    let config = ConfigLoader::load(Some(&path)).unwrap();
    assert_eq!(config.engine.worker_pool_size, 8);
    assert_eq!(config.engine.default_task_timeout_secs, 45);
    assert_eq!(config.engine.duplicate_definitions, DuplicatePolicy::Overwrite);
    assert_eq!(config.retry.base_delay_ms, 250);
    assert_eq!(config.retry.multiplier, 3.0);
    assert_eq!(config.retry.max_delay_ms, 5000);
    assert_eq!(config.retry.jitter_ms, 0);
    assert_eq!(config.persistence.kind, BackendKind::Sqlite);
    assert_eq!(config.persistence.max_connections, 2);

    let logging = LoggingConfig::load(Some(&path)).unwrap();
    assert_eq!(logging.default_level, "conductor=debug,info");
    assert_eq!(logging.console_output, Some(ConsoleOutput::Stderr));
    assert_eq!(logging.format, LogFormat::Json);
    assert!(!logging.enable_file);
}

/// Environment variables win over the file.
#[test]
#[serial]
fn test_env_precedence() {
    clear_conductor_env();
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
[engine]
worker_pool_size = 8

[retry]
base_delay_ms = 250
"#,
    );

    env::set_var("CONDUCTOR_WORKER_POOL_SIZE", "2");
    env::set_var("CONDUCTOR_RETRY_BASE_DELAY_MS", "10");
    env::set_var("CONDUCTOR_DUPLICATE_DEFINITIONS", "overwrite");
    env::set_var("CONDUCTOR_LOG_FORMAT", "json");
    env::set_var("CONDUCTOR_LOG_DIR", temp_dir.path().join("logs"));

    let config = ConfigLoader::load(Some(&path));
    let logging = LoggingConfig::load(Some(&path));
    clear_conductor_env();

    let config = config.unwrap();
    assert_eq!(config.engine.worker_pool_size, 2);
    assert_eq!(config.retry.base_delay_ms, 10);
    assert_eq!(config.engine.duplicate_definitions, DuplicatePolicy::Overwrite);

    let logging = logging.unwrap();
    assert_eq!(logging.format, LogFormat::Json);
    assert!(logging.enable_file);
    assert_eq!(logging.log_dir, Some(temp_dir.path().join("logs")));
}

/// Unparsable overrides are ignored rather than failing startup.
#[test]
#[serial]
fn test_bad_env_override_is_ignored() {
    clear_conductor_env();
    env::set_var("CONDUCTOR_WORKER_POOL_SIZE", "lots");
    let config = ConfigLoader::load(None);
    clear_conductor_env();

    assert_eq!(config.unwrap().engine.worker_pool_size, 32);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_an_error() {
    clear_conductor_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let err = ConfigLoader::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    clear_conductor_env();
    let temp_dir = TempDir::new().unwrap();

    let path = write_config(&temp_dir, "[engine]\nworker_pool_size = 0\n");
    let err = ConfigLoader::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("worker_pool_size"));

    let path = write_config(
        &temp_dir,
        "[persistence]\nbackend = \"sqlite\"\nurl = \"postgres://db\"\n",
    );
    let err = ConfigLoader::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("persistence.url"));

    let path = write_config(&temp_dir, "[engine\nworker_pool_size = 1\n");
    let err = ConfigLoader::load(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("failed to parse config file"));
}

/// Loaded settings reach the engine built from them.
#[tokio::test]
#[serial]
async fn test_engine_follows_loaded_config() {
    clear_conductor_env();
    let temp_dir = TempDir::new().unwrap();
    let db = temp_dir.path().join("engine.db");
    let path = write_config(
        &temp_dir,
        &format!(
            r#"
[engine]
duplicate_definitions = "overwrite"

[persistence]
backend = "sqlite"
url = "sqlite://{}"
"#,
            db.display()
        ),
    );

    let config = ConfigLoader::load(Some(&path)).unwrap();
    let engine = Engine::from_config(&config, FunctionRegistry::with_builtins()).await;
    assert_eq!(engine.backend_name(), "sqlite");

    let definition = WorkflowDefinition::new("twice").task(TaskTemplate::new("a", "noop"));
    engine.register_definition(definition.clone()).unwrap();
    engine.register_definition(definition).unwrap();

    let in_memory = Engine::from_config(&ConductorConfig::default(), FunctionRegistry::with_builtins()).await;
    assert_eq!(in_memory.backend_name(), "memory");
}
