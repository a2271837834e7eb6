pub mod config;
pub mod layers;

pub use config::{LogFormat, LoggingConfig};
pub use layers::console::ConsoleOutput;

use crate::cli::Command;
use crate::logging::layers::{console, file, BoxLayer};
use crate::Result;
use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Guards that keep logging sinks active for the duration of the command.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    console_output: ConsoleOutput,
    log_file_path: Option<PathBuf>,
}

impl LoggingGuard {
    /// Returns the console output configuration used during initialization.
    pub fn console_output(&self) -> ConsoleOutput {
        self.console_output
    }

    /// Returns the log file path when the file sink is enabled.
    pub fn log_file_path(&self) -> Option<&Path> {
        self.log_file_path.as_deref()
    }
}

/// Initialize logging for the provided CLI command.
///
/// Reads the `[logging]` section of the command's config file. `RUST_LOG`
/// takes precedence over the configured level. Errors when invoked more than
/// once per process unless tests reset the guard.
pub fn init(command: &Command) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let config_path = command.config_path();
    let config = LoggingConfig::load(config_path.as_deref())?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;

    let mut sinks: Vec<BoxLayer<Registry>> = Vec::new();

    let (file_guard, log_file_path) = if config.enable_file {
        let path = file::log_file_path(&config)?;
        match file::file_layer::<Registry>(&path, &config)? {
            Some((layer, guard)) => {
                sinks.push(layer);
                (Some(guard), Some(path))
            }
            None => (None, None),
        }
    } else {
        (None, None)
    };

    let console_output =
        console::select_console_output(config.console_output, command.writes_stdout());
    if console_output != ConsoleOutput::None {
        sinks.push(console::console_layer::<Registry>(console_output, config.format));
    }

    tracing_subscriber::registry()
        .with(sinks)
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        console_output,
        log_file_path,
    })
}
