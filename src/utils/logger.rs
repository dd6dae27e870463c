//! Logging setup
//!
//! Structured logging through `tracing`, filtered by `EnvFilter`.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter: dependencies at info, the launcher itself at debug
pub const DEFAULT_FILTER: &str = "info,trigger_launcher=debug,trigger_service=debug";

/// Initialise the global subscriber
///
/// # Arguments
/// * `log_level` - filter directive (e.g. `debug`, `info,trigger_launcher=trace`); falls back to `RUST_LOG`, then [`DEFAULT_FILTER`]
/// * `log_file` - optional file that receives a copy of every log line, without colours
///
/// # Examples
/// ```no_run
/// use trigger_launcher::utils::logger::init_logger;
///
/// init_logger(Some("debug"), None).unwrap();
/// ```
pub fn init_logger(log_level: Option<&str>, log_file: Option<PathBuf>) -> Result<()> {
    let env_filter = if let Some(level) = log_level {
        EnvFilter::try_new(level)?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(true)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(std::sync::Arc::new(file))
            .with_target(true)
            .with_ansi(false)
            .with_level(true);

        registry.with(file_layer).try_init()?;
    } else {
        registry.try_init()?;
    }

    Ok(())
}
