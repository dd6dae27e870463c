//! Error types for the trigger launcher
//!
//! Every failure except a kill aimed at an already-gone process group is fatal
//! to a launcher run. The driver wraps these in [`crate::driver::DriverError`]
//! to record which phase failed.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LauncherError {
    /// A readiness wait ran past its deadline
    #[error("Waited too long for the port {host}:{port} (timeout: {}ms)", .timeout.as_millis())]
    Timeout {
        host: String,
        port: u16,
        timeout: Duration,
        #[source]
        source: Option<io::Error>,
    },

    #[error("Executable not found: '{0}' not found in PATH")]
    ExecutableNotFound(String),

    #[error("Failed to start '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The archive inspection command exited unsuccessfully
    #[error("Archive inspection failed ({}): {}", describe_status(.status), .stderr.trim())]
    Inspection { status: ExitStatus, stderr: String },

    /// The archive inspection output could not be interpreted
    #[error("Could not read package id from inspection output: {0}")]
    Parse(String),

    #[error("Registering {trigger} for {party} failed with HTTP {status}: {body}")]
    Registration {
        party: String,
        trigger: String,
        status: u16,
        body: String,
    },

    #[error("Registering {trigger} for {party} failed")]
    RegistrationTransport {
        party: String,
        trigger: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Trigger service exited unexpectedly ({}):\n{}", describe_status(.status), .stderr)]
    ServiceExited { status: ExitStatus, stderr: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error")]
    Io(#[from] io::Error),
}

impl LauncherError {
    pub fn timeout(host: &str, port: u16, timeout: Duration, source: Option<io::Error>) -> Self {
        Self::Timeout {
            host: host.to_string(),
            port,
            timeout,
            source,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<config::ConfigError> for LauncherError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

fn describe_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return format!("killed by signal {signal}");
                }
            }
            "no exit code".to_string()
        }
    }
}

pub type LauncherResult<T> = Result<T, LauncherError>;
