//! Command-line parsing
//!
//! Uses clap to define the interface; flags override the configuration file.

use crate::config::{Endpoint, LauncherConfig};
use crate::error::LauncherResult;
use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Exit status for a missing or malformed argument
pub const USAGE_EXIT_CODE: i32 = 1;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "start-triggers",
    about = "Start the trigger service, register the configured triggers and keep it running until interrupted",
    version
)]
pub struct Cli {
    /// Port the ledger (sandbox) listens on
    #[arg(value_name = "SANDBOX_PORT")]
    pub ledger_port: u16,

    /// Host the ledger listens on
    #[arg(long)]
    pub ledger_host: Option<String>,

    /// Port the trigger service will listen on
    #[arg(long)]
    pub service_port: Option<u16>,

    /// Archive holding the trigger definitions
    #[arg(long)]
    pub dar: Option<PathBuf>,

    /// Configuration file (TOML, JSON or YAML) layered over the defaults
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `info,trigger_launcher=trace` (overrides RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also append log output to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Parse process arguments
    pub fn parse_cli() -> Self {
        Self::parse_cli_from(std::env::args_os())
    }

    /// Parse `iter`, exiting with [`USAGE_EXIT_CODE`] on a usage error
    pub fn parse_cli_from<I, T>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(iter) {
            Ok(cli) => cli,
            Err(err) => match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
                _ => {
                    let _ = err.print();
                    std::process::exit(USAGE_EXIT_CODE);
                }
            },
        }
    }

    /// Build the run configuration: defaults, then the config file, then flags
    pub fn to_config(&self) -> LauncherResult<LauncherConfig> {
        let mut config = match &self.config {
            Some(path) => LauncherConfig::from_file(path)?,
            None => LauncherConfig::default(),
        };

        config.ledger = Endpoint::new(
            self.ledger_host
                .clone()
                .unwrap_or_else(|| config.ledger.host.clone()),
            self.ledger_port,
        );
        if let Some(port) = self.service_port {
            config.trigger_service.port = port;
        }
        if let Some(dar) = &self.dar {
            config.dar = dar.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
