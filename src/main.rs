use anyhow::Context;
use std::process::ExitCode;
use trigger_launcher::commands::Cli;
use trigger_launcher::driver::{Orchestrator, Outcome};
use trigger_launcher::signal;
use trigger_launcher::utils::logger::init_logger;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_cli();

    if let Err(err) = init_logger(cli.log_level.as_deref(), cli.log_file.clone()) {
        eprintln!("Failed to initialise logging: {err:#}");
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.to_config().context("Invalid configuration")?;
    let orchestrator = Orchestrator::new(config).context("Failed to prepare launcher")?;
    let signals = signal::install().context("Failed to install signal handlers")?;

    let report = orchestrator.run(signals.recv()).await?;
    match report.outcome {
        Outcome::Interrupted => {
            tracing::info!("Stopped gracefully");
            Ok(ExitCode::from(0))
        }
        Outcome::ServiceExited { .. } => Ok(ExitCode::from(1)),
    }
}
