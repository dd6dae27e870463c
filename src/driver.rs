//! Launcher orchestration
//!
//! `WaitingForLedger → Starting → WaitingForService → ResolvingPackage →
//! Registering → Running → Cleanup`. Once the trigger service has been spawned,
//! every way out of the run (success, failure, shutdown signal) passes
//! through `Cleanup`, which terminates the service's process group.

use crate::client::{PackageInspector, RegisteredTrigger, TriggerServiceClient};
use crate::config::LauncherConfig;
use crate::error::{LauncherError, LauncherResult};
use crate::port;
use crate::supervisor::BackgroundProcess;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::process::ExitStatus;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForLedger,
    Starting,
    WaitingForService,
    ResolvingPackage,
    Registering,
    Running,
    Cleanup,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::WaitingForLedger => "waiting for ledger",
            Phase::Starting => "starting trigger service",
            Phase::WaitingForService => "waiting for trigger service",
            Phase::ResolvingPackage => "resolving package id",
            Phase::Registering => "registering triggers",
            Phase::Running => "running",
            Phase::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run: the phase it failed in and why
#[derive(Debug, Error)]
#[error("{phase} failed")]
pub struct DriverError {
    pub phase: Phase,
    #[source]
    pub source: LauncherError,
}

impl DriverError {
    fn at(phase: Phase) -> impl FnOnce(LauncherError) -> Self {
        move |source| Self { phase, source }
    }
}

/// How a run that started successfully came to an end
#[derive(Debug)]
pub enum Outcome {
    /// SIGINT/SIGTERM (or the caller's shutdown future) ended the run
    Interrupted,
    /// The trigger service exited on its own while running
    ServiceExited { status: ExitStatus, stderr: String },
}

#[derive(Debug)]
pub struct RunReport {
    pub package_id: Option<String>,
    pub registered: Vec<RegisteredTrigger>,
    pub phases: Vec<Phase>,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
struct PhaseTracker {
    history: Mutex<Vec<Phase>>,
}

impl PhaseTracker {
    fn enter(&self, phase: Phase) {
        debug!("Entering phase: {}", phase);
        self.history.lock().push(phase);
    }

    fn current(&self) -> Phase {
        self.history
            .lock()
            .last()
            .copied()
            .unwrap_or(Phase::WaitingForLedger)
    }

    fn snapshot(&self) -> Vec<Phase> {
        self.history.lock().clone()
    }
}

struct Startup {
    package_id: String,
    registered: Vec<RegisteredTrigger>,
}

pub struct Orchestrator {
    config: LauncherConfig,
    inspector: PackageInspector,
    client: TriggerServiceClient,
}

impl Orchestrator {
    pub fn new(config: LauncherConfig) -> LauncherResult<Self> {
        config.validate()?;
        let inspector = PackageInspector::new(config.inspect_command.clone());
        let client = TriggerServiceClient::new(&config.trigger_service, config.http_timeout)?;
        Ok(Self {
            config,
            inspector,
            client,
        })
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Run until the trigger service exits or `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<RunReport, DriverError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let phases = PhaseTracker::default();

        phases.enter(Phase::WaitingForLedger);
        let ledger = &self.config.ledger;
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Stopped before the trigger service was started");
                return Ok(RunReport {
                    package_id: None,
                    registered: Vec::new(),
                    phases: phases.snapshot(),
                    outcome: Outcome::Interrupted,
                });
            }
            ready = port::wait_for_port(&ledger.host, ledger.port, self.config.ledger_timeout) => {
                ready.map_err(DriverError::at(Phase::WaitingForLedger))?;
            }
        }

        phases.enter(Phase::Starting);
        let mut service = BackgroundProcess::spawn(&self.config.service_argv())
            .map_err(DriverError::at(Phase::Starting))?;

        let result = self.supervise(&mut service, &phases, shutdown).await;

        phases.enter(Phase::Cleanup);
        if let Some(status) = service.shutdown(self.config.shutdown_grace).await {
            debug!("Trigger service pid={} stopped ({})", service.pid(), status);
        }

        result.map(|(startup, outcome)| RunReport {
            package_id: startup.as_ref().map(|s| s.package_id.clone()),
            registered: startup.map(|s| s.registered).unwrap_or_default(),
            phases: phases.snapshot(),
            outcome,
        })
    }

    async fn supervise<F>(
        &self,
        service: &mut BackgroundProcess,
        phases: &PhaseTracker,
        shutdown: std::pin::Pin<&mut F>,
    ) -> Result<(Option<Startup>, Outcome), DriverError>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = shutdown;

        let startup = tokio::select! {
            biased;
            _ = &mut shutdown => return Ok((None, Outcome::Interrupted)),
            exited = service.wait() => {
                let phase = phases.current();
                let status = exited.map_err(|err| DriverError::at(phase)(err.into()))?;
                return Err(DriverError {
                    phase,
                    source: LauncherError::ServiceExited {
                        status,
                        stderr: service.stderr_output(),
                    },
                });
            }
            started = self.start_up(phases) => started?,
        };

        tokio::select! {
            biased;
            _ = &mut shutdown => return Ok((Some(startup), Outcome::Interrupted)),
            _ = tokio::time::sleep(self.config.settle_delay) => {}
        }

        println!("\nPress Ctrl+C to stop...");
        phases.enter(Phase::Running);

        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown => Outcome::Interrupted,
            exited = service.wait() => {
                let status = exited.map_err(|err| DriverError::at(Phase::Running)(err.into()))?;
                let stderr = service.stderr_output();
                error!("Trigger service died unexpectedly ({}):\n{}", status, stderr);
                Outcome::ServiceExited { status, stderr }
            }
        };
        Ok((Some(startup), outcome))
    }

    async fn start_up(&self, phases: &PhaseTracker) -> Result<Startup, DriverError> {
        phases.enter(Phase::WaitingForService);
        let endpoint = &self.config.trigger_service;
        port::wait_for_port(&endpoint.host, endpoint.port, self.config.service_timeout)
            .await
            .map_err(DriverError::at(Phase::WaitingForService))?;

        phases.enter(Phase::ResolvingPackage);
        let package_id = self
            .inspector
            .resolve_package_id(&self.config.dar)
            .await
            .map_err(DriverError::at(Phase::ResolvingPackage))?;
        info!("Resolved package id {} from {}", package_id, self.config.dar.display());

        phases.enter(Phase::Registering);
        let mut registered = Vec::with_capacity(self.config.triggers.len());
        for entry in &self.config.triggers {
            let trigger = self
                .client
                .register_trigger(&entry.party, &package_id, &entry.trigger)
                .await
                .map_err(DriverError::at(Phase::Registering))?;
            registered.push(trigger);
        }
        info!("Registered {} trigger(s)", registered.len());

        Ok(Startup {
            package_id,
            registered,
        })
    }
}
