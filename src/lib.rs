//! Trigger Launcher Library
//!
//! Starts a trigger service next to a running ledger, registers a table of
//! triggers against it and supervises the service process until shutdown.

pub mod client;
pub mod commands;
pub mod config;
pub mod driver;
pub mod error;
pub mod platform;
pub mod port;
pub mod signal;
pub mod supervisor;
pub mod utils;

// Re-export commonly used types for convenience
pub use client::{PackageInspector, RegisteredTrigger, TriggerRequest, TriggerServiceClient};
pub use config::{Endpoint, LauncherConfig, TriggerEntry};
pub use driver::{DriverError, Orchestrator, Outcome, Phase, RunReport};
pub use error::{LauncherError, LauncherResult};
pub use port::wait_for_port;
pub use supervisor::BackgroundProcess;
