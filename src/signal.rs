//! Termination signal capture
//!
//! SIGINT and SIGTERM are turned into a future the driver can select on,
//! so a signal cancels the current wait and control still reaches cleanup.

use std::io;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

pub struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

/// Replace the default disposition of SIGINT and SIGTERM.
///
/// Must run inside a Tokio runtime. From this point on neither signal ends the
/// process abruptly; they are only observed through [`ShutdownSignals::recv`].
pub fn install() -> io::Result<ShutdownSignals> {
    Ok(ShutdownSignals {
        interrupt: signal(SignalKind::interrupt())?,
        terminate: signal(SignalKind::terminate())?,
    })
}

impl ShutdownSignals {
    /// Resolve at the first SIGINT or SIGTERM.
    pub async fn recv(mut self) {
        let name = tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        };
        debug!("Received {}, stopping gracefully...", name);
    }
}
