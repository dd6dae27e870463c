//! TCP readiness probing
//!
//! Polls an endpoint until it accepts a connection or the deadline passes.

use crate::config::PORT_RETRY_INTERVAL;
use crate::error::{LauncherError, LauncherResult};
use std::io;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Block until `host:port` accepts a TCP connection, retrying every two seconds.
pub async fn wait_for_port(host: &str, port: u16, timeout: Duration) -> LauncherResult<()> {
    wait_for_port_with_interval(host, port, timeout, PORT_RETRY_INTERVAL).await
}

pub async fn wait_for_port_with_interval(
    host: &str,
    port: u16,
    timeout: Duration,
    interval: Duration,
) -> LauncherResult<()> {
    let started = Instant::now();
    loop {
        // an attempt never outlives the deadline
        let budget = timeout.saturating_sub(started.elapsed());
        match probe(host, port, budget).await {
            Ok(()) => {
                info!("Port is open");
                return Ok(());
            }
            Err(err) => {
                if started.elapsed() >= timeout {
                    return Err(LauncherError::timeout(host, port, timeout, Some(err)));
                }
                debug!("Probe of {}:{} failed: {}", host, port, err);
                info!("Waiting for port {}...", port);
                tokio::time::sleep(interval).await;
            }
        }
    }
}

async fn probe(host: &str, port: u16, budget: Duration) -> io::Result<()> {
    match tokio::time::timeout(budget, TcpStream::connect((host, port))).await {
        // the stream is dropped straight away, this is only a reachability check
        Ok(result) => result.map(drop),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {host}:{port} timed out"),
        )),
    }
}
