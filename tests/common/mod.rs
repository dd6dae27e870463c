#![allow(dead_code)]

use std::net::TcpListener;
use std::path::Path;
use std::time::{Duration, Instant};
use trigger_launcher::config::{Endpoint, LauncherConfig, TriggerEntry};

/// A localhost port nothing listens on (bound once, then released)
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Whether `pid` is a live, non-zombie process
pub fn is_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // state follows the parenthesised command name
        Ok(stat) => match stat.rfind(')') {
            Some(idx) => !matches!(stat[idx + 1..].trim_start().chars().next(), Some('Z' | 'X')),
            None => true,
        },
        Err(_) => false,
    }
}

pub async fn wait_until_stopped(pid: u32, limit: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    !is_running(pid)
}

/// Read a pid written by a fake service script, waiting for it to appear
pub async fn read_pid(path: &Path) -> u32 {
    let started = Instant::now();
    loop {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "pid file {} never written",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn sh(script: impl Into<String>) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.into(), "fake-daml".to_string()]
}

/// Inspector that prints `{"main_package_id": "<id>"}` when called as `inspect-dar --json <dar>`
pub fn inspector_printing(package_id: &str) -> Vec<String> {
    sh(format!(
        r#"test "$1" = inspect-dar && test "$2" = --json && printf '{{"main_package_id": "{package_id}", "other": 1}}'"#
    ))
}

/// Service that records its pid and then sleeps in place
pub fn sleeping_service(pid_file: &Path) -> Vec<String> {
    sh(format!("echo $$ > '{}'; exec sleep 30", pid_file.display()))
}

pub fn endpoint_from(host_with_port: &str) -> Endpoint {
    let (host, port) = host_with_port
        .rsplit_once(':')
        .expect("host:port");
    Endpoint::new(host, port.parse().expect("numeric port"))
}

/// Config with short timeouts pointing at localhost fakes
pub fn test_config(ledger_port: u16, service: Endpoint) -> LauncherConfig {
    LauncherConfig {
        ledger: Endpoint::new("127.0.0.1", ledger_port),
        trigger_service: service,
        dar: "target/test-triggers.dar".into(),
        service_command: sh("exec sleep 30"),
        inspect_command: inspector_printing("pkg1"),
        ledger_timeout: Duration::from_secs(1),
        service_timeout: Duration::from_secs(1),
        http_timeout: Duration::from_secs(5),
        settle_delay: Duration::ZERO,
        shutdown_grace: Duration::from_secs(2),
        triggers: vec![
            TriggerEntry::new("Bank1", "Mod.Trig:first"),
            TriggerEntry::new("Issuer", "Mod.Other:second"),
        ],
    }
}
