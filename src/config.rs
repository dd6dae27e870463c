use crate::error::{LauncherError, LauncherResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TRIGGER_SERVICE_PORT: u16 = 8088;
pub const DEFAULT_SANDBOX_PORT: u16 = 6865;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_DAR: &str = "target/bond-issuance-triggers.dar";

pub const READINESS_TIMEOUT_DEFAULT: Duration = Duration::from_secs(30);
pub const PORT_RETRY_INTERVAL: Duration = Duration::from_secs(2);
pub const HTTP_TIMEOUT_DEFAULT: Duration = Duration::from_secs(10);
pub const SETTLE_DELAY_DEFAULT: Duration = Duration::from_secs(3);
pub const SHUTDOWN_GRACE_DEFAULT: Duration = Duration::from_secs(5);

// Lines of trigger-service stderr kept for diagnostics
pub const STDERR_TAIL_LINES: usize = 200;

const BOND_TRIGGERS: &[(&str, &str)] = &[
    ("Bank1", "DA.RefApps.Bond.Triggers.InvestorSettlementTrigger:investorSettlementTrigger"),
    ("Bank1", "DA.RefApps.Bond.Triggers.PlaceBidTrigger:placeBidTrigger"),
    ("Bank2", "DA.RefApps.Bond.Triggers.InvestorSettlementTrigger:investorSettlementTrigger"),
    ("Bank2", "DA.RefApps.Bond.Triggers.PlaceBidTrigger:placeBidTrigger"),
    ("Bank3", "DA.RefApps.Bond.Triggers.InvestorSettlementTrigger:investorSettlementTrigger"),
    ("Bank3", "DA.RefApps.Bond.Triggers.PlaceBidTrigger:placeBidTrigger"),
    ("Issuer", "DA.RefApps.Bond.Triggers.CommissionTrigger:commissionTrigger"),
    ("Issuer", "DA.RefApps.Bond.Triggers.RedemptionFinalizeTrigger:redemptionFinalizeTrigger"),
    ("AuctionAgent", "DA.RefApps.Bond.Triggers.AuctionFinalizeTrigger:auctionFinalizeTrigger"),
    ("Csd", "DA.RefApps.Bond.Triggers.RedemptionCalculationTrigger:redemptionCalculationTrigger"),
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One row of the trigger table: a trigger registered on behalf of a party.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TriggerEntry {
    pub party: String,
    pub trigger: String,
}

impl TriggerEntry {
    pub fn new(party: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            party: party.into(),
            trigger: trigger.into(),
        }
    }
}

/// Everything a launcher run needs. Defaults describe the bond-issuance deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub ledger: Endpoint,
    pub trigger_service: Endpoint,
    pub dar: PathBuf,
    /// Program and leading arguments of the trigger service; ledger and archive flags are appended.
    pub service_command: Vec<String>,
    /// Program and leading arguments of the archive inspector; `inspect-dar --json <dar>` is appended.
    pub inspect_command: Vec<String>,
    #[serde(rename = "ledger_timeout_secs", with = "duration_secs")]
    pub ledger_timeout: Duration,
    #[serde(rename = "service_timeout_secs", with = "duration_secs")]
    pub service_timeout: Duration,
    #[serde(rename = "http_timeout_secs", with = "duration_secs")]
    pub http_timeout: Duration,
    #[serde(rename = "settle_delay_secs", with = "duration_secs")]
    pub settle_delay: Duration,
    #[serde(rename = "shutdown_grace_secs", with = "duration_secs")]
    pub shutdown_grace: Duration,
    pub triggers: Vec<TriggerEntry>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            ledger: Endpoint::new(DEFAULT_HOST, DEFAULT_SANDBOX_PORT),
            trigger_service: Endpoint::new(DEFAULT_HOST, DEFAULT_TRIGGER_SERVICE_PORT),
            dar: PathBuf::from(DEFAULT_DAR),
            service_command: vec!["daml".to_string(), "trigger-service".to_string()],
            inspect_command: vec!["daml".to_string(), "damlc".to_string()],
            ledger_timeout: READINESS_TIMEOUT_DEFAULT,
            service_timeout: READINESS_TIMEOUT_DEFAULT,
            http_timeout: HTTP_TIMEOUT_DEFAULT,
            settle_delay: SETTLE_DELAY_DEFAULT,
            shutdown_grace: SHUTDOWN_GRACE_DEFAULT,
            triggers: BOND_TRIGGERS
                .iter()
                .map(|(party, trigger)| TriggerEntry::new(*party, *trigger))
                .collect(),
        }
    }
}

impl LauncherConfig {
    /// Layer a TOML/JSON/YAML file over the defaults.
    pub fn from_file(path: &Path) -> LauncherResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LauncherResult<()> {
        if !matches!(self.service_command.first(), Some(p) if !p.trim().is_empty()) {
            return Err(LauncherError::Config(
                "service_command must name a program".to_string(),
            ));
        }
        if !matches!(self.inspect_command.first(), Some(p) if !p.trim().is_empty()) {
            return Err(LauncherError::Config(
                "inspect_command must name a program".to_string(),
            ));
        }
        for (index, entry) in self.triggers.iter().enumerate() {
            if entry.party.trim().is_empty() {
                return Err(LauncherError::Config(format!(
                    "trigger #{} has an empty party",
                    index + 1
                )));
            }
            if entry.trigger.trim().is_empty() {
                return Err(LauncherError::Config(format!(
                    "trigger #{} for {} has an empty name",
                    index + 1,
                    entry.party
                )));
            }
        }
        Ok(())
    }

    /// Full argument vector of the trigger service process.
    pub fn service_argv(&self) -> Vec<String> {
        let mut argv = self.service_command.clone();
        argv.extend([
            "--ledger-host".to_string(),
            self.ledger.host.clone(),
            "--ledger-port".to_string(),
            self.ledger.port.to_string(),
            "--wall-clock-time".to_string(),
            "--dar".to_string(),
            self.dar.to_string_lossy().into_owned(),
        ]);
        argv
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_describe_bond_deployment() {
        let config = LauncherConfig::default();
        assert_eq!(config.ledger, Endpoint::new("localhost", 6865));
        assert_eq!(config.trigger_service.http_url(), "http://localhost:8088");
        assert_eq!(config.triggers.len(), 10);
        assert_eq!(config.triggers[0].party, "Bank1");
        assert_eq!(config.triggers[9].party, "Csd");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn service_argv_wires_ledger_and_archive() {
        let mut config = LauncherConfig::default();
        config.ledger.port = 7000;
        assert_eq!(
            config.service_argv(),
            vec![
                "daml",
                "trigger-service",
                "--ledger-host",
                "localhost",
                "--ledger-port",
                "7000",
                "--wall-clock-time",
                "--dar",
                "target/bond-issuance-triggers.dar",
            ]
        );
    }

    #[test]
    fn empty_party_is_rejected() {
        let mut config = LauncherConfig::default();
        config.triggers.push(TriggerEntry::new(" ", "Mod:trig"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("trigger #11"), "{err}");
    }

    #[test]
    fn blank_command_prefixes_are_rejected() {
        let mut config = LauncherConfig::default();
        config.service_command = vec!["  ".to_string(), "trigger-service".to_string()];
        assert!(config.validate().unwrap_err().to_string().contains("service_command"));

        let mut config = LauncherConfig::default();
        config.inspect_command.clear();
        assert!(config.validate().unwrap_err().to_string().contains("inspect_command"));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
dar = "build/app.dar"
service_timeout_secs = 1.5

[trigger_service]
host = "127.0.0.1"
port = 9000

[[triggers]]
party = "Alice"
trigger = "Main:ping"
"#
        )
        .unwrap();

        let config = LauncherConfig::from_file(file.path()).unwrap();
        assert_eq!(config.dar, PathBuf::from("build/app.dar"));
        assert_eq!(config.service_timeout, Duration::from_millis(1500));
        assert_eq!(config.trigger_service, Endpoint::new("127.0.0.1", 9000));
        assert_eq!(config.triggers, vec![TriggerEntry::new("Alice", "Main:ping")]);
        // untouched keys keep their defaults
        assert_eq!(config.ledger_timeout, READINESS_TIMEOUT_DEFAULT);
        assert_eq!(config.ledger, Endpoint::new("localhost", 6865));
    }
}
