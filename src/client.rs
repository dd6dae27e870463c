//! Trigger service client
//!
//! Resolves the package id of an archive through the `inspect-dar` command and
//! registers triggers over the service's HTTP API.

use crate::config::Endpoint;
use crate::error::{LauncherError, LauncherResult};
use crate::platform;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

const TRIGGERS_PATH: &str = "/v1/triggers";
const APPLICATION_JSON: &str = "application/json";

/// Body of `POST /v1/triggers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub trigger_name: String,
    pub party: String,
}

impl TriggerRequest {
    pub fn new(package_id: &str, trigger: &str, party: &str) -> Self {
        Self {
            trigger_name: format!("{package_id}:{trigger}"),
            party: party.to_string(),
        }
    }
}

/// A trigger accepted by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTrigger {
    pub party: String,
    pub trigger_name: String,
    /// Instance id reported by the service, when its reply carries one
    pub trigger_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TriggerServiceReply {
    result: Option<TriggerReplyResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerReplyResult {
    trigger_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DarInspection {
    main_package_id: String,
}

/// Runs `<command...> inspect-dar --json <archive>` to read an archive's main package id
#[derive(Debug, Clone)]
pub struct PackageInspector {
    command: Vec<String>,
}

impl PackageInspector {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub async fn resolve_package_id(&self, dar: &Path) -> LauncherResult<String> {
        let (program, prefix) = self
            .command
            .split_first()
            .ok_or_else(|| LauncherError::Config("empty inspect command".to_string()))?;
        let executable = platform::resolve_executable(program)
            .ok_or_else(|| LauncherError::ExecutableNotFound(program.clone()))?;

        debug!("Inspecting {}", dar.display());
        let output = Command::new(executable)
            .args(prefix)
            .arg("inspect-dar")
            .arg("--json")
            .arg(dar)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| LauncherError::Spawn {
                command: format!("{} inspect-dar --json {}", self.command.join(" "), dar.display()),
                source,
            })?;

        if !output.status.success() {
            return Err(LauncherError::Inspection {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        parse_package_id(&output.stdout)
    }
}

fn parse_package_id(stdout: &[u8]) -> LauncherResult<String> {
    let inspection: DarInspection =
        serde_json::from_slice(stdout).map_err(|err| LauncherError::Parse(err.to_string()))?;
    Ok(inspection.main_package_id)
}

pub struct TriggerServiceClient {
    client: Client,
    base_url: String,
}

impl TriggerServiceClient {
    pub fn new(endpoint: &Endpoint, timeout: Duration) -> LauncherResult<Self> {
        Self::with_base_url(endpoint.http_url(), timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> LauncherResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LauncherError::Config(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Register `<package_id>:<trigger>` to run as `party`. Any non-2xx reply is an error.
    pub async fn register_trigger(
        &self,
        party: &str,
        package_id: &str,
        trigger: &str,
    ) -> LauncherResult<RegisteredTrigger> {
        let request = TriggerRequest::new(package_id, trigger, party);
        info!("Starting {} as {}", request.trigger_name, party);

        let transport = |source| LauncherError::RegistrationTransport {
            party: party.to_string(),
            trigger: request.trigger_name.clone(),
            source,
        };

        let response = self
            .client
            .post(self.build_url(TRIGGERS_PATH))
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(LauncherError::Registration {
                party: party.to_string(),
                trigger: request.trigger_name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let trigger_id = serde_json::from_str::<TriggerServiceReply>(&body)
            .ok()
            .and_then(|reply| reply.result)
            .and_then(|result| result.trigger_id);
        if let Some(id) = &trigger_id {
            debug!("{} running as {} with id {}", request.trigger_name, party, id);
        }

        Ok(RegisteredTrigger {
            party: party.to_string(),
            trigger_name: request.trigger_name,
            trigger_id,
        })
    }
}
