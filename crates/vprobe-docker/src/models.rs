//! Docker Engine API data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use vprobe_core::QueryParams;

/// Query key matched against container names.
pub const FILTER_NAME: &str = "name";
/// Query key matched against the image a container was created from.
pub const FILTER_IMAGE: &str = "image";

/// Container list filters understood by the Engine API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerListParams {
    /// Filter name to accepted values, e.g. `label` -> `["app=vpp"]`.
    pub filters: BTreeMap<String, Vec<String>>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerListParams {
    /// Translate one set of discovery filters.
    ///
    /// `name` and `image` select by container name and ancestor image, every
    /// other key is matched as a `key=value` label.
    #[must_use]
    pub fn from_query(query: &QueryParams) -> Self {
        let mut params = Self::default();
        for (key, value) in query.iter() {
            let (filter, value) = match key {
                FILTER_NAME => ("name", value.to_string()),
                FILTER_IMAGE => ("ancestor", value.to_string()),
                _ => ("label", format!("{key}={value}")),
            };
            params.add_filter(filter, value);
        }
        params
    }

    /// Add one accepted value for `filter`.
    pub fn add_filter(&mut self, filter: impl Into<String>, value: impl Into<String>) {
        self.filters
            .entry(filter.into())
            .or_default()
            .push(value.into());
    }

    /// Convert into URL query pairs.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.filters.is_empty() {
            // a map of string lists always serializes
            let encoded = serde_json::to_string(&self.filters).unwrap_or_default();
            pairs.push(("filters", encoded));
        }
        if self.all {
            pairs.push(("all", "true".to_string()));
        }
        pairs
    }
}

/// Entry of a container list response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    /// Full container ID.
    pub id: String,
    /// Container names, each with a leading `/`.
    #[serde(default)]
    pub names: Vec<String>,
    /// Image reference the container was created from.
    #[serde(default)]
    pub image: String,
    /// Creation time as a Unix timestamp.
    #[serde(default)]
    pub created: i64,
    /// Lifecycle state (`running`, `exited`, ...).
    #[serde(default)]
    pub state: Option<String>,
    /// Container labels.
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

/// Full container record returned by inspect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    /// Full container ID.
    pub id: String,
    /// Container name with a leading `/`.
    #[serde(default)]
    pub name: String,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Runtime state.
    #[serde(default)]
    pub state: Option<ContainerState>,
    /// Creation-time configuration.
    #[serde(default)]
    pub config: Option<ContainerConfig>,
    /// Network attachments.
    #[serde(default)]
    pub network_settings: Option<NetworkSettings>,
}

impl ContainerInspect {
    /// Name without the leading slash.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }

    /// Image reference from the configuration, empty when unknown.
    #[must_use]
    pub fn image(&self) -> &str {
        self.config
            .as_ref()
            .and_then(|config| config.image.as_deref())
            .unwrap_or_default()
    }

    /// First non-empty IP address across the attached networks.
    ///
    /// Networks are visited in name order.
    #[must_use]
    pub fn ip_address(&self) -> Option<&str> {
        let settings = self.network_settings.as_ref()?;
        settings
            .networks
            .values()
            .filter_map(|endpoint| endpoint.ip_address.as_deref())
            .find(|ip| !ip.is_empty())
    }
}

/// Container runtime state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    /// Status string (`running`, `exited`, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Whether the container is running.
    #[serde(default)]
    pub running: bool,
    /// Main process ID on the host.
    #[serde(default)]
    pub pid: Option<i64>,
}

/// Container creation-time configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    /// Container hostname.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Image reference.
    #[serde(default)]
    pub image: Option<String>,
    /// Container labels.
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

/// Network attachments of a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    /// Attached networks keyed by network name.
    #[serde(default)]
    pub networks: BTreeMap<String, EndpointSettings>,
}

/// Per-network endpoint of a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndpointSettings {
    /// IPv4 address on this network.
    #[serde(rename = "IPAddress", default)]
    pub ip_address: Option<String>,
    /// Gateway of this network.
    #[serde(rename = "Gateway", default)]
    pub gateway: Option<String>,
}

/// Exec instance creation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ExecCreateRequest {
    /// Attach standard input.
    pub attach_stdin: bool,
    /// Attach standard output.
    pub attach_stdout: bool,
    /// Attach standard error.
    pub attach_stderr: bool,
    /// Allocate a pseudo terminal.
    pub tty: bool,
    /// Command and arguments.
    pub cmd: Vec<String>,
}

impl ExecCreateRequest {
    /// Run `command_line` through `sh -c`.
    #[must_use]
    pub fn shell(command_line: &str) -> Self {
        Self {
            attach_stdin: false,
            attach_stdout: false,
            attach_stderr: false,
            tty: false,
            cmd: vec!["sh".into(), "-c".into(), command_line.into()],
        }
    }

    /// Attach standard input.
    #[must_use]
    pub const fn with_stdin(mut self, stdin: bool) -> Self {
        self.attach_stdin = stdin;
        self
    }

    /// Choose which output streams are attached.
    #[must_use]
    pub const fn with_output(mut self, stdout: bool, stderr: bool) -> Self {
        self.attach_stdout = stdout;
        self.attach_stderr = stderr;
        self
    }
}

/// Identifier of a created exec instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ExecCreated {
    /// Exec instance ID.
    pub id: String,
}

/// Exec start request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ExecStartRequest {
    /// Return immediately without attaching.
    pub detach: bool,
    /// Allocate a pseudo terminal.
    pub tty: bool,
}

/// Exec instance state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ExecInspect {
    /// Exec instance ID.
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Whether the process is still running.
    #[serde(default)]
    pub running: bool,
    /// Exit code, set once the process finished.
    #[serde(default)]
    pub exit_code: Option<i64>,
}
