//! Configuration structures for the probe.
//!
//! This module provides configuration for the environments to search, the
//! control endpoint of every instance and the console conventions used to
//! talk to it. Configuration can be built in code or loaded from JSON.

use crate::types::{
    DEFAULT_CLI_BINARY, DEFAULT_CLI_SOCKET, DEFAULT_CLI_TCP_ADDRESS, DEFAULT_CONTROL_PORT,
    DEFAULT_PROBE_COMMAND,
};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Top-level probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProbeConfig {
    /// Docker engine to query, if any
    #[validate(nested)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerConfig>,

    /// Whether to look for an instance on the local host
    #[serde(default)]
    pub local: bool,

    /// Control endpoint settings
    #[validate(nested)]
    #[serde(default)]
    pub control: ControlConfig,

    /// Console conventions
    #[validate(nested)]
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Console command used as the liveness probe
    #[validate(length(min = 1))]
    #[serde(default = "default_probe_command")]
    pub probe_command: String,
}

fn default_probe_command() -> String {
    DEFAULT_PROBE_COMMAND.to_string()
}

impl ProbeConfig {
    /// Create an empty configuration with no environments enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            docker: None,
            local: false,
            control: ControlConfig::default(),
            console: ConsoleConfig::default(),
            probe_command: default_probe_command(),
        }
    }

    /// Parse and validate a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or validation fails.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::ConfigError(format!("Reading {} failed: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Enable the Docker environment.
    #[must_use]
    pub fn with_docker(mut self, docker: DockerConfig) -> Self {
        self.docker = Some(docker);
        self
    }

    /// Enable or disable the local host environment.
    #[must_use]
    pub const fn with_local(mut self, enabled: bool) -> Self {
        self.local = enabled;
        self
    }

    /// Set control endpoint settings.
    #[must_use]
    pub fn with_control(mut self, control: ControlConfig) -> Self {
        self.control = control;
        self
    }

    /// Set console conventions.
    #[must_use]
    pub fn with_console(mut self, console: ConsoleConfig) -> Self {
        self.console = console;
        self
    }

    /// Set the liveness probe command.
    #[must_use]
    pub fn with_probe_command(mut self, command: impl Into<String>) -> Self {
        self.probe_command = command.into();
        self
    }

    /// True if no environment is enabled.
    #[must_use]
    pub const fn has_no_environment(&self) -> bool {
        self.docker.is_none() && !self.local
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Docker engine endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DockerConfig {
    /// Provider name, unique within a client
    #[validate(length(min = 1))]
    #[serde(default = "default_docker_name")]
    pub name: String,

    /// Engine API base URL (e.g. `http://localhost:2375`)
    #[validate(url)]
    pub host: String,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_docker_name() -> String {
    "docker".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl DockerConfig {
    /// Create a Docker configuration for the given engine URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(host: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            name: default_docker_name(),
            host: host.into(),
            request_timeout_secs: default_request_timeout_secs(),
        };

        config
            .validate()
            .map_err(|e| Error::ConfigError(format!("Invalid docker configuration: {e}")))?;

        Ok(config)
    }

    /// Set the provider name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse the engine URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn parse_host(&self) -> Result<Url, Error> {
        Url::parse(&self.host).map_err(|e| Error::ConfigError(format!("Invalid docker host: {e}")))
    }
}

/// Control endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ControlConfig {
    /// Port of the control endpoint
    #[validate(range(min = 1))]
    #[serde(default = "default_control_port")]
    pub port: u16,

    /// Connect timeout in seconds
    #[validate(range(min = 1, max = 60))]
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

const fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

impl ControlConfig {
    /// Create control settings with defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            port: default_control_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Set the control port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connect timeout in seconds.
    #[must_use]
    pub const fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout_secs = seconds;
        self
    }

    /// Get the connect timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Console conventions inside an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ConsoleConfig {
    /// Console client binary
    #[validate(length(min = 1))]
    #[serde(default = "default_cli_binary")]
    pub binary: String,

    /// CLI socket probed before falling back to TCP
    #[validate(length(min = 1))]
    #[serde(default = "default_cli_socket")]
    pub socket_path: String,

    /// Console address used when the socket is missing
    #[validate(length(min = 1))]
    #[serde(default = "default_cli_tcp_address")]
    pub tcp_address: String,
}

fn default_cli_binary() -> String {
    DEFAULT_CLI_BINARY.to_string()
}

fn default_cli_socket() -> String {
    DEFAULT_CLI_SOCKET.to_string()
}

fn default_cli_tcp_address() -> String {
    DEFAULT_CLI_TCP_ADDRESS.to_string()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            binary: default_cli_binary(),
            socket_path: default_cli_socket(),
            tcp_address: default_cli_tcp_address(),
        }
    }
}
