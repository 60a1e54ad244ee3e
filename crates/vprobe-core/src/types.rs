//! Core probe domain types.
//!
//! Environment kinds, instance metadata and the well-known locations at which
//! a VPP instance exposes its console and control endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Port of the control endpoint serving the binary API and stats feed.
pub const DEFAULT_CONTROL_PORT: u16 = 9191;
/// CLI socket path inside the instance.
pub const DEFAULT_CLI_SOCKET: &str = "/run/vpp/cli.sock";
/// Console address used when the CLI socket is not reachable.
pub const DEFAULT_CLI_TCP_ADDRESS: &str = "localhost:5002";
/// Console client binary inside the instance.
pub const DEFAULT_CLI_BINARY: &str = "/usr/bin/vppctl";
/// Console command used as the liveness probe.
pub const DEFAULT_PROBE_COMMAND: &str = "show version";

/// Metadata key: environment kind.
pub const META_ENV: &str = "env";
/// Metadata key: human readable instance name.
pub const META_NAME: &str = "name";
/// Metadata key: container name.
pub const META_CONTAINER: &str = "container";
/// Metadata key: short runtime identifier.
pub const META_ID: &str = "id";
/// Metadata key: image reference.
pub const META_IMAGE: &str = "image";
/// Metadata key: creation time.
pub const META_CREATED: &str = "created";
/// Metadata key: host name.
pub const META_HOSTNAME: &str = "hostname";

/// Static descriptive facts about an instance, ordered by key.
pub type Metadata = BTreeMap<String, String>;

/// Kind of environment an instance runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvKind {
    /// Processes on the local host
    Local,
    /// Containers managed by a Docker engine
    Docker,
}

impl EnvKind {
    /// Returns the environment name as a string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Docker => "docker",
        }
    }

    /// Returns all supported environments.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Local, Self::Docker]
    }
}

impl FromStr for EnvKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "docker" => Ok(Self::Docker),
            _ => Err(Error::ConfigError(format!("Unknown environment: {s}"))),
        }
    }
}

impl std::fmt::Display for EnvKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
