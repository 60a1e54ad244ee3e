//! Local-host environment provider.

use crate::exec::ShellExec;
use crate::handler::LocalHandler;
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;
use vprobe_core::handler::HandlerSettings;
use vprobe_core::types::{META_HOSTNAME, META_NAME};
use vprobe_core::{EnvKind, InstanceHandler, Provider, QueryParams};

/// Default provider name.
pub const DEFAULT_NAME: &str = "local";

const HOSTNAME_FILE: &str = "/etc/hostname";
const FALLBACK_HOSTNAME: &str = "localhost";

/// Provides the single instance running on this host.
pub struct LocalProvider {
    name: String,
    settings: HandlerSettings,
    shell: ShellExec,
    hostname: Option<String>,
    hostname_file: PathBuf,
}

impl LocalProvider {
    /// Create a provider named `local`.
    #[must_use]
    pub fn new(settings: HandlerSettings) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            settings,
            shell: ShellExec::default(),
            hostname: None,
            hostname_file: PathBuf::from(HOSTNAME_FILE),
        }
    }

    /// Override the provider name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use a fixed hostname instead of looking it up.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Run commands through another shell.
    #[must_use]
    pub fn with_shell(mut self, shell: ShellExec) -> Self {
        self.shell = shell;
        self
    }

    /// Hostname of this machine.
    ///
    /// Read from `/etc/hostname`, then `$HOSTNAME`, then `localhost`.
    pub async fn hostname(&self) -> String {
        if let Some(hostname) = &self.hostname {
            return hostname.clone();
        }
        match tokio::fs::read_to_string(&self.hostname_file).await {
            Ok(contents) if !contents.trim().is_empty() => return contents.trim().to_string(),
            Ok(_) => {}
            Err(err) => debug!("reading {}: {err}", self.hostname_file.display()),
        }
        std::env::var("HOSTNAME")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string())
    }
}

/// True if one filter set selects the host.
///
/// Only `name` and `hostname` can be satisfied; any other key excludes it.
fn selects_host(query: &QueryParams, hostname: &str) -> bool {
    query
        .iter()
        .all(|(key, value)| matches!(key, META_NAME | META_HOSTNAME) && value == hostname)
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn env(&self) -> EnvKind {
        EnvKind::Local
    }

    async fn query(&self, params: &[QueryParams]) -> Result<Vec<Box<dyn InstanceHandler>>> {
        let hostname = self.hostname().await;
        if !params.is_empty() && !params.iter().any(|query| selects_host(query, &hostname)) {
            debug!(provider = %self.name, %hostname, "host excluded by filters");
            return Ok(Vec::new());
        }

        let handler = LocalHandler::new(hostname, self.shell.clone(), &self.settings);
        Ok(vec![Box::new(handler)])
    }
}
