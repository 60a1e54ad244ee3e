//! Uniform remote-control contract for one discovered instance.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{ConsoleConfig, ProbeConfig};
use crate::console::{CliExecutor, ConsoleCli};
use crate::control::{ControlChannel, ControlConnector, TcpConnector};
use crate::error::Result;
use crate::exec::{Command, RemoteExec};
use crate::types::{Metadata, DEFAULT_CONTROL_PORT};

/// Length of the runtime identifier prefix used in instance IDs.
pub const SHORT_ID_LEN: usize = 7;

/// Capability set exposed for one remote instance, whatever its environment.
///
/// Implementations supply identity, their exec transport and control
/// endpoint access; command building and console access are shared.
#[async_trait]
pub trait InstanceHandler: Send + Sync {
    /// Stable short identifier, deterministic for the same instance.
    fn id(&self) -> String;

    /// Static descriptive facts computed when the handler was created.
    fn metadata(&self) -> Metadata;

    /// Environment-native exec transport of the instance.
    fn remote(&self) -> &Arc<dyn RemoteExec>;

    /// Console conventions of the instance.
    fn console(&self) -> &ConsoleConfig;

    /// Build a command bound to this instance. Nothing runs yet.
    fn command(&self, program: &str, args: &[&str]) -> Command<'_> {
        Command::new(self.remote().as_ref(), program, args.iter().copied())
    }

    /// Run a command and return its standard output.
    async fn exec_cmd(&self, program: &str, args: &[&str]) -> Result<String> {
        let out = self.command(program, args).output().await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Console access, over the CLI socket when present and TCP otherwise.
    ///
    /// The socket is probed on every call.
    async fn get_cli(&self) -> Result<Box<dyn CliExecutor>> {
        let cli = ConsoleCli::connect(Arc::clone(self.remote()), self.console()).await;
        Ok(Box::new(cli))
    }

    /// Client for the binary control API over the cached control connection.
    async fn get_api(&self) -> Result<Box<dyn ControlChannel>>;

    /// Client for the statistics feed over the cached control connection.
    async fn get_stats(&self) -> Result<Box<dyn ControlChannel>>;

    /// Release the control connection and mark the handler closed.
    async fn close(&self) -> Result<()>;
}

/// Settings every handler created by a provider shares.
#[derive(Clone)]
pub struct HandlerSettings {
    /// Console conventions of the instances
    pub console: ConsoleConfig,
    /// Port of the control endpoint
    pub control_port: u16,
    /// Opens control connections
    pub connector: Arc<dyn ControlConnector>,
}

impl HandlerSettings {
    /// Default console and control port with the given connector.
    #[must_use]
    pub fn new(connector: Arc<dyn ControlConnector>) -> Self {
        Self {
            console: ConsoleConfig::default(),
            control_port: DEFAULT_CONTROL_PORT,
            connector,
        }
    }

    /// Settings from the probe configuration, with a TCP connector.
    #[must_use]
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            console: config.console.clone(),
            control_port: config.control.port,
            connector: Arc::new(TcpConnector::new(config.control.connect_timeout())),
        }
    }

    /// Set the console conventions.
    #[must_use]
    pub fn with_console(mut self, console: ConsoleConfig) -> Self {
        self.console = console;
        self
    }

    /// Set the control port.
    #[must_use]
    pub const fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }
}

impl std::fmt::Debug for HandlerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSettings")
            .field("console", &self.console)
            .field("control_port", &self.control_port)
            .finish_non_exhaustive()
    }
}

/// Truncate a runtime identifier to at most `len` characters.
#[must_use]
pub fn short_id(id: &str, len: usize) -> &str {
    match id.char_indices().nth(len) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Instance identifier: readable name plus a short runtime id prefix.
#[must_use]
pub fn instance_id(name: &str, runtime_id: &str) -> String {
    format!("{}-{}", name, short_id(runtime_id, SHORT_ID_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_truncates() {
        assert_eq!(short_id("4f2a91c0e7d3b5a8", 7), "4f2a91c");
        assert_eq!(short_id("abc", 7), "abc");
        assert_eq!(short_id("", 7), "");
    }

    #[test]
    fn instance_id_joins_name_and_prefix() {
        assert_eq!(instance_id("vpp1", "4f2a91c0e7d3b5a8"), "vpp1-4f2a91c");
    }

    #[test]
    fn settings_follow_config() {
        let config = ProbeConfig::new().with_control(crate::config::ControlConfig::new().with_port(9292));
        let settings = HandlerSettings::from_config(&config);
        assert_eq!(settings.control_port, 9292);
        assert_eq!(settings.console, ConsoleConfig::default());
    }

    #[test]
    fn same_name_different_runtime_ids_do_not_collide() {
        let a = instance_id("vpp", "4f2a91c0e7d3");
        let b = instance_id("vpp", "9b1e22d07a44");
        assert_ne!(a, b);
    }
}
