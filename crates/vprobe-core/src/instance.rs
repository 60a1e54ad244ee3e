//! Validated, ready-to-use instances.

use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::InstanceHandler;
use crate::types::Metadata;

/// A handler that passed its liveness probe.
pub struct Instance {
    handler: Box<dyn InstanceHandler>,
    version: String,
}

impl Instance {
    /// Probe the handler's console with `probe_command` and wrap it.
    ///
    /// On failure the handler is closed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProbeFailed`] if the console is unreachable or the
    /// probe produces no output.
    pub async fn new(handler: Box<dyn InstanceHandler>, probe_command: &str) -> Result<Self> {
        match probe(handler.as_ref(), probe_command).await {
            Ok(version) => Ok(Self { handler, version }),
            Err(err) => {
                let id = handler.id();
                if let Err(close_err) = handler.close().await {
                    debug!(instance = %id, "closing handler failed: {close_err}");
                }
                Err(Error::ProbeFailed(format!("{id}: {err}")))
            }
        }
    }

    /// Identifier of the underlying handler.
    #[must_use]
    pub fn id(&self) -> String {
        self.handler.id()
    }

    /// Metadata of the underlying handler.
    #[must_use]
    pub fn metadata(&self) -> Metadata {
        self.handler.metadata()
    }

    /// Engine version reported by the liveness probe.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The wrapped handler.
    #[must_use]
    pub fn handler(&self) -> &dyn InstanceHandler {
        self.handler.as_ref()
    }

    /// Run a console command on the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the console is unreachable or the command fails.
    pub async fn run_cli(&self, command: &str) -> Result<String> {
        let cli = self.handler.get_cli().await?;
        cli.run_cli(command).await
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.handler.id())
            .field("version", &self.version)
            .finish()
    }
}

async fn probe(handler: &dyn InstanceHandler, probe_command: &str) -> Result<String> {
    let cli = handler.get_cli().await?;
    let reply = cli.run_cli(probe_command).await?;
    let version = reply.trim();
    if version.is_empty() {
        return Err(Error::ProbeFailed(format!(
            "empty reply to `{probe_command}`"
        )));
    }
    Ok(version.to_string())
}
