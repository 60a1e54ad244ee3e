//! Interactive console access.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

use crate::config::ConsoleConfig;
use crate::error::Result;
use crate::exec::{Command, RemoteExec};

/// Maps one console command to its text response.
#[async_trait]
pub trait CliExecutor: Send + Sync {
    /// Run a console command and return its output.
    async fn run_cli(&self, command: &str) -> Result<String>;
}

/// Console client invoked through an instance's exec transport.
///
/// The transport to the console (CLI socket or TCP) is chosen when the
/// executor is created.
pub struct ConsoleCli {
    exec: Arc<dyn RemoteExec>,
    binary: String,
    args: Vec<String>,
}

impl ConsoleCli {
    /// Probe the CLI socket and build an executor for the reachable console.
    pub async fn connect(exec: Arc<dyn RemoteExec>, console: &ConsoleConfig) -> Self {
        let mut args = Vec::new();
        let probe = Command::new(exec.as_ref(), "ls", [console.socket_path.as_str()])
            .run()
            .await;
        if let Err(err) = probe {
            args.push("-s".to_string());
            args.push(console.tcp_address.clone());
            trace!("checking cli socket error: {err}, using flags {args:?} for console");
        }

        Self {
            exec,
            binary: console.binary.clone(),
            args,
        }
    }

    /// True when the console is addressed over TCP.
    #[must_use]
    pub fn uses_tcp(&self) -> bool {
        !self.args.is_empty()
    }
}

#[async_trait]
impl CliExecutor for ConsoleCli {
    async fn run_cli(&self, command: &str) -> Result<String> {
        let out = Command::new(self.exec.as_ref(), self.binary.as_str(), self.args.iter().cloned())
            .arg(command)
            .output()
            .await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}
