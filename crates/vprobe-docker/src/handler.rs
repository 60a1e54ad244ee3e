//! Handler for an instance running in a Docker container.

use crate::client::DockerClient;
use crate::models::{ContainerInspect, ExecCreateRequest};
use crate::Result;
use async_trait::async_trait;
use std::future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};
use vprobe_core::config::ConsoleConfig;
use vprobe_core::control::{ConnectionCache, ControlChannel, ControlConnection};
use vprobe_core::exec::{ExecStreams, RemoteExec};
use vprobe_core::handler::{instance_id, short_id, HandlerSettings};
use vprobe_core::types::{
    EnvKind, META_CONTAINER, META_CREATED, META_ENV, META_ID, META_IMAGE, META_NAME,
};
use vprobe_core::{Error, InstanceHandler, Metadata};

/// Length of the container ID kept in metadata.
pub const METADATA_ID_LEN: usize = 12;

/// Layout of the `created` metadata value.
pub const CREATED_FORMAT: &str = "%a %b %e %H:%M:%S %Z %Y";

/// Remote control of one container.
pub struct ContainerHandler {
    container: ContainerInspect,
    id: String,
    metadata: Metadata,
    remote: Arc<dyn RemoteExec>,
    console: ConsoleConfig,
    control_port: u16,
    connection: ConnectionCache,
}

impl ContainerHandler {
    /// Create a handler for an inspected container.
    #[must_use]
    pub fn new(client: DockerClient, container: ContainerInspect, settings: &HandlerSettings) -> Self {
        let id = instance_id(container.display_name(), &container.id);
        let metadata = container_metadata(&container);
        let remote = Arc::new(ContainerExec {
            client,
            container_id: container.id.clone(),
        });

        Self {
            container,
            id,
            metadata,
            remote,
            console: settings.console.clone(),
            control_port: settings.control_port,
            connection: ConnectionCache::new(Arc::clone(&settings.connector)),
        }
    }

    /// The inspected container record.
    #[must_use]
    pub fn container(&self) -> &ContainerInspect {
        &self.container
    }

    /// Control endpoint address: first network address plus the control port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the container has no network address.
    pub fn control_addr(&self) -> Result<SocketAddr> {
        let ip = self.container.ip_address().ok_or_else(|| {
            Error::NotFound(format!("container {} has no network address", self.id))
        })?;
        let ip: IpAddr = ip
            .parse()
            .map_err(|err| Error::InvalidEndpoint(format!("{ip}: {err}")))?;
        Ok(SocketAddr::new(ip, self.control_port))
    }

    async fn control_connection(&self) -> Result<Arc<dyn ControlConnection>> {
        self.connection
            .get_or_connect(|| future::ready(self.control_addr()))
            .await
    }
}

#[async_trait]
impl InstanceHandler for ContainerHandler {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn remote(&self) -> &Arc<dyn RemoteExec> {
        &self.remote
    }

    fn console(&self) -> &ConsoleConfig {
        &self.console
    }

    async fn get_api(&self) -> Result<Box<dyn ControlChannel>> {
        let conn = self.control_connection().await?;
        conn.api_client().map_err(|err| {
            warn!(instance = %self.id, "binary API client unavailable: {err}");
            err
        })
    }

    async fn get_stats(&self) -> Result<Box<dyn ControlChannel>> {
        let conn = self.control_connection().await?;
        conn.stats_client().map_err(|err| {
            warn!(instance = %self.id, "stats client unavailable: {err}");
            err
        })
    }

    async fn close(&self) -> Result<()> {
        if self.connection.close().await {
            debug!(instance = %self.id, "control connection released");
        }
        Ok(())
    }
}

fn container_metadata(container: &ContainerInspect) -> Metadata {
    let name = container.display_name();
    Metadata::from([
        (META_ENV.to_string(), EnvKind::Docker.name().to_string()),
        (META_NAME.to_string(), name.to_string()),
        (META_CONTAINER.to_string(), name.to_string()),
        (
            META_ID.to_string(),
            short_id(&container.id, METADATA_ID_LEN).to_string(),
        ),
        (META_IMAGE.to_string(), container.image().to_string()),
        (
            META_CREATED.to_string(),
            container.created.format(CREATED_FORMAT).to_string(),
        ),
    ])
}

/// Runs commands through exec instances of one container.
struct ContainerExec {
    client: DockerClient,
    container_id: String,
}

#[async_trait]
impl RemoteExec for ContainerExec {
    async fn exec(&self, command_line: &str, streams: ExecStreams<'_>) -> Result<()> {
        let ExecStreams {
            stdin,
            stdout,
            stderr,
        } = streams;

        let request = ExecCreateRequest::shell(command_line)
            .with_stdin(stdin.is_some())
            .with_output(stdout.is_some(), stderr.is_some());
        let exec = self.client.create_exec(&self.container_id, &request).await?;
        debug!(container = %self.container_id, exec = %exec.id, "exec created");

        match stdin {
            Some(input) => {
                self.client
                    .start_exec_with_stdin(&exec.id, input, stdout, stderr)
                    .await?;
            }
            None => self.client.start_exec(&exec.id, stdout, stderr).await?,
        }

        match self.client.wait_exec(&exec.id).await? {
            0 => Ok(()),
            code => Err(Error::ExitStatus { code }),
        }
    }
}
