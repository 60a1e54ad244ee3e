//! Handler for an instance running directly on this host.

use crate::exec::ShellExec;
use crate::Result;
use async_trait::async_trait;
use std::future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};
use vprobe_core::config::ConsoleConfig;
use vprobe_core::control::{ConnectionCache, ControlChannel, ControlConnection};
use vprobe_core::exec::RemoteExec;
use vprobe_core::handler::HandlerSettings;
use vprobe_core::types::{EnvKind, META_ENV, META_HOSTNAME, META_NAME};
use vprobe_core::{InstanceHandler, Metadata};

/// Remote control of the instance on the local host.
pub struct LocalHandler {
    hostname: String,
    metadata: Metadata,
    remote: Arc<dyn RemoteExec>,
    console: ConsoleConfig,
    control_addr: SocketAddr,
    connection: ConnectionCache,
}

impl LocalHandler {
    /// Create a handler for the host named `hostname`.
    #[must_use]
    pub fn new(hostname: impl Into<String>, exec: ShellExec, settings: &HandlerSettings) -> Self {
        let hostname = hostname.into();
        let metadata = Metadata::from([
            (META_ENV.to_string(), EnvKind::Local.name().to_string()),
            (META_NAME.to_string(), hostname.clone()),
            (META_HOSTNAME.to_string(), hostname.clone()),
        ]);

        Self {
            hostname,
            metadata,
            remote: Arc::new(exec),
            console: settings.console.clone(),
            control_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, settings.control_port)),
            connection: ConnectionCache::new(Arc::clone(&settings.connector)),
        }
    }

    /// Loopback address of the control endpoint.
    #[must_use]
    pub const fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    async fn control_connection(&self) -> Result<Arc<dyn ControlConnection>> {
        let addr = self.control_addr;
        self.connection
            .get_or_connect(move || future::ready(Ok(addr)))
            .await
    }
}

#[async_trait]
impl InstanceHandler for LocalHandler {
    fn id(&self) -> String {
        self.hostname.clone()
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
            warn!(instance = %self.hostname, "binary API client unavailable: {err}");
            err
        })
    }

    async fn get_stats(&self) -> Result<Box<dyn ControlChannel>> {
        let conn = self.control_connection().await?;
        conn.stats_client().map_err(|err| {
            warn!(instance = %self.hostname, "stats client unavailable: {err}");
            err
        })
    }

    async fn close(&self) -> Result<()> {
        if self.connection.close().await {
            debug!(instance = %self.hostname, "control connection released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use vprobe_core::control::TcpConnector;
    use vprobe_core::Error;

    /// Control endpoint answering every request frame with its payload.
    async fn spawn_echo() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            while socket.read_u8().await.is_ok() {
                let len = socket.read_u32().await.unwrap();
                let mut payload = vec![0u8; len as usize];
                socket.read_exact(&mut payload).await.unwrap();
                socket.write_u32(len).await.unwrap();
                socket.write_all(&payload).await.unwrap();
            }
        });
        port
    }

    fn settings(port: u16) -> HandlerSettings {
        HandlerSettings::new(Arc::new(TcpConnector::new(Duration::from_secs(1))))
            .with_control_port(port)
    }

    #[test]
    fn identity_and_metadata() {
        let handler = LocalHandler::new("edge-01", ShellExec::default(), &settings(9191));
        assert_eq!(handler.id(), "edge-01");
        assert_eq!(handler.metadata()[META_ENV], "local");
        assert_eq!(handler.metadata()[META_HOSTNAME], "edge-01");
        assert_eq!(handler.control_addr().to_string(), "127.0.0.1:9191");
    }

    #[tokio::test]
    async fn api_and_stats_share_one_connection() {
        let port = spawn_echo().await;
        let handler = LocalHandler::new("edge-01", ShellExec::default(), &settings(port));

        let api = handler.get_api().await.unwrap();
        let stats = handler.get_stats().await.unwrap();

        // the echo endpoint accepts a single connection
        let reply = api.request(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(&reply[..], b"ping");
        let reply = stats.request(Bytes::from_static(b"stats")).await.unwrap();
        assert_eq!(&reply[..], b"stats");
    }

    #[tokio::test]
    async fn closed_handler_refuses_control_access() {
        let handler = LocalHandler::new("edge-01", ShellExec::default(), &settings(1));
        handler.close().await.unwrap();
        handler.close().await.unwrap();
        assert!(matches!(
            handler.get_api().await.err().unwrap(),
            Error::HandlerClosed(_)
        ));
    }

    #[tokio::test]
    async fn exec_cmd_runs_on_host() {
        let handler = LocalHandler::new("edge-01", ShellExec::default(), &settings(9191));
        let out = handler.exec_cmd("echo", &["vpp"]).await.unwrap();
        assert_eq!(out, "vpp\n");
    }
}
