//! Control endpoint connections.
//!
//! Every instance serves its binary API and its statistics feed behind one
//! TCP control endpoint. A handler keeps at most one connection to it in a
//! [`ConnectionCache`]; API and stats clients are derived from that shared
//! connection.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};

/// Largest reply frame accepted from a control endpoint.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Request/response channel to one remote control service.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Send one opaque request and wait for its reply.
    async fn request(&self, payload: Bytes) -> Result<Bytes>;
}

/// An established connection to an instance's control endpoint.
pub trait ControlConnection: Send + Sync {
    /// Derive a client for the binary control API.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote does not expose the API.
    fn api_client(&self) -> Result<Box<dyn ControlChannel>>;

    /// Derive a client for the statistics feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote does not expose the feed.
    fn stats_client(&self) -> Result<Box<dyn ControlChannel>>;
}

/// Opens connections to control endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlConnector: Send + Sync {
    /// Connect to the control endpoint at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] if the endpoint is unreachable.
    async fn connect(&self, addr: SocketAddr) -> Result<Arc<dyn ControlConnection>>;
}

enum ConnectionState {
    Unconnected,
    Connected(Arc<dyn ControlConnection>),
    Closed,
}

/// Lazily established, memoized control connection of one handler.
///
/// Connection setup is single-flight: concurrent callers wait for the first
/// attempt and share its connection. A failed attempt leaves the cache
/// unconnected.
pub struct ConnectionCache {
    connector: Arc<dyn ControlConnector>,
    state: Mutex<ConnectionState>,
}

impl ConnectionCache {
    /// Create an unconnected cache.
    #[must_use]
    pub fn new(connector: Arc<dyn ControlConnector>) -> Self {
        Self {
            connector,
            state: Mutex::new(ConnectionState::Unconnected),
        }
    }

    /// Return the cached connection, connecting first if needed.
    ///
    /// `resolve` computes the control endpoint address and is only invoked
    /// when a connection has to be opened.
    ///
    /// # Errors
    ///
    /// Returns the resolution or connection error, or
    /// [`Error::HandlerClosed`] after [`ConnectionCache::close`].
    pub async fn get_or_connect<F, Fut>(&self, resolve: F) -> Result<Arc<dyn ControlConnection>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<SocketAddr>> + Send,
    {
        let mut state = self.state.lock().await;
        match &*state {
            ConnectionState::Connected(conn) => return Ok(Arc::clone(conn)),
            ConnectionState::Closed => {
                return Err(Error::HandlerClosed(
                    "control connection already released".to_string(),
                ))
            }
            ConnectionState::Unconnected => {}
        }

        let addr = resolve().await?;
        debug!(%addr, "connecting to control endpoint");
        let conn = self.connector.connect(addr).await?;
        *state = ConnectionState::Connected(Arc::clone(&conn));
        Ok(conn)
    }

    /// True while a connection is cached.
    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.lock().await, ConnectionState::Connected(_))
    }

    /// Drop the cached connection and refuse new ones.
    ///
    /// Returns true if a connection was released. Calling it again is a no-op.
    pub async fn close(&self) -> bool {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, ConnectionState::Closed);
        matches!(previous, ConnectionState::Connected(_))
    }
}

/// Remote service addressed by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlService {
    /// Binary control API
    BinaryApi = 1,
    /// Statistics feed
    Stats = 2,
}

/// Connector opening plain TCP connections with a connect deadline.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector with the given connect timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl ControlConnector for TcpConnector {
    async fn connect(&self, addr: SocketAddr) -> Result<Arc<dyn ControlConnection>> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                Error::ConnectionFailed(format!(
                    "{addr}: timed out after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|err| Error::ConnectionFailed(format!("{addr}: {err}")))?;
        stream.set_nodelay(true)?;

        Ok(Arc::new(TcpConnection {
            stream: Arc::new(Mutex::new(SharedStream {
                stream,
                in_flight: false,
            })),
        }))
    }
}

/// The socket plus whether an exchange on it was left unfinished.
///
/// An exchange whose caller is dropped between request and reply leaves
/// the reply unread; the stream is out of sync from then on.
struct SharedStream {
    stream: TcpStream,
    in_flight: bool,
}

struct TcpConnection {
    stream: Arc<Mutex<SharedStream>>,
}

impl ControlConnection for TcpConnection {
    fn api_client(&self) -> Result<Box<dyn ControlChannel>> {
        Ok(Box::new(FramedChannel {
            service: ControlService::BinaryApi,
            stream: Arc::clone(&self.stream),
        }))
    }

    fn stats_client(&self) -> Result<Box<dyn ControlChannel>> {
        Ok(Box::new(FramedChannel {
            service: ControlService::Stats,
            stream: Arc::clone(&self.stream),
        }))
    }
}

// Request: [service:u8][len:u32 BE][payload]. Reply: [len:u32 BE][payload].
struct FramedChannel {
    service: ControlService,
    stream: Arc<Mutex<SharedStream>>,
}

#[async_trait]
impl ControlChannel for FramedChannel {
    async fn request(&self, payload: Bytes) -> Result<Bytes> {
        let len = u32::try_from(payload.len())
            .map_err(|_| Error::InvalidRequest(format!("frame of {} bytes", payload.len())))?;

        let mut frame = BytesMut::with_capacity(payload.len() + 5);
        frame.put_u8(self.service as u8);
        frame.put_u32(len);
        frame.put_slice(&payload);

        let mut shared = self.stream.lock().await;
        if shared.in_flight {
            return Err(Error::ConnectionFailed(
                "control stream out of sync after an abandoned request".to_string(),
            ));
        }
        shared.in_flight = true;

        let stream = &mut shared.stream;
        stream.write_all(&frame).await?;
        stream.flush().await?;

        let reply_len = stream.read_u32().await? as usize;
        if reply_len > MAX_FRAME_LEN {
            return Err(Error::ParseError(format!(
                "reply frame of {reply_len} bytes exceeds {MAX_FRAME_LEN}"
            )));
        }
        let mut reply = vec![0u8; reply_len];
        stream.read_exact(&mut reply).await?;

        shared.in_flight = false;
        Ok(Bytes::from(reply))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use tokio::net::TcpListener;

    pub(crate) struct NullConnection;

    impl ControlConnection for NullConnection {
        fn api_client(&self) -> Result<Box<dyn ControlChannel>> {
            Err(Error::NotImplemented("binary api".to_string()))
        }

        fn stats_client(&self) -> Result<Box<dyn ControlChannel>> {
            Err(Error::NotImplemented("stats".to_string()))
        }
    }

    fn control_addr() -> SocketAddr {
        "172.17.0.2:9191".parse().unwrap()
    }

    async fn resolved() -> Result<SocketAddr> {
        Ok(control_addr())
    }

    async fn unresolvable() -> Result<SocketAddr> {
        Err(Error::NotFound("no address".to_string()))
    }

    fn connector_expecting(times: usize) -> Arc<dyn ControlConnector> {
        let mut connector = MockControlConnector::new();
        connector
            .expect_connect()
            .with(eq(control_addr()))
            .times(times)
            .returning(|_| Ok(Arc::new(NullConnection) as Arc<dyn ControlConnection>));
        Arc::new(connector)
    }

    #[tokio::test]
    async fn get_or_connect_connects_once() {
        let cache = ConnectionCache::new(connector_expecting(1));
        let first = cache.get_or_connect(resolved).await.unwrap();
        // a second resolution would fail the call
        let second = cache.get_or_connect(unresolvable).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.is_connected().await);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_attempt() {
        let cache = ConnectionCache::new(connector_expecting(1));
        let (a, b) = tokio::join!(
            cache.get_or_connect(resolved),
            cache.get_or_connect(resolved),
        );
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn failed_attempt_is_not_memoized() {
        let mut seq = Sequence::new();
        let mut connector = MockControlConnector::new();
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(Error::ConnectionFailed("refused".to_string())));
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Arc::new(NullConnection) as Arc<dyn ControlConnection>));

        let cache = ConnectionCache::new(Arc::new(connector));
        let err = cache.get_or_connect(resolved).await.err().unwrap();
        assert!(matches!(err, Error::ConnectionFailed(_)));
        assert!(!cache.is_connected().await);

        assert!(cache.get_or_connect(resolved).await.is_ok());
    }

    #[tokio::test]
    async fn resolution_error_skips_connect() {
        let cache = ConnectionCache::new(connector_expecting(0));
        let err = cache.get_or_connect(unresolvable).await.err().unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn close_without_connection_is_harmless() {
        let cache = ConnectionCache::new(connector_expecting(0));
        assert!(!cache.close().await);
        assert!(!cache.close().await);
    }

    #[tokio::test]
    async fn close_releases_and_blocks_reconnect() {
        let cache = ConnectionCache::new(connector_expecting(1));
        cache.get_or_connect(resolved).await.unwrap();
        assert!(cache.close().await);
        assert!(!cache.is_connected().await);

        let err = cache.get_or_connect(resolved).await.err().unwrap();
        assert!(matches!(err, Error::HandlerClosed(_)));
    }

    #[tokio::test]
    async fn tcp_connector_frames_requests_per_service() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            for _ in 0..2 {
                let service = socket.read_u8().await.unwrap();
                let len = socket.read_u32().await.unwrap() as usize;
                let mut payload = vec![0u8; len];
                socket.read_exact(&mut payload).await.unwrap();

                let mut reply = vec![service];
                reply.extend_from_slice(&payload);
                socket.write_u32(reply.len() as u32).await.unwrap();
                socket.write_all(&reply).await.unwrap();
            }
        });

        let conn = TcpConnector::new(Duration::from_secs(2))
            .connect(addr)
            .await
            .unwrap();

        let api = conn.api_client().unwrap();
        let reply = api.request(Bytes::from_static(b"show_version")).await.unwrap();
        assert_eq!(&reply[..], b"\x01show_version");

        let stats = conn.stats_client().unwrap();
        let reply = stats.request(Bytes::from_static(b"/if/names")).await.unwrap();
        assert_eq!(&reply[..], b"\x02/if/names");
    }

    #[tokio::test]
    async fn abandoned_request_fails_later_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _service = socket.read_u8().await.unwrap();
            let len = socket.read_u32().await.unwrap() as usize;
            let mut payload = vec![0u8; len];
            socket.read_exact(&mut payload).await.unwrap();

            tokio::time::sleep(Duration::from_millis(200)).await;
            socket.write_u32(payload.len() as u32).await.unwrap();
            socket.write_all(&payload).await.unwrap();

            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
        });

        let conn = TcpConnector::new(Duration::from_secs(2))
            .connect(addr)
            .await
            .unwrap();
        let api = conn.api_client().unwrap();
        let stats = conn.stats_client().unwrap();

        let abandoned = timeout(
            Duration::from_millis(50),
            api.request(Bytes::from_static(b"show_version")),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let err = stats
            .request(Bytes::from_static(b"/if/names"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn tcp_connector_reports_unreachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpConnector::new(Duration::from_secs(2))
            .connect(addr)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }
}
