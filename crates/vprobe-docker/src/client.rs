//! Asynchronous Docker Engine API client.

use crate::models::{
    ContainerInspect, ContainerListParams, ContainerSummary, ExecCreateRequest, ExecCreated,
    ExecInspect, ExecStartRequest,
};
use crate::stream::{StreamDemuxer, StreamKind};
use crate::Result;
use reqwest::header::{CONNECTION, UPGRADE};
use reqwest::{Client, ClientBuilder, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};
use url::Url;
use vprobe_core::config::DockerConfig;
use vprobe_core::Error;

const USER_AGENT: &str = concat!("vprobe-docker/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT: u64 = 30;

/// Delay between exec state polls while a process is still running.
const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(50);

const READ_BUF_LEN: usize = 8 * 1024;

const TCP_SCHEME_PREFIX: &str = "tcp://";

/// Conventional port of a TLS-protected engine.
const DOCKER_TLS_PORT: u16 = 2376;

/// Builder for [`DockerClient`].
#[derive(Debug, Clone)]
pub struct DockerClientBuilder {
    base_url: Url,
    timeout: Duration,
    connect_timeout: Duration,
}

impl DockerClientBuilder {
    /// Create a new builder for the engine at `base_url`.
    ///
    /// The URL should include the protocol and host (e.g. `http://localhost:2375`).
    /// A `tcp://` host as found in `DOCKER_HOST` is served over `https` on the
    /// TLS port 2376 and over `http` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for an unparsable URL or a scheme other
    /// than `http`, `https` or `tcp`.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let url = engine_url(base_url.as_ref())?;

        Ok(Self {
            base_url: url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            connect_timeout: Duration::from_secs(10),
        })
    }

    /// Create a builder from the Docker section of the probe configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the host is not a usable URL.
    pub fn from_config(config: &DockerConfig) -> Result<Self> {
        Ok(Self::new(&config.host)?.with_timeout(config.timeout()))
    }

    /// Override the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the HTTP client cannot be built.
    pub fn build(self) -> Result<DockerClient> {
        let http = ClientBuilder::new()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("Failed to build Docker HTTP client: {err}"))
            })?;

        Ok(DockerClient {
            http,
            base_url: self.base_url,
            timeout: self.timeout,
        })
    }
}

/// Asynchronous Docker Engine API client.
#[derive(Debug, Clone)]
pub struct DockerClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

impl DockerClient {
    /// Create a new client for the given engine URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the URL is not usable.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        DockerClientBuilder::new(base_url)?.build()
    }

    /// Access the engine base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the engine answers.
    ///
    /// # Errors
    ///
    /// Returns the transport or status error.
    pub async fn ping(&self) -> Result<()> {
        let response = self.send(Method::GET, "_ping", Option::<&()>::None, &[]).await?;
        check_status(response, "_ping").await.map(drop)
    }

    /// List running containers matching `params`.
    ///
    /// # Errors
    ///
    /// Returns the transport, status or parse error.
    pub async fn list_containers(
        &self,
        params: &ContainerListParams,
    ) -> Result<Vec<ContainerSummary>> {
        self.get_json("containers/json", &params.to_pairs()).await
    }

    /// Fetch the full record of one container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown container.
    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        let path = format!("containers/{id}/json");
        self.get_json(&path, &[]).await
    }

    /// Create an exec instance in a container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown container.
    pub async fn create_exec(
        &self,
        container_id: &str,
        request: &ExecCreateRequest,
    ) -> Result<ExecCreated> {
        let path = format!("containers/{container_id}/exec");
        self.send_json(Method::POST, &path, Some(request), &[]).await
    }

    /// Start an exec instance and copy its attached output to the sinks.
    ///
    /// Frames for a stream without a sink are discarded.
    ///
    /// # Errors
    ///
    /// Returns the transport, status or framing error, or the I/O error of a
    /// sink.
    pub async fn start_exec<'w>(
        &self,
        exec_id: &str,
        mut stdout: Option<&mut (dyn AsyncWrite + Send + Unpin + 'w)>,
        mut stderr: Option<&mut (dyn AsyncWrite + Send + Unpin + 'w)>,
    ) -> Result<()> {
        let path = format!("exec/{exec_id}/start");
        let body = ExecStartRequest::default();
        let response = self.send(Method::POST, &path, Some(&body), &[]).await?;
        let mut response = check_status(response, &path).await?;

        let mut demux = StreamDemuxer::new();
        while let Some(chunk) = response.chunk().await? {
            demux.push(&chunk);
            drain_frames(exec_id, &mut demux, &mut stdout, &mut stderr).await?;
        }
        demux.finish()?;

        flush_sinks(stdout, stderr).await
    }

    /// Start an exec instance created with stdin attached.
    ///
    /// The connection is upgraded to a raw stream. `stdin` is copied to it
    /// and the write half is shut down at end of input while the output is
    /// demultiplexed into the sinks.
    ///
    /// # Errors
    ///
    /// Returns the transport, status or framing error, [`Error::ExecFailed`]
    /// if the engine does not upgrade the connection, or the I/O error of a
    /// stream.
    pub async fn start_exec_with_stdin<'w>(
        &self,
        exec_id: &str,
        stdin: &mut (dyn AsyncRead + Send + Unpin + 'w),
        mut stdout: Option<&mut (dyn AsyncWrite + Send + Unpin + 'w)>,
        mut stderr: Option<&mut (dyn AsyncWrite + Send + Unpin + 'w)>,
    ) -> Result<()> {
        let path = format!("exec/{exec_id}/start");
        let url = self.build_url(&path)?;
        debug!(path, "Docker request (upgrade)");
        let response = self
            .http
            .post(url)
            .header(CONNECTION, "Upgrade")
            .header(UPGRADE, "tcp")
            .json(&ExecStartRequest::default())
            .send()
            .await?;

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            check_status(response, &path).await?;
            return Err(Error::ExecFailed(format!(
                "{path}: engine did not upgrade the exec stream"
            )));
        }

        let upgraded = response.upgrade().await?;
        let (mut reader, mut writer) = tokio::io::split(upgraded);

        let feed = async {
            let sent = tokio::io::copy(stdin, &mut writer).await?;
            writer.shutdown().await?;
            trace!(exec = exec_id, sent, "exec stdin closed");
            Ok::<_, Error>(())
        };

        let drain = async {
            let mut demux = StreamDemuxer::new();
            let mut buf = vec![0u8; READ_BUF_LEN];
            loop {
                let read = reader.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                demux.push(&buf[..read]);
                drain_frames(exec_id, &mut demux, &mut stdout, &mut stderr).await?;
            }
            demux.finish()
        };

        let (fed, drained) = tokio::join!(feed, drain);
        drained?;
        fed?;

        flush_sinks(stdout, stderr).await
    }

    /// Fetch the state of an exec instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown exec instance.
    pub async fn inspect_exec(&self, exec_id: &str) -> Result<ExecInspect> {
        let path = format!("exec/{exec_id}/json");
        self.get_json(&path, &[]).await
    }

    /// Wait for an exec instance to finish and return its exit code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the process is still running after the
    /// request timeout.
    pub async fn wait_exec(&self, exec_id: &str) -> Result<i64> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let state = self.inspect_exec(exec_id).await?;
            if !state.running {
                return state.exit_code.ok_or_else(|| {
                    Error::ExecFailed(format!("exec {exec_id} finished without an exit code"))
                });
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!("exec {exec_id} still running")));
            }
            sleep(EXEC_POLL_INTERVAL).await;
        }
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        let normalized = path.strip_prefix('/').unwrap_or(path);

        self.base_url
            .join(normalized)
            .map_err(|err| Error::InvalidEndpoint(format!("Invalid Docker path `{path}`: {err}")))
    }

    async fn get_json<T>(&self, path: &str, params: &[(&'static str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.send_json(Method::GET, path, Option::<&()>::None, params)
            .await
    }

    async fn send_json<B, R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        params: &[(&'static str, String)],
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send(method, path, body, params).await?;
        let response = check_status(response, path).await?;
        response.json::<R>().await.map_err(|err| {
            Error::ParseError(format!(
                "Failed to parse Docker response for `{path}`: {err}"
            ))
        })
    }

    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        params: &[(&'static str, String)],
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self.build_url(path)?;
        let mut request = self.http.request(method, url).query(params);
        if let Some(payload) = body {
            request = request.json(payload);
        }

        debug!(path, "Docker request");
        Ok(request.send().await?)
    }
}

fn engine_url(host: &str) -> Result<Url> {
    let parse = |raw: &str| {
        Url::parse(raw)
            .map_err(|err| Error::ConfigError(format!("Invalid Docker host `{host}`: {err}")))
    };

    let url = match host.strip_prefix(TCP_SCHEME_PREFIX) {
        Some(rest) => {
            let plain = parse(&format!("http://{rest}"))?;
            if plain.port() == Some(DOCKER_TLS_PORT) {
                parse(&format!("https://{rest}"))?
            } else {
                plain
            }
        }
        None => parse(host)?,
    };

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::ConfigError(format!(
            "Unsupported Docker host scheme `{other}`, expose the engine over tcp"
        ))),
    }
}

async fn drain_frames<'w>(
    exec_id: &str,
    demux: &mut StreamDemuxer,
    stdout: &mut Option<&mut (dyn AsyncWrite + Send + Unpin + 'w)>,
    stderr: &mut Option<&mut (dyn AsyncWrite + Send + Unpin + 'w)>,
) -> Result<()> {
    while let Some((kind, payload)) = demux.next_frame()? {
        trace!(exec = exec_id, ?kind, len = payload.len(), "exec frame");
        let sink = match kind {
            StreamKind::Stdout => stdout.as_deref_mut(),
            StreamKind::Stderr => stderr.as_deref_mut(),
            StreamKind::Stdin => None,
        };
        if let Some(sink) = sink {
            sink.write_all(&payload).await?;
        }
    }
    Ok(())
}

async fn flush_sinks<'w>(
    stdout: Option<&mut (dyn AsyncWrite + Send + Unpin + 'w)>,
    stderr: Option<&mut (dyn AsyncWrite + Send + Unpin + 'w)>,
) -> Result<()> {
    if let Some(out) = stdout {
        out.flush().await?;
    }
    if let Some(err) = stderr {
        err.flush().await?;
    }
    Ok(())
}

async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(map_status_to_error(status, path, &text))
}

/// Map an unsuccessful engine status to the shared error type.
#[must_use]
pub fn map_status_to_error(status: StatusCode, path: &str, body: &str) -> Error {
    let message = engine_message(body);
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(format!("{path}: {message}")),
        StatusCode::BAD_REQUEST => Error::InvalidRequest(message),
        StatusCode::CONFLICT => Error::ExecFailed(format!("{path}: {message}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::InvalidRequest(format!("Docker authorization failed: {message}"))
        }
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => {
            Error::ServiceUnavailable(format!("Docker temporarily unavailable: {message}"))
        }
        status if status.is_server_error() => {
            Error::ServiceUnavailable(format!("Docker server error {status}: {message}"))
        }
        _ => Error::HttpError(format!("Docker error {status}: {message}")),
    }
}

/// The engine reports errors as `{"message": "..."}`.
fn engine_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::encode_frame;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> DockerClient {
        DockerClient::new(server.uri()).unwrap()
    }

    #[test]
    fn rejects_unix_socket_hosts() {
        let err = DockerClient::new("unix:///var/run/docker.sock").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn tcp_hosts_map_to_http() {
        let client = DockerClient::new("tcp://127.0.0.1:2375").unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:2375/");

        let tls = DockerClient::new("tcp://docker.internal:2376").unwrap();
        assert_eq!(tls.base_url().as_str(), "https://docker.internal:2376/");
    }

    #[test]
    fn status_mapping() {
        let err = map_status_to_error(
            StatusCode::NOT_FOUND,
            "containers/x/json",
            r#"{"message":"No such container: x"}"#,
        );
        assert_eq!(
            err,
            Error::NotFound("containers/x/json: No such container: x".to_string())
        );
        assert!(matches!(
            map_status_to_error(StatusCode::INTERNAL_SERVER_ERROR, "p", "boom"),
            Error::ServiceUnavailable(_)
        ));
        assert!(matches!(
            map_status_to_error(StatusCode::IM_A_TEAPOT, "p", "?"),
            Error::HttpError(_)
        ));
    }

    #[tokio::test]
    async fn list_containers_sends_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/json"))
            .and(query_param("filters", r#"{"label":["app=vpp"]}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "Id": "4f2a91c0e7d3b5a8",
                    "Names": ["/vpp1"],
                    "Image": "ligato/vpp-base",
                    "State": "running"
                }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let mut params = ContainerListParams::default();
        params.add_filter("label", "app=vpp");

        let containers = test_client(&server).list_containers(&params).await.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].names, vec!["/vpp1"]);
    }

    #[tokio::test]
    async fn inspect_missing_container() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/gone/json"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "No such container: gone"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server)
            .inspect_container("gone")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn create_exec_posts_shell_command() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/containers/abc/exec"))
            .and(body_json(json!({
                "AttachStdin": false,
                "AttachStdout": true,
                "AttachStderr": true,
                "Tty": false,
                "Cmd": ["sh", "-c", "vppctl show version"]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"Id": "e1"})))
            .expect(1)
            .mount(&server)
            .await;

        let request = ExecCreateRequest::shell("vppctl show version").with_output(true, true);
        let created = test_client(&server)
            .create_exec("abc", &request)
            .await
            .unwrap();
        assert_eq!(created.id, "e1");
    }

    #[tokio::test]
    async fn start_exec_demuxes_output() {
        let server = MockServer::start().await;
        let mut body = encode_frame(StreamKind::Stdout, b"vpp v24.02\n");
        body.extend(encode_frame(StreamKind::Stderr, b"deprecated flag\n"));
        body.extend(encode_frame(StreamKind::Stdout, b"built by root\n"));

        Mock::given(method("POST"))
            .and(path("/exec/e1/start"))
            .and(body_json(json!({"Detach": false, "Tty": false})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/vnd.docker.raw-stream")
                    .set_body_bytes(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();
        test_client(&server)
            .start_exec(
                "e1",
                Some(&mut out as &mut (dyn AsyncWrite + Send + Unpin)),
                Some(&mut err as &mut (dyn AsyncWrite + Send + Unpin)),
            )
            .await
            .unwrap();

        assert_eq!(out, b"vpp v24.02\nbuilt by root\n");
        assert_eq!(err, b"deprecated flag\n");
    }

    #[tokio::test]
    async fn start_exec_with_stdin_requests_an_upgrade() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/exec/e1/start"))
            .and(header("upgrade", "tcp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::new()))
            .expect(1)
            .mount(&server)
            .await;

        let mut input: &[u8] = b"show version\n";
        let mut out: Vec<u8> = Vec::new();
        let err = test_client(&server)
            .start_exec_with_stdin("e1", &mut input, Some(&mut out), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecFailed(_)));
    }

    #[tokio::test]
    async fn start_exec_with_stdin_maps_engine_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/exec/gone/start"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "No such exec instance"})),
            )
            .mount(&server)
            .await;

        let mut input: &[u8] = b"";
        let err = test_client(&server)
            .start_exec_with_stdin("gone", &mut input, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn sinks_of_distinct_borrows_share_one_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/exec/e2/start"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(encode_frame(StreamKind::Stderr, b"warn\n")),
            )
            .mount(&server)
            .await;

        let mut out: Vec<u8> = Vec::new();
        let mut err = tokio::io::sink();
        let client = test_client(&server);
        client
            .start_exec("e2", Some(&mut out), Some(&mut err))
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn wait_exec_returns_exit_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exec/e1/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ID": "e1",
                "Running": false,
                "ExitCode": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let code = test_client(&server).wait_exec("e1").await.unwrap();
        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn unavailable_engine() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_ping"))
            .respond_with(ResponseTemplate::new(503).set_body_string("draining"))
            .mount(&server)
            .await;

        let err = test_client(&server).ping().await.unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }
}
