//! One-shot remote command execution.
//!
//! A [`Command`] is built against the [`RemoteExec`] transport of one
//! instance, optionally bound to caller streams, and consumed by
//! [`Command::run`] or [`Command::output`].

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::error::{Error, Result};

/// Readable stream handed to a remote command.
pub type InputStream<'a> = Box<dyn AsyncRead + Send + Unpin + 'a>;
/// Writable stream receiving remote command output.
pub type OutputStream<'a> = Box<dyn AsyncWrite + Send + Unpin + 'a>;

/// Streams attached to one remote execution.
///
/// An absent stream is not attached to the remote process at all.
#[derive(Default)]
pub struct ExecStreams<'s> {
    /// Input fed to the command
    pub stdin: Option<&'s mut (dyn AsyncRead + Send + Unpin + 's)>,
    /// Sink for standard output
    pub stdout: Option<&'s mut (dyn AsyncWrite + Send + Unpin + 's)>,
    /// Sink for standard error
    pub stderr: Option<&'s mut (dyn AsyncWrite + Send + Unpin + 's)>,
}

/// Environment-native remote execution mechanism of one instance.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run a shell command line to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExitStatus`] for a non-zero exit and a transport error
    /// if the command could not be dispatched.
    async fn exec(&self, command_line: &str, streams: ExecStreams<'_>) -> Result<()>;
}

/// Builder for a single remote command.
pub struct Command<'a> {
    target: &'a dyn RemoteExec,
    program: String,
    args: Vec<String>,
    stdin: Option<InputStream<'a>>,
    stdout: Option<OutputStream<'a>>,
    stderr: Option<OutputStream<'a>>,
}

impl<'a> Command<'a> {
    /// Create a command bound to a transport.
    pub fn new<I, S>(target: &'a dyn RemoteExec, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Attach standard input.
    #[must_use]
    pub fn stdin(mut self, input: impl AsyncRead + Send + Unpin + 'a) -> Self {
        self.stdin = Some(Box::new(input));
        self
    }

    /// Attach standard output.
    #[must_use]
    pub fn stdout(mut self, output: impl AsyncWrite + Send + Unpin + 'a) -> Self {
        self.stdout = Some(Box::new(output));
        self
    }

    /// Attach standard error.
    #[must_use]
    pub fn stderr(mut self, output: impl AsyncWrite + Send + Unpin + 'a) -> Self {
        self.stderr = Some(Box::new(output));
        self
    }

    /// Program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in order.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Shell command line: program and arguments joined by spaces.
    #[must_use]
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Execute the command with the bound streams.
    ///
    /// # Errors
    ///
    /// Returns the transport error or [`Error::ExitStatus`] for a non-zero exit.
    pub async fn run(self) -> Result<()> {
        let line = self.command_line();
        let Self {
            target,
            mut stdin,
            mut stdout,
            mut stderr,
            ..
        } = self;

        trace!(command = %line, "running remote command");

        let streams = ExecStreams {
            stdin: reader(&mut stdin),
            stdout: writer(&mut stdout),
            stderr: writer(&mut stderr),
        };
        target.exec(&line, streams).await
    }

    /// Execute the command and return its standard output.
    ///
    /// Unless the caller bound standard error, it is captured and appended to
    /// the returned error on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamAlreadyBound`] without executing anything when
    /// stdout is already bound, otherwise the failure of [`Command::run`].
    pub async fn output(self) -> Result<Vec<u8>> {
        if self.stdout.is_some() {
            return Err(Error::StreamAlreadyBound("stdout".to_string()));
        }

        let line = self.command_line();
        let Self {
            target,
            mut stdin,
            mut stderr,
            ..
        } = self;

        let mut out: Vec<u8> = Vec::new();
        let mut err_buf: Vec<u8> = Vec::new();
        let capture_err = stderr.is_none();

        let result = {
            let stderr_sink = if capture_err {
                Some(&mut err_buf as &mut (dyn AsyncWrite + Send + Unpin))
            } else {
                writer(&mut stderr)
            };
            let streams = ExecStreams {
                stdin: reader(&mut stdin),
                stdout: Some(&mut out as &mut (dyn AsyncWrite + Send + Unpin)),
                stderr: stderr_sink,
            };
            target.exec(&line, streams).await
        };

        match result {
            Ok(()) => Ok(out),
            Err(err) if capture_err => Err(Error::CommandFailed {
                source: Box::new(err),
                stderr: String::from_utf8_lossy(&err_buf).trim_end().to_string(),
            }),
            Err(err) => Err(err),
        }
    }
}

fn reader<'s>(
    stream: &'s mut Option<InputStream<'_>>,
) -> Option<&'s mut (dyn AsyncRead + Send + Unpin + 's)> {
    match stream {
        Some(s) => Some(s.as_mut()),
        None => None,
    }
}

fn writer<'s>(
    stream: &'s mut Option<OutputStream<'_>>,
) -> Option<&'s mut (dyn AsyncWrite + Send + Unpin + 's)> {
    match stream {
        Some(s) => Some(s.as_mut()),
        None => None,
    }
}
