//! Command execution through a local shell.

use crate::Result;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::trace;
use vprobe_core::exec::{ExecStreams, RemoteExec};
use vprobe_core::Error;

/// Shell used when none is configured.
pub const DEFAULT_SHELL: &str = "sh";

/// Runs command lines as `<shell> -c <line>` on this host.
#[derive(Debug, Clone)]
pub struct ShellExec {
    shell: String,
}

impl Default for ShellExec {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl ShellExec {
    /// Use the given shell binary.
    #[must_use]
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

fn pipe_if(attached: bool) -> Stdio {
    if attached {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

#[async_trait]
impl RemoteExec for ShellExec {
    async fn exec(&self, command_line: &str, streams: ExecStreams<'_>) -> Result<()> {
        let ExecStreams {
            stdin,
            stdout,
            stderr,
        } = streams;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command_line);
        cmd.stdin(pipe_if(stdin.is_some()));
        cmd.stdout(pipe_if(stdout.is_some()));
        cmd.stderr(pipe_if(stderr.is_some()));
        cmd.kill_on_drop(true);

        trace!(shell = %self.shell, command = command_line, "spawning");
        let mut child = cmd
            .spawn()
            .map_err(|err| Error::ExecFailed(format!("spawning {}: {err}", self.shell)))?;

        let (fed, out, err) = tokio::join!(
            feed(child.stdin.take(), stdin),
            drain(child.stdout.take(), stdout),
            drain(child.stderr.take(), stderr),
        );
        let status = child.wait().await?;
        fed?;
        out?;
        err?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(Error::ExitStatus {
                code: i64::from(code),
            }),
            None => Err(Error::ExecFailed(format!(
                "`{command_line}` terminated by signal"
            ))),
        }
    }
}

async fn feed(
    pipe: Option<ChildStdin>,
    input: Option<&mut (dyn AsyncRead + Send + Unpin + '_)>,
) -> Result<()> {
    let (Some(mut pipe), Some(input)) = (pipe, input) else {
        return Ok(());
    };
    match tokio::io::copy(input, &mut pipe).await {
        // the command may exit without consuming its input
        Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
        Ok(_) => Ok(()),
    }
}

async fn drain<R>(
    pipe: Option<R>,
    sink: Option<&mut (dyn AsyncWrite + Send + Unpin + '_)>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let (Some(mut pipe), Some(sink)) = (pipe, sink) else {
        return Ok(());
    };
    tokio::io::copy(&mut pipe, &mut *sink).await?;
    sink.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use vprobe_core::exec::Command as RemoteCommand;

    #[tokio::test]
    async fn captures_stdout() {
        let shell = ShellExec::default();
        let out = RemoteCommand::new(&shell, "echo", ["hello"])
            .output()
            .await
            .unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let shell = ShellExec::default();
        let out = RemoteCommand::new(&shell, "cat", Vec::<String>::new())
            .stdin(Cursor::new(b"piped input".to_vec()))
            .output()
            .await
            .unwrap();
        assert_eq!(out, b"piped input");
    }

    #[tokio::test]
    async fn exit_status_and_stderr() {
        let shell = ShellExec::default();
        let err = RemoteCommand::new(&shell, "echo oops >&2; exit 3", Vec::<String>::new())
            .output()
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), Some(3));
        assert!(err.to_string().ends_with(": oops"));
    }

    #[tokio::test]
    async fn missing_shell() {
        let shell = ShellExec::new("/nonexistent/shell");
        let err = RemoteCommand::new(&shell, "true", Vec::<String>::new())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecFailed(_)));
    }
}
