//! Child-process channel speaking newline-delimited JSON-RPC over stdio.

use super::jsonrpc::{self, PendingRequests};
use crate::tool_registry::{
    domain::{ServerKey, StderrMode, StdioTransportConfig},
    ports::{TransportError, TransportResult},
};
use serde_json::Value;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

#[derive(Debug)]
pub(super) struct StdioChannel {
    key: ServerKey,
    stdin: SharedStdin,
    child: Mutex<Option<Child>>,
    pending: Arc<PendingRequests>,
    open: Arc<AtomicBool>,
    shutdown_grace: Duration,
}

impl StdioChannel {
    /// Starts the server process and its reader tasks.
    ///
    /// The child is killed if the channel is dropped without being closed.
    pub(super) fn spawn(
        key: &ServerKey,
        config: &StdioTransportConfig,
        shutdown_grace: Duration,
    ) -> TransportResult<Self> {
        debug!(
            server = %key,
            command = config.command(),
            args = ?config.args(),
            "starting MCP stdio server"
        );
        let mut command = Command::new(config.command());
        command
            .args(config.args())
            .envs(config.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr_stdio(config.stderr()))
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| TransportError::Spawn {
            command: config.command().to_owned(),
            reason: err.to_string(),
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Handshake(String::from("child stdin unavailable")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Handshake(String::from("child stdout unavailable")))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_drain(key.clone(), stderr);
        }

        let channel = Self {
            key: key.clone(),
            stdin: Arc::new(Mutex::new(Some(stdin))),
            child: Mutex::new(Some(child)),
            pending: Arc::new(PendingRequests::new()),
            open: Arc::new(AtomicBool::new(true)),
            shutdown_grace,
        };
        channel.spawn_stdout_reader(stdout);
        Ok(channel)
    }

    fn spawn_stdout_reader(&self, stdout: ChildStdout) {
        let key = self.key.clone();
        let stdin = Arc::clone(&self.stdin);
        let pending = Arc::clone(&self.pending);
        let open = Arc::clone(&self.open);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(payload) = serde_json::from_str::<Value>(&line) else {
                    debug!(server = %key, "ignoring non-JSON stdout line");
                    continue;
                };
                for reply in pending.dispatch(payload).await {
                    if let Err(err) = write_message(&stdin, &reply).await {
                        debug!(server = %key, error = %err, "failed to answer server request");
                    }
                }
            }
            open.store(false, Ordering::SeqCst);
            pending.fail_all().await;
            debug!(server = %key, "MCP stdio server closed stdout");
        });
    }

    pub(super) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(super) async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> TransportResult<Value> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let (id, receiver) = self.pending.register().await;
        if let Err(err) = write_message(&self.stdin, &jsonrpc::request(id, method, params)).await {
            self.pending.cancel(id).await;
            return Err(err);
        }
        self.pending.await_response(id, receiver, timeout).await
    }

    pub(super) async fn notify(&self, method: &str, params: Value) -> TransportResult<()> {
        write_message(&self.stdin, &jsonrpc::notification(method, params)).await
    }

    /// Closes stdin, then terminates and reaps the child.
    pub(super) async fn close(&self) -> TransportResult<()> {
        self.open.store(false, Ordering::SeqCst);
        drop(self.stdin.lock().await.take());
        self.pending.fail_all().await;

        let Some(child) = self.child.lock().await.take() else {
            return Ok(());
        };
        let status = shutdown_child(child, self.shutdown_grace)
            .await
            .map_err(TransportError::runtime)?;
        debug!(server = %self.key, %status, "MCP stdio server exited");
        Ok(())
    }
}

fn stderr_stdio(mode: StderrMode) -> Stdio {
    match mode {
        StderrMode::Inherit => Stdio::inherit(),
        StderrMode::Pipe => Stdio::piped(),
        StderrMode::Ignore => Stdio::null(),
    }
}

fn spawn_stderr_drain(key: ServerKey, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(server = %key, stderr = %line, "MCP server stderr");
        }
    });
}

async fn write_message(stdin: &Mutex<Option<ChildStdin>>, message: &Value) -> TransportResult<()> {
    let mut payload =
        serde_json::to_vec(message).map_err(|err| TransportError::Protocol(err.to_string()))?;
    payload.push(b'\n');

    let mut guard = stdin.lock().await;
    let writer = guard.as_mut().ok_or(TransportError::Closed)?;
    writer
        .write_all(&payload)
        .await
        .map_err(|err| TransportError::Request(err.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|err| TransportError::Request(err.to_string()))
}

/// Terminates a child, escalating from `SIGTERM` to a kill after `grace`.
async fn shutdown_child(mut child: Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    #[cfg(unix)]
    send_sigterm(&child)?;

    if let Ok(result) = tokio::time::timeout(grace, child.wait()).await {
        return result;
    }
    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let raw_pid = i32::try_from(pid).map_err(io::Error::other)?;
    match signal::kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(io::Error::other(err)),
    }
}
