//! MCP transport layer.
//!
//! Each MCP server communicates over a transport:
//! - **Stdio**: spawn a child process, one JSON-RPC message per
//!   newline-delimited line over stdin/stdout.
//! - **SSE**: HTTP Server-Sent Events for receiving, JSON POST for sending
//!   (see [`crate::sse`]).
//!
//! Both are cancellable through an ambient [`CancellationToken`]: every
//! blocking call selects on it and returns [`TransportError::Cancelled`]
//! promptly. Transports never retry; callers decide policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::protocol::JsonRpcMessage;

/// Ceiling for a single stdout line. Tool listings with bulky schemas
/// routinely exceed typical 64 KiB scanner defaults.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Bound on buffered, not-yet-consumed incoming messages.
const INBOUND_CAPACITY: usize = 16;

/// How long `close` waits for the child to exit before killing it.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Trait for MCP server transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one JSON-RPC message.
    async fn send(&self, msg: &JsonRpcMessage) -> Result<(), TransportError>;

    /// Receive the next incoming JSON-RPC message. End-of-stream is
    /// [`TransportError::Closed`], never a hang.
    async fn receive(&self) -> Result<JsonRpcMessage, TransportError>;

    /// Shut down the transport. Idempotent.
    async fn close(&self);
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("stream closed")]
    Closed,

    #[error("SSE stream closed before the endpoint event arrived")]
    ClosedBeforeEndpoint,

    #[error("cancelled")]
    Cancelled,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stdio transport: communicates with a child process over stdin/stdout.
///
/// A dedicated reader task scans stdout line by line and hands owned copies
/// into a bounded channel; the read buffer itself is reused across lines.
pub struct StdioTransport {
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    inbound: Mutex<mpsc::Receiver<String>>,
    child: Mutex<Option<Child>>,
    /// Signals the reader task to exit.
    quit: CancellationToken,
    /// Ambient per-turn cancellation.
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Spawn a child process and start its stdout reader task.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            ))
        })?;

        let quit = CancellationToken::new();
        let (line_tx, line_rx) = mpsc::channel::<String>(INBOUND_CAPACITY);
        tokio::spawn(read_lines(stdout, line_tx, quit.clone()));

        Ok(Self {
            stdin: Arc::new(Mutex::new(Some(stdin))),
            inbound: Mutex::new(line_rx),
            child: Mutex::new(Some(child)),
            quit,
            cancel,
            closed: AtomicBool::new(false),
        })
    }
}

/// Reader task: one owned line at a time into the bounded channel.
/// Dropping the sender is how end-of-stream reaches `receive`.
async fn read_lines(
    stdout: tokio::process::ChildStdout,
    tx: mpsc::Sender<String>,
    quit: CancellationToken,
) {
    let mut reader = BufReader::new(stdout);
    loop {
        let mut line = String::new();
        tokio::select! {
            _ = quit.cancelled() => break,
            read = reader.read_line(&mut line) => match read {
                Ok(0) => break,
                Ok(_) => {
                    if line.len() > MAX_LINE_BYTES {
                        tracing::error!(
                            len = line.len(),
                            "child stdout line exceeds ceiling, closing transport"
                        );
                        break;
                    }
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let owned = trimmed.to_string();
                    tokio::select! {
                        _ = quit.cancelled() => break,
                        sent = tx.send(owned) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "child stdout read failed");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, msg: &JsonRpcMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let mut json = serde_json::to_string(msg)?;
        json.push('\n');

        // Offload the locked write so cancellation unblocks the caller
        // immediately; the write itself still runs to completion.
        let stdin = self.stdin.clone();
        let mut write = tokio::spawn(async move {
            let mut guard = stdin.lock().await;
            match guard.as_mut() {
                Some(w) => {
                    w.write_all(json.as_bytes()).await?;
                    w.flush().await
                }
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "child stdin already closed",
                )),
            }
        });

        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            joined = &mut write => match joined {
                Ok(result) => result.map_err(TransportError::Io),
                Err(e) => Err(TransportError::Io(std::io::Error::other(e))),
            }
        }
    }

    async fn receive(&self) -> Result<JsonRpcMessage, TransportError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            line = inbound.recv() => match line {
                Some(line) => Ok(serde_json::from_str(&line)?),
                None => Err(TransportError::Closed),
            }
        }
    }

    /// Signal the reader, close stdin, wait up to [`CLOSE_GRACE`] for the
    /// child, then kill and reap. All four steps are required; skipping any
    /// one leaks a process, hangs the close, or loses the final line.
    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.quit.cancel();

        {
            let mut stdin = self.stdin.lock().await;
            if let Some(mut w) = stdin.take() {
                if let Err(e) = w.shutdown().await {
                    tracing::debug!(error = %e, "error closing child stdin");
                }
            }
        }

        let mut child_slot = self.child.lock().await;
        if let Some(mut child) = child_slot.take() {
            match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(?status, "MCP server process exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "error waiting for MCP server process");
                }
                Err(_) => {
                    tracing::warn!("MCP server did not exit within grace period, killing");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "failed to kill MCP server process");
                    }
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_script(script: &str, cancel: CancellationToken) -> StdioTransport {
        StdioTransport::spawn(
            "sh",
            &["-c".to_string(), script.to_string()],
            &HashMap::new(),
            cancel,
        )
        .expect("spawn sh")
    }

    #[tokio::test]
    async fn echo_server_roundtrip() {
        // cat echoes each request line straight back.
        let transport = spawn_script("cat", CancellationToken::new());

        let req = JsonRpcMessage::request(1, "ping", None);
        transport.send(&req).await.unwrap();
        let echoed = transport.receive().await.unwrap();
        assert_eq!(echoed, req);

        transport.close().await;
    }

    #[tokio::test]
    async fn receive_after_child_exit_is_closed() {
        let transport = spawn_script("exit 0", CancellationToken::new());
        let err = transport.receive().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_prompt() {
        // cat exits as soon as stdin closes, so close returns quickly.
        let transport = spawn_script("cat", CancellationToken::new());
        let started = std::time::Instant::now();
        transport.close().await;
        transport.close().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let transport = spawn_script("cat", CancellationToken::new());
        transport.close().await;
        let err = transport
            .send(&JsonRpcMessage::request(1, "ping", None))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn cancellation_unblocks_receive() {
        let cancel = CancellationToken::new();
        // sleep keeps stdout open without producing output.
        let transport = spawn_script("sleep 30", cancel.clone());

        let receive = tokio::spawn(async move { transport.receive().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = receive.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }

    #[tokio::test]
    async fn non_json_lines_surface_as_parse_errors() {
        let transport = spawn_script(
            r#"printf '%s\n' 'not json at all'"#,
            CancellationToken::new(),
        );
        let err = transport.receive().await.unwrap_err();
        assert!(matches!(err, TransportError::Json(_)));
    }
}
