//! Shell tool — run a command and return its combined output.
//!
//! Runs `sh -c`, merges stdout and stderr in arrival order, and enforces a
//! wall-clock timeout. A non-zero exit is a tool-level error result, not a
//! host failure; the model sees the output either way and may recover.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use tl_domain::error::{Error, Result};
use tl_domain::tool::{ToolDefinition, ToolResult};

use crate::tool::Tool;

/// Cap on buffered command output before reduction.
const MAX_OUTPUT_BYTES: usize = 512 * 1024;

#[derive(Debug, Deserialize)]
struct ShellInput {
    command: String,
    #[serde(default)]
    workdir: Option<String>,
    /// Override the default timeout, in seconds.
    #[serde(default)]
    timeout_secs: Option<u64>,
}

pub struct ShellTool {
    default_timeout: Duration,
}

impl ShellTool {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "shell".into(),
            description: "Run a shell command and return its combined stdout/stderr output."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Shell command to execute" },
                    "workdir": { "type": "string", "description": "Working directory" },
                    "timeout_secs": { "type": "integer", "description": "Hard timeout in seconds" }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> Result<ToolResult> {
        let req: ShellInput = match serde_json::from_value(input) {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(format!("invalid shell arguments: {e}"))),
        };
        let timeout = req
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&req.command)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref wd) = req.workdir {
            cmd.current_dir(wd);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("failed to spawn: {e}"))),
        };

        // Merged output buffer fed by both reader tasks.
        let output = Arc::new(Mutex::new(String::new()));
        let stdout_task = spawn_reader(child.stdout.take(), output.clone());
        let stderr_task = spawn_reader(child.stderr.take(), output.clone());

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
            _ = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                let out = output.lock().clone();
                return Ok(ToolResult::error(format!(
                    "command timed out after {}s\n{out}",
                    timeout.as_secs()
                )));
            }
            status = child.wait() => status,
        };

        let _ = stdout_task.await;
        let _ = stderr_task.await;
        let out = output.lock().clone();

        match status {
            Ok(exit) if exit.success() => Ok(ToolResult::ok(out)),
            Ok(exit) => Ok(ToolResult::error(format!(
                "exit code {}\n{out}",
                exit.code().unwrap_or(-1)
            ))),
            Err(e) => Ok(ToolResult::error(format!("wait failed: {e}"))),
        }
    }
}

fn spawn_reader<R>(
    source: Option<R>,
    output: Arc<Mutex<String>>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Some(source) = source {
            let mut lines = BufReader::new(source).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut buf = output.lock();
                if buf.len() >= MAX_OUTPUT_BYTES {
                    continue; // keep draining so the child never blocks
                }
                buf.push_str(&line);
                buf.push('\n');
            }
        }
    })
}
