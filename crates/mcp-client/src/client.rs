//! JSON-RPC client over a [`Transport`].
//!
//! Issues requests sequentially with a monotonically increasing id and
//! correlates responses by that id. **Not safe for concurrent request
//! issuance**: the correlation scheme assumes one outstanding request at a
//! time, and that restriction is load-bearing.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::protocol::{
    initialize_params, JsonRpcError, JsonRpcMessage, McpToolDef, ToolCallResult, ToolsListResult,
};
use crate::transport::{Transport, TransportError};

/// Faults above the transport: the server answered, but wrongly.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Rpc(JsonRpcError),

    #[error("unexpected payload for {method}: {message}")]
    Payload { method: String, message: String },
}

pub struct McpClient {
    server_name: String,
    transport: Box<dyn Transport>,
    next_id: AtomicU64,
}

impl McpClient {
    pub fn new(server_name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            server_name: server_name.into(),
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Perform the MCP handshake: `initialize`, then the
    /// `notifications/initialized` notification (which has no id).
    pub async fn initialize(&self) -> Result<(), ProtocolError> {
        let params = serde_json::to_value(initialize_params())
            .map_err(|e| ProtocolError::Transport(TransportError::Json(e)))?;
        self.request("initialize", Some(params)).await?;
        self.transport
            .send(&JsonRpcMessage::notification("notifications/initialized"))
            .await?;
        tracing::debug!(server = %self.server_name, "MCP handshake complete");
        Ok(())
    }

    /// Discover the server's tools.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>, ProtocolError> {
        let result = self.request("tools/list", None).await?;
        let listed: ToolsListResult =
            serde_json::from_value(result).map_err(|e| ProtocolError::Payload {
                method: "tools/list".into(),
                message: e.to_string(),
            })?;
        Ok(listed.tools)
    }

    /// Invoke a remote tool. `arguments` is always sent as an object —
    /// anything else is replaced with `{}` rather than `null`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, ProtocolError> {
        let arguments = match arguments {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Default::default()),
        };
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self.request("tools/call", Some(params)).await?;
        serde_json::from_value(result).map_err(|e| ProtocolError::Payload {
            method: "tools/call".into(),
            message: e.to_string(),
        })
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }

    // ── Correlation core ───────────────────────────────────────────

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, ProtocolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(server = %self.server_name, id, method, "sending MCP request");
        self.transport
            .send(&JsonRpcMessage::request(id, method, params))
            .await?;
        let response = self.receive_response(id).await?;
        response.into_result().map_err(ProtocolError::Rpc)
    }

    /// Read from the transport until the response with `expected_id`
    /// arrives. Server notifications (no id) and responses with a stale id
    /// are discarded. End-of-stream surfaces as a transport error, never an
    /// infinite loop.
    async fn receive_response(&self, expected_id: u64) -> Result<JsonRpcMessage, TransportError> {
        loop {
            let msg = self.transport.receive().await?;
            if msg.is_notification() {
                tracing::debug!(
                    method = msg.method.as_deref().unwrap_or(""),
                    "discarding server notification"
                );
                continue;
            }
            match msg.id {
                Some(id) if id == expected_id => return Ok(msg),
                got => {
                    tracing::debug!(expected_id, got_id = ?got, "discarding stale response");
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
