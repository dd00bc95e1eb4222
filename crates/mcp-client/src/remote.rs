//! Remote tools exposed through an [`McpClient`].
//!
//! Each discovered server tool is wrapped as a local tool named
//! `mcp_<server>_<remote_name>`. The wrapper preserves the distinction
//! between "the tool ran and reported failure" (an MCP result with
//! `isError`, surfaced as a normal error result) and "we could not talk to
//! the tool" (a transport or protocol fault, surfaced as a fatal error that
//! never becomes a conversation message).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tl_domain::error::{Error, Result};
use tl_domain::tool::{ToolDefinition, ToolResult};
use tl_tools::tool::Tool;

use crate::client::McpClient;
use crate::protocol::McpToolDef;

pub struct McpTool {
    client: Arc<McpClient>,
    remote: McpToolDef,
    local_name: String,
}

impl McpTool {
    pub fn new(client: Arc<McpClient>, remote: McpToolDef) -> Self {
        let local_name = format!("mcp_{}_{}", client.server_name(), remote.name);
        Self {
            client,
            remote,
            local_name,
        }
    }

    /// Discover the server's tools and wrap each one.
    pub async fn discover(client: Arc<McpClient>) -> Result<Vec<McpTool>> {
        let defs = client
            .list_tools()
            .await
            .map_err(|e| Error::Other(format!("mcp {}: {e}", client.server_name())))?;
        Ok(defs
            .into_iter()
            .map(|def| McpTool::new(client.clone(), def))
            .collect())
    }
}

#[async_trait]
impl Tool for McpTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.local_name.clone(),
            description: self.remote.description.clone(),
            input_schema: self.remote.input_schema.clone(),
        }
    }

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> Result<ToolResult> {
        let call = self.client.call_tool(&self.remote.name, input);
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = call => result,
        };
        match result {
            Ok(outcome) => {
                let text = outcome.text();
                if outcome.is_error {
                    Ok(ToolResult::error(text))
                } else {
                    Ok(ToolResult::ok(text))
                }
            }
            // Transport/protocol faults are fatal for the call, not results.
            Err(e) => Err(Error::Other(format!(
                "mcp {}: {e}",
                self.client.server_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonRpcMessage;
    use crate::transport::{Transport, TransportError};
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeTransport {
        inbound: SyncMutex<VecDeque<JsonRpcMessage>>,
    }

    #[async_trait]
    impl Transport for Arc<FakeTransport> {
        async fn send(&self, _msg: &JsonRpcMessage) -> std::result::Result<(), TransportError> {
            Ok(())
        }
        async fn receive(&self) -> std::result::Result<JsonRpcMessage, TransportError> {
            self.inbound
                .lock()
                .pop_front()
                .ok_or(TransportError::Closed)
        }
        async fn close(&self) {}
    }

    fn tool_with_response(result: serde_json::Value) -> McpTool {
        let transport = Arc::new(FakeTransport::default());
        transport.inbound.lock().push_back(JsonRpcMessage {
            jsonrpc: "2.0".into(),
            id: Some(1),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        });
        let client = Arc::new(McpClient::new("github", Box::new(transport)));
        McpTool::new(
            client,
            McpToolDef {
                name: "search".into(),
                description: "Search issues".into(),
                input_schema: serde_json::json!({ "type": "object" }),
            },
        )
    }

    #[test]
    fn wrapped_name_is_prefixed() {
        let tool = tool_with_response(serde_json::json!({ "content": [] }));
        assert_eq!(tool.definition().name, "mcp_github_search");
    }

    #[tokio::test]
    async fn is_error_result_stays_a_tool_result() {
        let tool = tool_with_response(serde_json::json!({
            "content": [{ "type": "text", "text": "rate limited" }],
            "isError": true
        }));
        let result = tool
            .execute(serde_json::json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.llm, "rate limited");
    }

    #[tokio::test]
    async fn transport_fault_is_fatal_not_a_result() {
        let transport = Arc::new(FakeTransport::default()); // empty: receive -> Closed
        let client = Arc::new(McpClient::new("github", Box::new(transport)));
        let tool = McpTool::new(
            client,
            McpToolDef {
                name: "search".into(),
                description: String::new(),
                input_schema: serde_json::json!({ "type": "object" }),
            },
        );
        assert!(tool
            .execute(serde_json::json!({}), &CancellationToken::new())
            .await
            .is_err());
    }
}
