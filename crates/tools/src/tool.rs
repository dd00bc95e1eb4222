use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tl_domain::error::Result;
use tl_domain::tool::{ToolDefinition, ToolResult};

/// A capability the model can invoke.
///
/// Identity is the definition's `name`; the registry rejects duplicates.
/// Execution errors come in two flavours and implementations must keep them
/// apart: a failure *of the tool* (bad input, file missing, non-zero exit)
/// is `Ok(ToolResult{is_error: true})` so the model can react; a failure
/// *reaching* the tool (transport fault) is `Err(_)` and never becomes a
/// conversation message.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> Result<ToolResult>;
}

const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Truncate to at most `max` bytes at a char boundary. The marker counts
/// against the budget, so the returned string never exceeds `max`.
pub fn truncate_to(content: &str, max: usize) -> (String, bool) {
    if content.len() <= max {
        return (content.to_string(), false);
    }
    let keep = max.saturating_sub(TRUNCATION_MARKER.len());
    let mut boundary = keep;
    while boundary > 0 && !content.is_char_boundary(boundary) {
        boundary -= 1;
    }
    let mut out = content[..boundary].to_string();
    if out.len() + TRUNCATION_MARKER.len() <= max {
        out.push_str(TRUNCATION_MARKER);
    }
    (out, true)
}
