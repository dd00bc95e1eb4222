//! Cheap token estimation.
//!
//! Tool deferral and conversation compaction must agree on sizes, so both
//! use these functions. The estimate is a byte-length proxy, not a real
//! tokenizer: close enough to size prompts, cheap enough to run on every
//! iteration.

use crate::message::{ContentBlock, Message};
use crate::tool::ToolDefinition;

/// Average bytes per token for the proxy estimate.
const BYTES_PER_TOKEN: usize = 4;

/// Fixed per-tool overhead (name framing, schema wrapper) in tokens.
const TOOL_OVERHEAD_TOKENS: usize = 8;

/// Fixed per-message overhead (role framing) in tokens.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

pub fn estimate_text(text: &str) -> usize {
    text.len() / BYTES_PER_TOKEN + 1
}

pub fn estimate_tool(def: &ToolDefinition) -> usize {
    let schema_len = def.input_schema.to_string().len();
    (def.name.len() + def.description.len() + schema_len) / BYTES_PER_TOKEN
        + TOOL_OVERHEAD_TOKENS
}

pub fn estimate_tools(defs: &[ToolDefinition]) -> usize {
    defs.iter().map(estimate_tool).sum()
}

pub fn estimate_message(msg: &Message) -> usize {
    let mut tokens = MESSAGE_OVERHEAD_TOKENS;
    for block in &msg.content {
        tokens += match block {
            ContentBlock::Text { text } => estimate_text(text),
            ContentBlock::ToolUse { name, input, .. } => {
                estimate_text(name) + estimate_text(&input.to_string())
            }
            ContentBlock::ToolResult { llm, .. } => estimate_text(llm),
        };
    }
    tokens
}

pub fn estimate_messages(msgs: &[Message]) -> usize {
    msgs.iter().map(estimate_message).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_estimate_scales_with_length() {
        assert!(estimate_text(&"x".repeat(4000)) > estimate_text("short"));
        assert_eq!(estimate_text(""), 1);
    }

    #[test]
    fn tool_estimate_includes_overhead() {
        let def = ToolDefinition {
            name: "t".into(),
            description: String::new(),
            input_schema: serde_json::json!({}),
        };
        assert!(estimate_tool(&def) >= TOOL_OVERHEAD_TOKENS);
    }

    #[test]
    fn message_estimate_counts_tool_results() {
        let small = Message::user("hi");
        let big = Message::tool_result("t1", "y".repeat(8000), "", false);
        assert!(estimate_message(&big) > estimate_message(&small));
    }
}
