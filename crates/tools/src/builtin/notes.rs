//! Scratchpad — keyed notes the model maintains for itself.
//!
//! The scratchpad is injected into the system prompt on every rebuild, so
//! anything noted here survives context compaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tl_domain::error::Result;
use tl_domain::tool::{ToolDefinition, ToolResult};

use crate::tool::Tool;

/// Keyed note storage. BTreeMap keeps prompt rendering deterministic.
#[derive(Default)]
pub struct Scratchpad {
    notes: RwLock<BTreeMap<String, String>>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, content: impl Into<String>) {
        self.notes.write().insert(key.into(), content.into());
    }

    pub fn remove(&self, key: &str) -> bool {
        self.notes.write().remove(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.read().is_empty()
    }

    /// Render for the system prompt; empty string when there are no notes.
    pub fn render(&self) -> String {
        let notes = self.notes.read();
        if notes.is_empty() {
            return String::new();
        }
        let mut out = String::from("Scratchpad notes:\n");
        for (key, content) in notes.iter() {
            out.push_str(&format!("- {key}: {content}\n"));
        }
        out
    }
}

pub struct NotesTool {
    scratchpad: Arc<Scratchpad>,
}

impl NotesTool {
    pub fn new(scratchpad: Arc<Scratchpad>) -> Self {
        Self { scratchpad }
    }
}

#[async_trait]
impl Tool for NotesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "notes".into(),
            description: "Maintain keyed scratchpad notes that persist in the system prompt \
                          across context compaction. Actions: set, delete, list."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["set", "delete", "list"] },
                    "key": { "type": "string", "description": "Note key" },
                    "content": { "type": "string", "description": "Note content (for set)" }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, input: Value, _cancel: &CancellationToken) -> Result<ToolResult> {
        let action = input.get("action").and_then(|v| v.as_str()).unwrap_or("");
        let key = input.get("key").and_then(|v| v.as_str());

        match action {
            "set" => {
                let (Some(key), Some(content)) =
                    (key, input.get("content").and_then(|v| v.as_str()))
                else {
                    return Ok(ToolResult::error("set requires key and content"));
                };
                self.scratchpad.set(key, content);
                Ok(ToolResult::ok(format!("noted {key}")))
            }
            "delete" => {
                let Some(key) = key else {
                    return Ok(ToolResult::error("delete requires key"));
                };
                if self.scratchpad.remove(key) {
                    Ok(ToolResult::ok(format!("deleted {key}")))
                } else {
                    Ok(ToolResult::error(format!("no note with key {key}")))
                }
            }
            "list" => {
                let rendered = self.scratchpad.render();
                if rendered.is_empty() {
                    Ok(ToolResult::ok("no notes"))
                } else {
                    Ok(ToolResult::ok(rendered))
                }
            }
            other => Ok(ToolResult::error(format!("unknown action: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_delete_list() {
        let pad = Arc::new(Scratchpad::new());
        let tool = NotesTool::new(pad.clone());
        let cancel = CancellationToken::new();

        let result = tool
            .execute(
                serde_json::json!({ "action": "set", "key": "plan", "content": "refactor parser" }),
                &cancel,
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(pad.render().contains("plan: refactor parser"));

        let result = tool
            .execute(serde_json::json!({ "action": "list" }), &cancel)
            .await
            .unwrap();
        assert!(result.llm.contains("plan"));

        let result = tool
            .execute(serde_json::json!({ "action": "delete", "key": "plan" }), &cancel)
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(pad.is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_key_is_tool_error() {
        let tool = NotesTool::new(Arc::new(Scratchpad::new()));
        let result = tool
            .execute(
                serde_json::json!({ "action": "delete", "key": "ghost" }),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[test]
    fn render_is_sorted_and_stable() {
        let pad = Scratchpad::new();
        pad.set("zebra", "last");
        pad.set("alpha", "first");
        let rendered = pad.render();
        let alpha = rendered.find("alpha").unwrap();
        let zebra = rendered.find("zebra").unwrap();
        assert!(alpha < zebra);
    }
}
