//! Offloaded-result store.
//!
//! Full tool outputs too large for the conversation are parked here under a
//! generated reference id; the model pages through them with the
//! `read_result` tool. Per-session, bounded, LRU eviction on insert.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tl_domain::error::Result;
use tl_domain::tool::{ToolDefinition, ToolResult};

use crate::tool::Tool;

/// Default window size for `read_result`.
pub const DEFAULT_READ_LIMIT: usize = 4096;

struct StoreInner {
    bodies: HashMap<String, String>,
    /// Least-recently-used first.
    order: Vec<String>,
}

pub struct ResultStore {
    inner: Mutex<StoreInner>,
    cap: usize,
}

impl ResultStore {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                bodies: HashMap::new(),
                order: Vec::new(),
            }),
            cap: cap.max(1),
        }
    }

    /// Retain a full result body, returning its reference id.
    /// Eviction runs synchronously when the cap is exceeded.
    pub fn insert(&self, body: String) -> String {
        let id = format!("res_{}", uuid::Uuid::new_v4().simple());
        let mut inner = self.inner.lock();
        inner.bodies.insert(id.clone(), body);
        inner.order.push(id.clone());
        while inner.order.len() > self.cap {
            let evicted = inner.order.remove(0);
            inner.bodies.remove(&evicted);
            tracing::debug!(ref_id = %evicted, "evicted offloaded result");
        }
        id
    }

    /// Read the window `[offset, offset+limit)` of a stored body.
    ///
    /// `None` means the id is unknown. An offset past the end returns empty
    /// text — paging off the end is not an error.
    pub fn read(&self, ref_id: &str, offset: usize, limit: usize) -> Option<String> {
        let mut inner = self.inner.lock();
        if !inner.bodies.contains_key(ref_id) {
            return None;
        }
        // Refresh LRU position.
        if let Some(pos) = inner.order.iter().position(|id| id == ref_id) {
            let id = inner.order.remove(pos);
            inner.order.push(id);
        }

        let body = &inner.bodies[ref_id];
        if offset >= body.len() {
            return Some(String::new());
        }
        let end = (offset + limit).min(body.len());
        let start = floor_boundary(body, offset);
        let end = floor_boundary(body, end);
        Some(body[start..end].to_string())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// read_result tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReadResultTool {
    store: Arc<ResultStore>,
}

impl ReadResultTool {
    pub fn new(store: Arc<ResultStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadResultTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_result".into(),
            description: "Read a window of an offloaded tool result by reference id. \
                          Use the offset and limit to page through large outputs."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "ref_id": { "type": "string", "description": "Reference id from a truncated result" },
                    "offset": { "type": "integer", "description": "Byte offset to start from (default 0)" },
                    "limit": { "type": "integer", "description": "Bytes to return (default 4096)" }
                },
                "required": ["ref_id"]
            }),
        }
    }

    async fn execute(&self, input: Value, _cancel: &CancellationToken) -> Result<ToolResult> {
        let ref_id = match input.get("ref_id").and_then(|v| v.as_str()) {
            Some(id) => id,
            None => return Ok(ToolResult::error("missing required argument: ref_id")),
        };
        let offset = input.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let limit = input
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_READ_LIMIT);

        match self.store.read(ref_id, offset, limit) {
            Some(window) => Ok(ToolResult::ok(window)),
            None => Ok(ToolResult::error(format!("unknown reference id: {ref_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_read_window() {
        let store = ResultStore::new(8);
        let id = store.insert("0123456789".into());
        assert_eq!(store.read(&id, 0, 4).unwrap(), "0123");
        assert_eq!(store.read(&id, 4, 100).unwrap(), "456789");
    }

    #[test]
    fn offset_past_end_is_empty_not_error() {
        let store = ResultStore::new(8);
        let id = store.insert("short".into());
        assert_eq!(store.read(&id, 1000, 10).unwrap(), "");
    }

    #[test]
    fn unknown_id_is_none() {
        let store = ResultStore::new(8);
        assert!(store.read("res_missing", 0, 10).is_none());
    }

    #[test]
    fn eviction_is_lru() {
        let store = ResultStore::new(2);
        let a = store.insert("aaa".into());
        let b = store.insert("bbb".into());
        // Touch `a` so `b` becomes the eviction candidate.
        store.read(&a, 0, 1);
        let _c = store.insert("ccc".into());
        assert_eq!(store.len(), 2);
        assert!(store.read(&a, 0, 1).is_some());
        assert!(store.read(&b, 0, 1).is_none());
    }

    #[tokio::test]
    async fn read_result_tool_pages() {
        let store = Arc::new(ResultStore::new(8));
        let id = store.insert("x".repeat(10_000));
        let tool = ReadResultTool::new(store);

        let result = tool
            .execute(
                serde_json::json!({ "ref_id": id, "offset": 0, "limit": 4096 }),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.llm.len(), 4096);
    }

    #[tokio::test]
    async fn read_result_tool_rejects_unknown_id() {
        let tool = ReadResultTool::new(Arc::new(ResultStore::new(8)));
        let result = tool
            .execute(
                serde_json::json!({ "ref_id": "res_nope" }),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
