//! Progressive disclosure of tool descriptors.
//!
//! Shipping every descriptor on every call wastes context, so selection is
//! two-stage: a category gate driven by conversation keywords and recent
//! use, then a token gate against a fraction of the context window. Tools
//! that do not make the cut are *deferred*: withheld from the prompt but
//! discoverable through the always-present `tool_search` tool.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tl_domain::budget::estimate_tool;
use tl_domain::error::Result;
use tl_domain::message::{ContentBlock, Message};
use tl_domain::tool::{ToolCategory, ToolDefinition, ToolResult};

use crate::tool::Tool;

/// How many trailing messages the keyword/recency heuristics look at.
const RECENT_WINDOW: usize = 5;

const FILE_KEYWORDS: &[&str] = &[
    "file", "path", "directory", "folder", "read", "write", "edit", ".rs", ".py", ".js", ".ts",
    ".go", ".c", ".h", ".json", ".toml", ".yaml", ".md",
];

const PLATFORM_KEYWORDS: &[&str] = &[
    "platform", "xcode", "simulator", "device", "notarize", "provisioning",
];

/// The outcome of selection: what goes into the prompt and what waits in
/// the searchable pool.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub active: Vec<ToolDefinition>,
    pub deferred: Vec<ToolDefinition>,
}

pub struct ToolSelector {
    context_window_tokens: usize,
    descriptor_fraction: f64,
}

impl ToolSelector {
    pub fn new(context_window_tokens: usize, descriptor_fraction: f64) -> Self {
        Self {
            context_window_tokens,
            descriptor_fraction,
        }
    }

    fn token_budget(&self) -> usize {
        (self.context_window_tokens as f64 * self.descriptor_fraction) as usize
    }

    /// Select the active descriptor set from `defs` given the conversation
    /// tail. Core tools are always active, whatever the budget says.
    pub fn select(&self, defs: &[ToolDefinition], messages: &[Message]) -> Selection {
        let tail = recent_text(messages);
        let recently_used = recent_tool_names(messages);

        // ── Category gate ─────────────────────────────────────────
        let mut accepted: Vec<&ToolDefinition> = Vec::new();
        let mut non_core_accepted = false;
        let mut has_non_core = false;

        for def in defs {
            let category = ToolCategory::from_name(&def.name);
            if category.is_core() {
                accepted.push(def);
                continue;
            }
            has_non_core = true;

            let wanted = match category {
                ToolCategory::Core => unreachable!(),
                ToolCategory::Filesystem => {
                    contains_any(&tail, FILE_KEYWORDS) || recently_used.contains(def.name.as_str())
                }
                ToolCategory::Platform => {
                    contains_any(&tail, PLATFORM_KEYWORDS)
                        || recently_used.contains(def.name.as_str())
                }
                ToolCategory::Mcp | ToolCategory::Skill => {
                    name_mentioned(&tail, &def.name) || recently_used.contains(def.name.as_str())
                }
            };
            if wanted {
                accepted.push(def);
                non_core_accepted = true;
            }
        }

        // Fail open: when no heuristic added anything, offer everything and
        // let the token gate sort it out.
        if has_non_core && !non_core_accepted {
            accepted = defs.iter().collect();
        }

        // ── Token gate ────────────────────────────────────────────
        let budget = self.token_budget();
        let mut spent = 0usize;
        let mut selection = Selection::default();

        // Core first, unconditionally.
        for def in &accepted {
            if ToolCategory::from_name(&def.name).is_core() {
                spent += estimate_tool(def);
                selection.active.push((*def).clone());
            }
        }
        for def in &accepted {
            if ToolCategory::from_name(&def.name).is_core() {
                continue;
            }
            let cost = estimate_tool(def);
            if spent + cost <= budget {
                spent += cost;
                selection.active.push((*def).clone());
            } else {
                selection.deferred.push((*def).clone());
            }
        }

        if !selection.deferred.is_empty() {
            tracing::debug!(
                active = selection.active.len(),
                deferred = selection.deferred.len(),
                budget,
                "deferred tool descriptors over budget"
            );
        }
        selection
    }
}

fn recent_text(messages: &[Message]) -> String {
    let start = messages.len().saturating_sub(RECENT_WINDOW);
    messages[start..]
        .iter()
        .map(|m| m.text().to_lowercase())
        .collect::<Vec<_>>()
        .join("\n")
}

fn recent_tool_names(messages: &[Message]) -> HashSet<&str> {
    let start = messages.len().saturating_sub(RECENT_WINDOW);
    messages[start..]
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|b| match b {
            ContentBlock::ToolUse { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Whether the tail mentions the tool by name or by one of its meaningful
/// name segments.
fn name_mentioned(tail: &str, name: &str) -> bool {
    let lower = name.to_lowercase();
    if tail.contains(&lower) {
        return true;
    }
    lower
        .split(['_', '-', '.'])
        .filter(|seg| seg.len() > 3)
        .any(|seg| tail.contains(seg))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deferred pool + tool_search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The currently-deferred descriptors, replaced each selection pass.
#[derive(Default)]
pub struct DeferredPool {
    defs: RwLock<Vec<ToolDefinition>>,
}

impl DeferredPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, defs: Vec<ToolDefinition>) {
        *self.defs.write() = defs;
    }

    /// Case-insensitive substring match over name and description.
    pub fn search(&self, query: &str) -> Vec<ToolDefinition> {
        let query = query.to_lowercase();
        self.defs
            .read()
            .iter()
            .filter(|d| {
                d.name.to_lowercase().contains(&query)
                    || d.description.to_lowercase().contains(&query)
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.defs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.read().is_empty()
    }
}

/// Always-present search tool over the deferred pool.
pub struct ToolSearchTool {
    pool: Arc<DeferredPool>,
}

impl ToolSearchTool {
    pub fn new(pool: Arc<DeferredPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Tool for ToolSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "tool_search".into(),
            description: "Search tools that were withheld from the prompt to save space. \
                          Returns matching tool descriptors; call a found tool by name."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Substring to match against tool names and descriptions" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: Value, _cancel: &CancellationToken) -> Result<ToolResult> {
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) => q,
            None => return Ok(ToolResult::error("missing required argument: query")),
        };
        let matches = self.pool.search(query);
        if matches.is_empty() {
            return Ok(ToolResult::ok(format!("no deferred tools match \"{query}\"")));
        }
        // Names and descriptions only; full schemas would dwarf the result.
        let listing: String = matches
            .iter()
            .map(|d| format!("{}: {}\n", d.name, d.description))
            .collect();
        Ok(ToolResult::ok(listing))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
