//! Content search over the project tree.
//!
//! Matches are reported one per line as `path:line_number:text`. The
//! result cap is **global across all files**, applied by post-processing
//! the full match list — a per-file limit in the scanner would not bound
//! the total.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tl_domain::error::Result;
use tl_domain::tool::{ToolDefinition, ToolResult};

use crate::tool::Tool;

/// Default global cap on reported matches.
const DEFAULT_MAX_RESULTS: usize = 50;

/// Files larger than this are skipped.
const MAX_SCAN_BYTES: u64 = 2 * 1024 * 1024;

const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".venv", "__pycache__"];

#[derive(Debug, Deserialize)]
struct GrepInput {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    max_results: Option<usize>,
}

pub struct GrepTool {
    root: PathBuf,
}

impl GrepTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "grep".into(),
            description: "Search file contents with a regular expression. \
                          Returns path:line:text matches, capped globally."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Regular expression" },
                    "path": { "type": "string", "description": "Subdirectory to search (default: project root)" },
                    "max_results": { "type": "integer", "description": "Global cap on matches (default 50)" }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> Result<ToolResult> {
        let req: GrepInput = match serde_json::from_value(input) {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(format!("invalid grep arguments: {e}"))),
        };
        let pattern = match regex::Regex::new(&req.pattern) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(format!("invalid pattern: {e}"))),
        };
        let max = req.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

        let base = match req.path {
            Some(ref p) => self.root.join(p),
            None => self.root.clone(),
        };

        let mut output = String::new();
        scan_dir(&base, &self.root, &pattern, cancel, &mut output);
        if cancel.is_cancelled() {
            return Err(tl_domain::Error::Cancelled);
        }

        if output.is_empty() {
            return Ok(ToolResult::ok("no matches"));
        }
        Ok(ToolResult::ok(enforce_max_results(&output, max)))
    }
}

fn scan_dir(
    dir: &Path,
    root: &Path,
    pattern: &regex::Regex,
    cancel: &CancellationToken,
    output: &mut String,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if cancel.is_cancelled() {
            return;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if path.is_dir() {
            if SKIP_DIRS.contains(&name.as_str()) || name.starts_with('.') {
                continue;
            }
            scan_dir(&path, root, pattern, cancel, output);
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.len() > MAX_SCAN_BYTES {
                continue;
            }
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => continue, // binary or unreadable
        };
        let rel = path.strip_prefix(root).unwrap_or(&path);
        for (idx, line) in content.lines().enumerate() {
            if pattern.is_match(line) {
                output.push_str(&format!("{}:{}:{}\n", rel.display(), idx + 1, line));
            }
        }
    }
}

/// Apply a global cap to line-delimited match output.
///
/// Output with at most `max` match lines is returned unchanged; otherwise
/// the first `max` lines are kept and a summary line is appended.
pub fn enforce_max_results(output: &str, max: usize) -> String {
    let total = output.lines().count();
    if total <= max {
        return output.to_string();
    }
    let mut capped: String = output
        .lines()
        .take(max)
        .map(|l| format!("{l}\n"))
        .collect();
    capped.push_str(&format!("[{max} of {total} matches shown]\n"));
    capped
}
