//! File operation tools, rooted at the project directory.
//!
//! Relative paths resolve against the root; absolute paths are taken as
//! given (the agent operates on the user's own project, unlike sandboxed
//! skill code). Failures are tool-level errors the model can react to.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tl_domain::error::Result;
use tl_domain::tool::{ToolDefinition, ToolResult};

use crate::tool::Tool;

/// Hard ceiling on a single file read.
const MAX_READ_BYTES: u64 = 4 * 1024 * 1024;

fn resolve(root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// read_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    path: String,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a file and return its contents.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path, relative to the project root" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, input: Value, _cancel: &CancellationToken) -> Result<ToolResult> {
        let req: ReadFileInput = match serde_json::from_value(input) {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(format!("invalid read_file arguments: {e}"))),
        };
        let path = resolve(&self.root, &req.path);

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > MAX_READ_BYTES => {
                return Ok(ToolResult::error(format!(
                    "file is {} bytes, over the {} byte read limit",
                    meta.len(),
                    MAX_READ_BYTES
                )));
            }
            Ok(_) => {}
            Err(e) => return Ok(ToolResult::error(format!("{}: {e}", path.display()))),
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::ok(content)),
            Err(e) => Ok(ToolResult::error(format!("{}: {e}", path.display()))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// write_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[derive(Debug, Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".into(),
            description: "Write content to a file, creating it and any parent directories."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path, relative to the project root" },
                    "content": { "type": "string", "description": "Full file content" }
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn execute(&self, input: Value, _cancel: &CancellationToken) -> Result<ToolResult> {
        let req: WriteFileInput = match serde_json::from_value(input) {
            Ok(r) => r,
            Err(e) => {
                return Ok(ToolResult::error(format!("invalid write_file arguments: {e}")))
            }
        };
        let path = resolve(&self.root, &req.path);

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolResult::error(format!("{}: {e}", parent.display())));
            }
        }
        match tokio::fs::write(&path, &req.content).await {
            Ok(()) => Ok(ToolResult::ok(format!(
                "wrote {} bytes to {}",
                req.content.len(),
                path.display()
            ))),
            Err(e) => Ok(ToolResult::error(format!("{}: {e}", path.display()))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// edit_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EditFileTool {
    root: PathBuf,
}

impl EditFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[derive(Debug, Deserialize)]
struct EditFileInput {
    path: String,
    old_string: String,
    new_string: String,
}

#[async_trait]
impl Tool for EditFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "edit_file".into(),
            description: "Replace one occurrence of old_string with new_string in a file. \
                          old_string must match exactly once."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path, relative to the project root" },
                    "old_string": { "type": "string", "description": "Exact text to replace" },
                    "new_string": { "type": "string", "description": "Replacement text" }
                },
                "required": ["path", "old_string", "new_string"]
            }),
        }
    }

    async fn execute(&self, input: Value, _cancel: &CancellationToken) -> Result<ToolResult> {
        let req: EditFileInput = match serde_json::from_value(input) {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(format!("invalid edit_file arguments: {e}"))),
        };
        let path = resolve(&self.root, &req.path);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("{}: {e}", path.display()))),
        };

        let occurrences = content.matches(&req.old_string).count();
        if occurrences == 0 {
            return Ok(ToolResult::error("old_string not found in file"));
        }
        if occurrences > 1 {
            return Ok(ToolResult::error(format!(
                "old_string matches {occurrences} times; provide more context to make it unique"
            )));
        }

        let updated = content.replacen(&req.old_string, &req.new_string, 1);
        match tokio::fs::write(&path, updated).await {
            Ok(()) => Ok(ToolResult::ok(format!("edited {}", path.display()))),
            Err(e) => Ok(ToolResult::error(format!("{}: {e}", path.display()))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// list_dir
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ListDirTool {
    root: PathBuf,
}

impl ListDirTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_dir".into(),
            description: "List the entries of a directory. Directories get a trailing slash."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory path, relative to the project root (default: the root)" }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, _cancel: &CancellationToken) -> Result<ToolResult> {
        let rel = input
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let path = resolve(&self.root, rel);

        let mut read_dir = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => return Ok(ToolResult::error(format!("{}: {e}", path.display()))),
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();
        Ok(ToolResult::ok(entries.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn read_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let write = WriteFileTool::new(dir.path());
        let read = ReadFileTool::new(dir.path());

        let result = write
            .execute(
                serde_json::json!({ "path": "sub/out.txt", "content": "hello" }),
                &cancel(),
            )
            .await
            .unwrap();
        assert!(!result.is_error);

        let result = read
            .execute(serde_json::json!({ "path": "sub/out.txt" }), &cancel())
            .await
            .unwrap();
        assert_eq!(result.llm, "hello");
    }

    #[tokio::test]
    async fn read_missing_file_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let read = ReadFileTool::new(dir.path());
        let result = read
            .execute(serde_json::json!({ "path": "nope.txt" }), &cancel())
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn edit_requires_unique_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "aaa bbb aaa").unwrap();
        let edit = EditFileTool::new(dir.path());

        let result = edit
            .execute(
                serde_json::json!({ "path": "f.txt", "old_string": "aaa", "new_string": "x" }),
                &cancel(),
            )
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.llm.contains("2 times"));

        let result = edit
            .execute(
                serde_json::json!({ "path": "f.txt", "old_string": "bbb", "new_string": "x" }),
                &cancel(),
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "aaa x aaa"
        );
    }

    #[tokio::test]
    async fn edit_old_string_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "content").unwrap();
        let edit = EditFileTool::new(dir.path());
        let result = edit
            .execute(
                serde_json::json!({ "path": "f.txt", "old_string": "absent", "new_string": "x" }),
                &cancel(),
            )
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.llm.contains("not found"));
    }

    #[tokio::test]
    async fn list_dir_sorts_and_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zdir")).unwrap();
        std::fs::write(dir.path().join("afile"), "x").unwrap();
        let list = ListDirTool::new(dir.path());
        let result = list.execute(serde_json::json!({}), &cancel()).await.unwrap();
        assert_eq!(result.llm, "afile\nzdir/");
    }
}
