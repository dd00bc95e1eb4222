use serde::{Deserialize, Serialize};

/// Hard cap on the model-facing view of a tool result (bytes).
pub const LLM_RESULT_MAX: usize = 30 * 1024;

/// Hard cap on the operator-facing view of a tool result (bytes).
pub const DISPLAY_RESULT_MAX: usize = 100 * 1024;

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// The outcome of executing a tool.
///
/// `llm` is capped at [`LLM_RESULT_MAX`] and feeds back into the
/// conversation; `display` is capped at [`DISPLAY_RESULT_MAX`] and goes to
/// the operator. `is_error` marks tool-level failure, which is distinct from
/// a transport failure (those never reach the model as results).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub llm: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(llm: impl Into<String>) -> Self {
        Self {
            llm: llm.into(),
            display: String::new(),
            is_error: false,
        }
    }

    pub fn error(llm: impl Into<String>) -> Self {
        Self {
            llm: llm.into(),
            display: String::new(),
            is_error: true,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    /// The operator-facing view, falling back to `llm` when `display` is empty.
    pub fn display_or_llm(&self) -> &str {
        if self.display.is_empty() {
            &self.llm
        } else {
            &self.display
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Categories
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed set of tool categories, derived from tool names.
/// Drives prompt selection and budget deferral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Core,
    Filesystem,
    Platform,
    Mcp,
    Skill,
}

/// Tools that must be present in every prompt regardless of budget.
const CORE_TOOLS: &[&str] = &["shell", "notes", "read_result", "tool_search"];

const FILESYSTEM_TOOLS: &[&str] = &["read_file", "write_file", "edit_file", "list_dir", "grep"];

impl ToolCategory {
    /// Derive the category from a tool name.
    pub fn from_name(name: &str) -> Self {
        if CORE_TOOLS.contains(&name) {
            ToolCategory::Core
        } else if FILESYSTEM_TOOLS.contains(&name) || name.starts_with("file_") {
            ToolCategory::Filesystem
        } else if name.starts_with("platform_") {
            ToolCategory::Platform
        } else if name.starts_with("mcp_") {
            ToolCategory::Mcp
        } else {
            ToolCategory::Skill
        }
    }

    pub fn is_core(self) -> bool {
        self == ToolCategory::Core
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_derivation() {
        assert_eq!(ToolCategory::from_name("shell"), ToolCategory::Core);
        assert_eq!(ToolCategory::from_name("tool_search"), ToolCategory::Core);
        assert_eq!(
            ToolCategory::from_name("read_file"),
            ToolCategory::Filesystem
        );
        assert_eq!(
            ToolCategory::from_name("platform_xcode_build"),
            ToolCategory::Platform
        );
        assert_eq!(
            ToolCategory::from_name("mcp_github_search"),
            ToolCategory::Mcp
        );
        assert_eq!(
            ToolCategory::from_name("summarize-pr"),
            ToolCategory::Skill
        );
    }

    #[test]
    fn display_falls_back_to_llm() {
        let r = ToolResult::ok("hello");
        assert_eq!(r.display_or_llm(), "hello");
        let r = r.with_display("rich");
        assert_eq!(r.display_or_llm(), "rich");
    }
}
