//! Operator configuration, loaded from `config.toml`.
//!
//! Everything has a serde default so a missing or partial file still yields
//! a working setup.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: ToolConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    /// MCP servers to connect at startup, keyed by server name.
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// Directory scanned for skill packages.
    #[serde(default)]
    pub skills_root: Option<PathBuf>,
    /// JSONL file of persisted `{tag, content}` insights.
    #[serde(default)]
    pub memory_path: Option<PathBuf>,
    /// Markdown file injected into the system prompt as project notes.
    #[serde(default)]
    pub project_notes: Option<PathBuf>,
    /// Tool names that skip the approval gate.
    #[serde(default)]
    pub pre_approved: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_context_window")]
    pub context_window_tokens: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Default per-tool execution deadline in seconds.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
    /// Per-tool deadline overrides, keyed by tool name.
    #[serde(default)]
    pub timeout_overrides: HashMap<String, u64>,
    /// Maximum entries retained in the offloaded-result store.
    #[serde(default = "default_store_cap")]
    pub result_store_cap: usize,
    /// Fraction of the context window tool descriptors may occupy before
    /// non-core tools are deferred.
    #[serde(default = "default_descriptor_fraction")]
    pub descriptor_budget_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Messages at the tail that are never compacted away.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
}

/// How to reach one MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpServerConfig {
    /// Spawn a child process, JSON lines over stdin/stdout.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// HTTP Server-Sent Events endpoint.
    Sse { url: String },
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_max_turns() -> usize {
    25
}
fn default_context_window() -> usize {
    200_000
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_temperature() -> f32 {
    0.2
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_store_cap() -> usize {
    64
}
fn default_descriptor_fraction() -> f64 {
    0.10
}
fn default_keep_recent() -> usize {
    4
}
fn default_true() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            max_turns: default_max_turns(),
            context_window_tokens: default_context_window(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            timeout_overrides: HashMap::new(),
            result_store_cap: default_store_cap(),
            descriptor_budget_fraction: default_descriptor_fraction(),
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            keep_recent: default_keep_recent(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// The execution deadline for a named tool.
    pub fn tool_timeout(&self, tool_name: &str) -> std::time::Duration {
        let secs = self
            .tools
            .timeout_overrides
            .get(tool_name)
            .copied()
            .unwrap_or(self.tools.timeout_secs);
        std::time::Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.model.max_turns, 25);
        assert_eq!(cfg.tools.timeout_secs, 30);
        assert!(cfg.compaction.enabled);
        assert!(cfg.mcp_servers.is_empty());
    }

    #[test]
    fn parses_mcp_server_table() {
        let cfg = Config::from_toml(
            r#"
            [mcp_servers.github]
            transport = "stdio"
            command = "github-mcp"
            args = ["--readonly"]

            [mcp_servers.docs]
            transport = "sse"
            url = "http://localhost:8808/sse"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mcp_servers.len(), 2);
        match &cfg.mcp_servers["github"] {
            McpServerConfig::Stdio { command, args, .. } => {
                assert_eq!(command, "github-mcp");
                assert_eq!(args, &["--readonly"]);
            }
            _ => panic!("expected stdio"),
        }
    }

    #[test]
    fn timeout_override_wins() {
        let mut cfg = Config::default();
        cfg.tools.timeout_overrides.insert("shell".into(), 120);
        assert_eq!(
            cfg.tool_timeout("shell"),
            std::time::Duration::from_secs(120)
        );
        assert_eq!(
            cfg.tool_timeout("grep"),
            std::time::Duration::from_secs(30)
        );
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(Config::from_toml("model = [").is_err());
    }
}
