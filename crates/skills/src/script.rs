//! Sandboxed-script backend.
//!
//! The entrypoint is a script inside the skill directory. Loading verifies
//! it resolves within the sandbox; each invocation runs it through the
//! sandbox's exec (skill dir as working directory, 30 s wall-clock cap)
//! with the tool input JSON on stdin. Stdout becomes the result text.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tl_domain::error::{Error, Result};
use tl_domain::permission::Permission;
use tl_domain::tool::{ToolDefinition, ToolResult};
use tl_tools::tool::Tool;

use crate::backend::{SkillBackend, SkillContribution};
use crate::manifest::SkillManifest;
use crate::permission::PermissionChecker;
use crate::sandbox::{Sandbox, SandboxError};

pub struct SandboxedScriptBackend {
    skill_dir: PathBuf,
}

impl SandboxedScriptBackend {
    pub fn new(skill_dir: PathBuf) -> Self {
        Self { skill_dir }
    }
}

#[async_trait]
impl SkillBackend for SandboxedScriptBackend {
    async fn load(
        &self,
        manifest: &SkillManifest,
        checker: Arc<PermissionChecker>,
    ) -> Result<SkillContribution> {
        checker
            .check(Permission::ShellExec)
            .map_err(|e| Error::Other(e.to_string()))?;

        let name = manifest.skill_name()?;
        let entrypoint = manifest
            .entrypoint
            .as_deref()
            .ok_or_else(|| Error::Config("sandboxed-script skill missing entrypoint".into()))?;

        let sandbox = Sandbox::new(&self.skill_dir)
            .map_err(|e| Error::Other(format!("sandbox for {name}: {e}")))?;
        // The script must live inside the package; a symlink pointing out
        // of it is rejected here, before anything runs.
        let script = sandbox
            .resolve(entrypoint)
            .map_err(|e| Error::Other(format!("entrypoint for {name}: {e}")))?;

        let tool = ScriptTool {
            name: format!("skill_{}", name.replace('-', "_")),
            description: manifest
                .description
                .clone()
                .unwrap_or_else(|| format!("Run the {name} skill")),
            sandbox: Arc::new(sandbox),
            script,
        };

        Ok(SkillContribution {
            tools: vec![Arc::new(tool)],
            hooks: Vec::new(),
            prompt_fragment: None,
        })
    }

    async fn unload(&self) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The contributed tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ScriptTool {
    name: String,
    description: String,
    sandbox: Arc<Sandbox>,
    script: PathBuf,
}

#[async_trait]
impl Tool for ScriptTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": true
            }),
        }
    }

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> Result<ToolResult> {
        let stdin = input.to_string();
        let command = format!("sh '{}'", self.script.display());

        match self.sandbox.exec(&command, Some(&stdin), cancel).await {
            Ok((output, true)) => Ok(ToolResult::ok(output)),
            Ok((output, false)) => Ok(ToolResult::error(output)),
            Err(SandboxError::Cancelled) => Err(Error::Cancelled),
            // Sandbox violations and timeouts are tool-level failures.
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}
