//! Skill backends: how a manifest turns into live tools and hooks.
//!
//! One polymorphic capability set — load, contribute, unload — with three
//! implementations chosen by the manifest's `backend` field:
//! `in-process` (a registered Rust adapter), `subprocess-rpc` (an MCP
//! server over child stdio), and `sandboxed-script` (see [`crate::script`]).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tl_domain::error::{Error, Result};
use tl_domain::permission::Permission;
use tl_lifecycle::{HookHandler, HookPhase};
use tl_mcp_client::{McpClient, McpTool, StdioTransport};
use tl_tools::tool::Tool;

use crate::manifest::{BackendKind, SkillManifest};
use crate::permission::PermissionChecker;
use crate::script::SandboxedScriptBackend;

/// A hook offered by a skill, to be registered with the lifecycle manager.
pub struct HookContribution {
    pub phase: HookPhase,
    pub priority: i32,
    pub handler: Arc<dyn HookHandler>,
}

/// Everything a loaded skill adds to the session.
#[derive(Default)]
pub struct SkillContribution {
    pub tools: Vec<Arc<dyn Tool>>,
    pub hooks: Vec<HookContribution>,
    pub prompt_fragment: Option<String>,
}

#[async_trait]
pub trait SkillBackend: Send + Sync {
    /// Instantiate the backend's tools and hooks. The checker is the
    /// skill's permission gate; backends must consult it before acquiring
    /// any capability.
    async fn load(
        &self,
        manifest: &SkillManifest,
        checker: Arc<PermissionChecker>,
    ) -> Result<SkillContribution>;

    /// Tear the backend down (kill subprocesses, drop interpreters).
    async fn unload(&self);
}

/// Build the backend for a manifest.
pub fn create_backend(
    manifest: &SkillManifest,
    skill_dir: &Path,
    adapters: &HashMap<String, Arc<dyn InProcessSkill>>,
    cancel: CancellationToken,
) -> Result<Box<dyn SkillBackend>> {
    match manifest.backend {
        BackendKind::InProcess => {
            let entrypoint = manifest
                .entrypoint
                .as_deref()
                .ok_or_else(|| Error::Config("in-process skill missing entrypoint".into()))?;
            let adapter = adapters
                .get(entrypoint)
                .cloned()
                .ok_or_else(|| Error::Config(format!("no in-process adapter '{entrypoint}'")))?;
            Ok(Box::new(InProcessBackend { adapter }))
        }
        BackendKind::SubprocessRpc => Ok(Box::new(SubprocessRpcBackend {
            client: tokio::sync::Mutex::new(None),
            cancel,
        })),
        BackendKind::SandboxedScript => {
            Ok(Box::new(SandboxedScriptBackend::new(skill_dir.to_path_buf())))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-process
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Host-registered adapter constructing a contribution directly.
pub trait InProcessSkill: Send + Sync {
    fn build(
        &self,
        manifest: &SkillManifest,
        checker: Arc<PermissionChecker>,
    ) -> Result<SkillContribution>;
}

struct InProcessBackend {
    adapter: Arc<dyn InProcessSkill>,
}

#[async_trait]
impl SkillBackend for InProcessBackend {
    async fn load(
        &self,
        manifest: &SkillManifest,
        checker: Arc<PermissionChecker>,
    ) -> Result<SkillContribution> {
        self.adapter.build(manifest, checker)
    }

    async fn unload(&self) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Subprocess JSON-RPC (MCP)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Spawns the manifest's entrypoint as an MCP server and contributes every
/// discovered remote tool. Spawning a process is a `shell:exec` capability.
struct SubprocessRpcBackend {
    client: tokio::sync::Mutex<Option<Arc<McpClient>>>,
    cancel: CancellationToken,
}

#[async_trait]
impl SkillBackend for SubprocessRpcBackend {
    async fn load(
        &self,
        manifest: &SkillManifest,
        checker: Arc<PermissionChecker>,
    ) -> Result<SkillContribution> {
        checker
            .check(Permission::ShellExec)
            .map_err(|e| Error::Other(e.to_string()))?;

        let entrypoint = manifest
            .entrypoint
            .as_deref()
            .ok_or_else(|| Error::Config("subprocess-rpc skill missing entrypoint".into()))?;
        let mut parts = entrypoint.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| Error::Config("empty subprocess-rpc entrypoint".into()))?;
        let args: Vec<String> = parts.map(String::from).collect();

        let transport = StdioTransport::spawn(
            command,
            &args,
            &HashMap::new(),
            self.cancel.clone(),
        )
        .map_err(|e| Error::Other(format!("spawn {command}: {e}")))?;

        let name = manifest.skill_name()?;
        let client = Arc::new(McpClient::new(name, Box::new(transport)));
        client
            .initialize()
            .await
            .map_err(|e| Error::Other(format!("mcp {name}: {e}")))?;

        let tools = McpTool::discover(client.clone()).await?;
        tracing::debug!(skill = name, tools = tools.len(), "subprocess skill loaded");

        *self.client.lock().await = Some(client);
        Ok(SkillContribution {
            tools: tools
                .into_iter()
                .map(|t| Arc::new(t) as Arc<dyn Tool>)
                .collect(),
            hooks: Vec::new(),
            prompt_fragment: None,
        })
    }

    async fn unload(&self) {
        if let Some(client) = self.client.lock().await.take() {
            client.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyAdapter;

    impl InProcessSkill for EmptyAdapter {
        fn build(
            &self,
            _manifest: &SkillManifest,
            _checker: Arc<PermissionChecker>,
        ) -> Result<SkillContribution> {
            Ok(SkillContribution::default())
        }
    }

    #[test]
    fn factory_rejects_unknown_adapter() {
        let manifest = SkillManifest {
            name: Some("x".into()),
            backend: BackendKind::InProcess,
            entrypoint: Some("missing".into()),
            ..Default::default()
        };
        let err = create_backend(
            &manifest,
            Path::new("/tmp"),
            &HashMap::new(),
            CancellationToken::new(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn factory_finds_registered_adapter() {
        let manifest = SkillManifest {
            name: Some("x".into()),
            backend: BackendKind::InProcess,
            entrypoint: Some("empty".into()),
            ..Default::default()
        };
        let mut adapters: HashMap<String, Arc<dyn InProcessSkill>> = HashMap::new();
        adapters.insert("empty".into(), Arc::new(EmptyAdapter));
        assert!(create_backend(
            &manifest,
            Path::new("/tmp"),
            &adapters,
            CancellationToken::new()
        )
        .is_ok());
    }

    #[tokio::test]
    async fn subprocess_backend_requires_shell_exec() {
        let manifest = SkillManifest {
            name: Some("srv".into()),
            backend: BackendKind::SubprocessRpc,
            entrypoint: Some("true".into()),
            ..Default::default()
        };
        let backend = create_backend(
            &manifest,
            Path::new("/tmp"),
            &HashMap::new(),
            CancellationToken::new(),
        )
        .unwrap();
        let checker = Arc::new(PermissionChecker::new("srv", []));
        let err = backend.load(&manifest, checker).await.err().unwrap();
        assert!(err.to_string().contains("shell:exec"));
    }
}
