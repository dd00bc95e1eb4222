//! Wires the full runtime: tools, MCP servers, skills, memory, the agent,
//! and the operator command registry.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tl_agent::compact::{ProviderSummarizer, SummarizeStrategy, TruncateStrategy};
use tl_agent::{Agent, AgentBuilder, CommandRegistry, Conversation, MemoryEntry, MemoryStore};
use tl_domain::config::{Config, McpServerConfig};
use tl_lifecycle::LifecycleManager;
use tl_mcp_client::{McpClient, McpTool, SseTransport, StdioTransport, Transport};
use tl_provider::Provider;
use tl_skills::SkillLoader;
use tl_tools::builtin::{
    EditFileTool, GrepTool, ListDirTool, NotesTool, ReadFileTool, Scratchpad, ShellTool,
    WriteFileTool,
};
use tl_tools::select::{DeferredPool, ToolSearchTool};
use tl_tools::store::ReadResultTool;
use tl_tools::{ResultStore, ToolRegistry};

use crate::dev_provider::DevProvider;
use crate::ops;

const BASE_INSTRUCTIONS: &str = "You are Tiller, a coding assistant living in the user's \
terminal. You work on the project in the current directory. Prefer small, verifiable \
steps; use tools to read and change files rather than guessing at their contents.";

pub struct Runtime {
    pub agent: Arc<Agent>,
    pub commands: Arc<CommandRegistry>,
    pub memory: Option<Arc<MemoryStore>>,
    pub session_cancel: CancellationToken,
    pub config_path: PathBuf,
    mcp_clients: Vec<Arc<McpClient>>,
}

impl Runtime {
    /// Persist a session insight and close every MCP server.
    pub async fn shutdown(&self) {
        if let Some(memory) = &self.memory {
            let log = self.agent.conversation_snapshot();
            if let Some(last) = log.iter().rev().find(|m| {
                m.role == tl_domain::message::Role::Assistant && !m.text().is_empty()
            }) {
                let mut content = last.text();
                let mut end = content.len().min(500);
                while end > 0 && !content.is_char_boundary(end) {
                    end -= 1;
                }
                content.truncate(end);
                if let Err(e) = memory.append(&[MemoryEntry {
                    tag: "session".into(),
                    content,
                }]) {
                    tracing::warn!(error = %e, "failed to persist session memory");
                }
            }
        }
        self.session_cancel.cancel();
        for client in &self.mcp_clients {
            client.close().await;
        }
    }
}

pub async fn build_runtime(config: Config, config_path: PathBuf) -> anyhow::Result<Runtime> {
    let session_cancel = CancellationToken::new();
    let registry = Arc::new(ToolRegistry::new());
    let store = Arc::new(ResultStore::new(config.tools.result_store_cap));
    let pool = Arc::new(DeferredPool::new());
    let scratchpad = Arc::new(Scratchpad::new());
    let lifecycle = Arc::new(LifecycleManager::new());
    let project_root = std::env::current_dir()?;

    // ── Built-in tools ────────────────────────────────────────────
    registry.register(Arc::new(ShellTool::new(config.tool_timeout("shell"))))?;
    registry.register(Arc::new(ReadFileTool::new(&project_root)))?;
    registry.register(Arc::new(WriteFileTool::new(&project_root)))?;
    registry.register(Arc::new(EditFileTool::new(&project_root)))?;
    registry.register(Arc::new(ListDirTool::new(&project_root)))?;
    registry.register(Arc::new(GrepTool::new(&project_root)))?;
    registry.register(Arc::new(NotesTool::new(scratchpad.clone())))?;
    registry.register(Arc::new(ReadResultTool::new(store.clone())))?;
    registry.register(Arc::new(ToolSearchTool::new(pool.clone())))?;

    // ── MCP servers ───────────────────────────────────────────────
    let mut mcp_clients = Vec::new();
    for (name, server) in &config.mcp_servers {
        match connect_mcp(name, server, &registry, session_cancel.clone()).await {
            Ok(client) => mcp_clients.push(client),
            Err(e) => {
                tracing::warn!(server = %name, error = %e, "skipping MCP server");
            }
        }
    }

    // ── Skills ────────────────────────────────────────────────────
    let skills = match &config.skills_root {
        Some(root) => {
            let loader = SkillLoader::new(
                registry.clone(),
                lifecycle.clone(),
                session_cancel.clone(),
            );
            match loader.scan(root) {
                Ok(names) => {
                    for name in &names {
                        if let Err(e) = loader.load(name).await {
                            tracing::warn!(skill = %name, error = %e, "skill failed to load");
                            continue;
                        }
                        if let Err(e) = loader.activate(name).await {
                            tracing::warn!(skill = %name, error = %e, "skill failed to activate");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "skill scan failed"),
            }
            Some(Arc::new(loader))
        }
        None => None,
    };

    // ── Memory, project notes, conversation ───────────────────────
    let memory = config.memory_path.as_ref().map(|p| Arc::new(MemoryStore::new(p)));
    let insights = match &memory {
        Some(store) => store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load memory");
            Vec::new()
        }),
        None => Vec::new(),
    };
    let project_notes = config
        .project_notes
        .as_ref()
        .and_then(|p| std::fs::read_to_string(p).ok());
    let conversation = Conversation::new(BASE_INSTRUCTIONS)
        .with_insights(insights)
        .with_project_notes(project_notes);

    // ── Provider and compaction ───────────────────────────────────
    let provider: Arc<dyn Provider> = Arc::new(DevProvider::new());
    let summarizer = Arc::new(ProviderSummarizer::new(
        provider.clone(),
        config.model.name.clone(),
    ));

    let mut builder = AgentBuilder::new(provider, config)
        .registry(registry)
        .store(store)
        .pool(pool)
        .lifecycle(lifecycle)
        .scratchpad(scratchpad)
        .strategies(vec![
            Arc::new(SummarizeStrategy::new(summarizer)),
            Arc::new(TruncateStrategy),
        ])
        .conversation(conversation);
    if let Some(skills) = skills {
        builder = builder.skills(skills);
    }
    let agent = builder.build();

    let commands = ops::registry(agent.clone());

    Ok(Runtime {
        agent,
        commands,
        memory,
        session_cancel,
        config_path,
        mcp_clients,
    })
}

async fn connect_mcp(
    name: &str,
    server: &McpServerConfig,
    registry: &Arc<ToolRegistry>,
    cancel: CancellationToken,
) -> anyhow::Result<Arc<McpClient>> {
    let transport: Box<dyn Transport> = match server {
        McpServerConfig::Stdio { command, args, env } => {
            Box::new(StdioTransport::spawn(command, args, env, cancel)?)
        }
        McpServerConfig::Sse { url } => Box::new(SseTransport::connect(url, cancel).await?),
    };

    let client = Arc::new(McpClient::new(name, transport));
    client.initialize().await?;
    let tools = McpTool::discover(client.clone()).await?;
    let count = tools.len();
    for tool in tools {
        registry.register(Arc::new(tool))?;
    }
    tracing::info!(server = %name, tools = count, "MCP server connected");
    Ok(client)
}
