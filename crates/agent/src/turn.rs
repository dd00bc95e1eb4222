//! Turn engine — the inner orchestrator that streams provider responses,
//! gates and dispatches tool calls, and loops until a terminal stop.
//!
//! Entry point: [`Agent::turn`] spawns the driver task and returns a
//! channel of [`TurnEvent`]s. The sequence is finite and ends with exactly
//! one `Done` or one `Error`; a cancelled turn ends with `Error` and no
//! `Done`. One turn runs at a time per agent: events for turn N are fully
//! emitted before turn N+1 begins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use tl_domain::budget::{estimate_messages, estimate_text, estimate_tools};
use tl_domain::config::Config;
use tl_domain::error::{Error, Result};
use tl_domain::message::{ContentBlock, Message, Role};
use tl_domain::tool::ToolResult;
use tl_lifecycle::{HookPhase, LifecycleManager};
use tl_provider::{CompletionRequest, Provider, ProviderEvent};
use tl_skills::SkillLoader;
use tl_tools::builtin::Scratchpad;
use tl_tools::result::reduce;
use tl_tools::select::{DeferredPool, ToolSelector};
use tl_tools::{ResultStore, ToolRegistry};

use crate::approval::{ApprovalDecision, PreApproved};
use crate::compact::CompactionStrategy;
use crate::conversation::Conversation;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const PROVIDER_RETRY_BACKOFF: Duration = Duration::from_millis(500);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single agent turn, in emission order.
#[derive(Debug)]
pub enum TurnEvent {
    /// Incremental assistant text.
    TextDelta { text: String },

    /// The model is invoking a tool.
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },

    /// Tool execution result, both views.
    ToolResult {
        id: String,
        llm: String,
        display: String,
        is_error: bool,
    },

    /// The tool call needs operator approval; answer on `respond`.
    /// Dropping the responder counts as denial.
    ApprovalRequest {
        id: String,
        name: String,
        input: Value,
        respond: oneshot::Sender<ApprovalDecision>,
    },

    /// Non-fatal trouble (compaction failure); the turn proceeds.
    Warning { message: String },

    /// Fatal for the turn. Terminal; `Done` will not follow.
    Error { message: String },

    /// Terminal success.
    Done,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    store: Arc<ResultStore>,
    selector: ToolSelector,
    pool: Arc<DeferredPool>,
    lifecycle: Arc<LifecycleManager>,
    scratchpad: Arc<Scratchpad>,
    skills: Option<Arc<SkillLoader>>,
    strategies: Vec<Arc<dyn CompactionStrategy>>,
    pre_approved: PreApproved,
    config: Config,
    model_override: Mutex<Option<String>>,
    conversation: Mutex<Conversation>,
    conversation_started: AtomicBool,
    /// Serializes turns; the driver task holds it until the terminal event
    /// has been sent.
    turn_lock: tokio::sync::Mutex<()>,
}

pub struct AgentBuilder {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    store: Option<Arc<ResultStore>>,
    pool: Arc<DeferredPool>,
    lifecycle: Arc<LifecycleManager>,
    scratchpad: Arc<Scratchpad>,
    skills: Option<Arc<SkillLoader>>,
    strategies: Vec<Arc<dyn CompactionStrategy>>,
    config: Config,
    conversation: Conversation,
}

impl AgentBuilder {
    pub fn new(provider: Arc<dyn Provider>, config: Config) -> Self {
        Self {
            provider,
            registry: Arc::new(ToolRegistry::new()),
            store: None,
            pool: Arc::new(DeferredPool::new()),
            lifecycle: Arc::new(LifecycleManager::new()),
            scratchpad: Arc::new(Scratchpad::new()),
            skills: None,
            strategies: Vec::new(),
            config,
            conversation: Conversation::new("You are a coding assistant."),
        }
    }

    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn store(mut self, store: Arc<ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn pool(mut self, pool: Arc<DeferredPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<LifecycleManager>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn scratchpad(mut self, scratchpad: Arc<Scratchpad>) -> Self {
        self.scratchpad = scratchpad;
        self
    }

    pub fn skills(mut self, skills: Arc<SkillLoader>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn strategies(mut self, strategies: Vec<Arc<dyn CompactionStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn build(self) -> Arc<Agent> {
        let selector = ToolSelector::new(
            self.config.model.context_window_tokens,
            self.config.tools.descriptor_budget_fraction,
        );
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(ResultStore::new(self.config.tools.result_store_cap)));
        let pre_approved = PreApproved::new(self.config.pre_approved.iter().cloned());
        Arc::new(Agent {
            provider: self.provider,
            registry: self.registry,
            store,
            selector,
            pool: self.pool,
            lifecycle: self.lifecycle,
            scratchpad: self.scratchpad,
            skills: self.skills,
            strategies: self.strategies,
            pre_approved,
            config: self.config,
            model_override: Mutex::new(None),
            conversation: Mutex::new(self.conversation),
            conversation_started: AtomicBool::new(false),
            turn_lock: tokio::sync::Mutex::new(()),
        })
    }
}

impl Agent {
    /// Run one turn. Returns the event channel; the sequence terminates
    /// with `Done` or `Error`.
    pub fn turn(
        self: &Arc<Self>,
        user_message: impl Into<String>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let agent = self.clone();
        let user_message = user_message.into();

        tokio::spawn(async move {
            let _guard = agent.turn_lock.lock().await;
            tracing::debug!("turn started");
            match agent.run_turn(user_message, &tx, &cancel).await {
                Ok(()) => {
                    let _ = tx.send(TurnEvent::Done).await;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "turn ended with error");
                    let _ = tx
                        .send(TurnEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        });
        rx
    }

    /// A copy of the conversation log (never an alias).
    pub fn conversation_snapshot(&self) -> Vec<Message> {
        self.conversation.lock().snapshot()
    }

    /// Tool-use ids lacking a matching result, for invariant checks.
    pub fn dangling_tool_uses(&self) -> Vec<String> {
        self.conversation.lock().dangling_tool_uses()
    }

    pub fn result_store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn deferred_pool(&self) -> &Arc<DeferredPool> {
        &self.pool
    }

    /// The model used for the next provider call.
    pub fn model(&self) -> String {
        self.model_override
            .lock()
            .clone()
            .unwrap_or_else(|| self.config.model.name.clone())
    }

    /// Switch models mid-session (the `model <name>` operator command).
    pub fn set_model(&self, name: impl Into<String>) {
        *self.model_override.lock() = Some(name.into());
    }

    /// Drop the whole message log (the `clear` operator command). The
    /// system prompt inputs (insights, notes, scratchpad) survive.
    pub fn clear_conversation(&self) {
        self.conversation.lock().replace_log(Vec::new());
    }

    // ── The loop ───────────────────────────────────────────────────

    async fn run_turn(
        &self,
        user_message: String,
        tx: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.conversation.lock().append(Message::user(user_message));

        if !self.conversation_started.swap(true, Ordering::SeqCst) {
            self.lifecycle
                .dispatch(HookPhase::OnConversationStart, HashMap::new())
                .await?;
        }

        // One provider retry per turn, and only before any text went out.
        let mut provider_retried = false;
        let mut any_text_emitted = false;

        let mut iteration = 0usize;
        loop {
            if iteration >= self.config.model.max_turns {
                return Err(Error::TurnLimit(self.config.model.max_turns));
            }
            iteration += 1;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tracing::debug!(iteration, "loop iteration");

            // ── Prompt-build hook (modifying) ─────────────────────
            let hook_outcome = self
                .lifecycle
                .dispatch(HookPhase::OnBeforePromptBuild, HashMap::new())
                .await?;
            let system_suffix = hook_outcome
                .data
                .get("system_suffix")
                .and_then(|v| v.as_str())
                .map(String::from);

            // ── Tool selection and deferral ───────────────────────
            let snapshot = self.conversation.lock().snapshot();
            let defs = self.registry.definitions();
            let selection = self.selector.select(&defs, &snapshot);
            self.pool.replace(selection.deferred.clone());

            // ── System prompt (rebuilt every iteration) ───────────
            let fragments = self
                .skills
                .as_ref()
                .map(|s| s.prompt_fragments())
                .unwrap_or_default();
            let system = self.conversation.lock().build_system_prompt(
                &self.scratchpad.render(),
                &fragments,
                system_suffix.as_deref(),
            );

            // ── Compaction pipeline ───────────────────────────────
            let mut messages = snapshot;
            let budget = self.config.model.context_window_tokens;
            let fixed = estimate_text(&system) + estimate_tools(&selection.active);
            if self.config.compaction.enabled && fixed + estimate_messages(&messages) > budget {
                for strategy in &self.strategies {
                    if fixed + estimate_messages(&messages) <= budget {
                        break;
                    }
                    match strategy.compact(&messages, &self.config.compaction).await {
                        Ok(Some(reduced)) => messages = reduced,
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx
                                .send(TurnEvent::Warning {
                                    message: format!(
                                        "compaction strategy '{}' failed: {e}",
                                        strategy.name()
                                    ),
                                })
                                .await;
                        }
                    }
                }
                if fixed + estimate_messages(&messages) > budget {
                    let _ = tx
                        .send(TurnEvent::Warning {
                            message: "context still over budget after compaction".into(),
                        })
                        .await;
                }
                self.conversation.lock().replace_log(messages.clone());
            }

            // ── Provider stream ───────────────────────────────────
            let request = CompletionRequest {
                model: self.model(),
                system,
                messages,
                tools: selection.active,
                max_tokens: self.config.model.max_tokens,
                temperature: self.config.model.temperature,
            };

            let (text_buf, tool_uses) = self
                .stream_response(&request, tx, cancel, &mut provider_retried, &mut any_text_emitted)
                .await?;

            // ── Terminal: no tool calls ───────────────────────────
            if tool_uses.is_empty() {
                self.conversation
                    .lock()
                    .append(Message::assistant(text_buf.clone()));
                let mut data = HashMap::new();
                data.insert("response".to_string(), serde_json::json!(text_buf));
                // Side-effect skills (memory persistence); modifications
                // affect persisted artefacts only, events already went out.
                self.lifecycle
                    .dispatch(HookPhase::OnAfterResponse, data)
                    .await?;
                return Ok(());
            }

            // ── Act: run the batch, commit pairs atomically ───────
            let mut assistant_content = Vec::new();
            if !text_buf.is_empty() {
                assistant_content.push(ContentBlock::Text {
                    text: text_buf.clone(),
                });
            }
            for (id, name, input) in &tool_uses {
                assistant_content.push(ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
            }

            let mut results: Vec<(String, ToolResult)> = Vec::new();
            for (id, name, input) in tool_uses {
                let result = self
                    .run_one_tool(&id, &name, input, tx, cancel)
                    .await?;
                results.push((id, result));
            }

            // The assistant message and every matching result enter the log
            // together; a cancellation above left the log untouched.
            {
                let mut conversation = self.conversation.lock();
                conversation.append(Message {
                    role: Role::Assistant,
                    content: assistant_content,
                });
                for (id, result) in results {
                    conversation.append(Message::tool_result(
                        id,
                        result.llm,
                        result.display,
                        result.is_error,
                    ));
                }
            }
        }
    }

    /// Open the provider stream and drive it to `Stop`, forwarding text
    /// deltas. Retries once, with backoff, while nothing has been emitted.
    async fn stream_response(
        &self,
        request: &CompletionRequest,
        tx: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
        provider_retried: &mut bool,
        any_text_emitted: &mut bool,
    ) -> Result<(String, Vec<(String, String, Value)>)> {
        loop {
            let opened = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                opened = self.provider.stream(request) => opened,
            };
            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    if !*provider_retried && !*any_text_emitted {
                        *provider_retried = true;
                        tracing::warn!(error = %e, "provider stream failed, retrying once");
                        tokio::time::sleep(PROVIDER_RETRY_BACKOFF).await;
                        continue;
                    }
                    return Err(e);
                }
            };

            let mut text_buf = String::new();
            let mut tool_uses: Vec<(String, String, Value)> = Vec::new();
            let mut failure: Option<Error> = None;

            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    item = stream.next() => item,
                };
                match item {
                    Some(Ok(ProviderEvent::TextDelta { text })) => {
                        *any_text_emitted = true;
                        text_buf.push_str(&text);
                        let _ = tx.send(TurnEvent::TextDelta { text }).await;
                    }
                    Some(Ok(ProviderEvent::ToolUse { id, name, input })) => {
                        tool_uses.push((id, name, input));
                    }
                    Some(Ok(ProviderEvent::Stop)) | None => break,
                    Some(Ok(ProviderEvent::Error { message })) => {
                        failure = Some(Error::Provider(message));
                        break;
                    }
                    Some(Err(e)) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            match failure {
                None => return Ok((text_buf, tool_uses)),
                Some(e) => {
                    if !*provider_retried && !*any_text_emitted {
                        *provider_retried = true;
                        tracing::warn!(error = %e, "provider stream errored, retrying once");
                        tokio::time::sleep(PROVIDER_RETRY_BACKOFF).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Gate, approve, execute, reduce, and post-process one tool call.
    /// Returns the result that will enter the conversation.
    async fn run_one_tool(
        &self,
        id: &str,
        name: &str,
        input: Value,
        tx: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let _ = tx
            .send(TurnEvent::ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                input: input.clone(),
            })
            .await;

        // Veto hook (cancellable). A veto synthesizes a result; the model
        // sees why the call never ran.
        let mut gate_data = HashMap::new();
        gate_data.insert("tool".to_string(), serde_json::json!(name));
        gate_data.insert("input".to_string(), input.clone());
        let gate = self
            .lifecycle
            .dispatch(HookPhase::OnBeforeToolCall, gate_data)
            .await?;

        let raw = if gate.cancelled {
            ToolResult::ok(format!(
                "tool call was skipped: vetoed by skill '{}'",
                gate.cancelled_by.as_deref().unwrap_or("unknown")
            ))
        } else {
            match self.request_approval(id, name, &input, tx, cancel).await? {
                ApprovalDecision::Approved => self.execute_tool(name, input, cancel).await?,
                ApprovalDecision::Denied { reason } => ToolResult::ok(match reason {
                    Some(reason) => format!("tool call denied by the operator: {reason}"),
                    None => "tool call denied by the operator".to_string(),
                }),
            }
        };

        let reduced = reduce(&self.store, raw);

        // Result-rewrite hook (modifying).
        let mut result_data = HashMap::new();
        result_data.insert("tool".to_string(), serde_json::json!(name));
        result_data.insert("llm".to_string(), serde_json::json!(reduced.llm));
        result_data.insert("display".to_string(), serde_json::json!(reduced.display));
        result_data.insert("is_error".to_string(), serde_json::json!(reduced.is_error));
        let merged = self
            .lifecycle
            .dispatch(HookPhase::OnAfterToolResult, result_data)
            .await?;

        let final_result = ToolResult {
            llm: merged
                .data
                .get("llm")
                .and_then(|v| v.as_str())
                .unwrap_or(&reduced.llm)
                .to_string(),
            display: merged
                .data
                .get("display")
                .and_then(|v| v.as_str())
                .unwrap_or(&reduced.display)
                .to_string(),
            is_error: merged
                .data
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(reduced.is_error),
        };

        let _ = tx
            .send(TurnEvent::ToolResult {
                id: id.to_string(),
                llm: final_result.llm.clone(),
                display: final_result.display.clone(),
                is_error: final_result.is_error,
            })
            .await;

        Ok(final_result)
    }

    async fn request_approval(
        &self,
        id: &str,
        name: &str,
        input: &Value,
        tx: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<ApprovalDecision> {
        if self.pre_approved.contains(name) {
            return Ok(ApprovalDecision::Approved);
        }

        let (respond, decision) = oneshot::channel();
        let _ = tx
            .send(TurnEvent::ApprovalRequest {
                id: id.to_string(),
                name: name.to_string(),
                input: input.clone(),
                respond,
            })
            .await;

        let decision = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            decision = decision => decision,
        };
        // A dropped responder counts as denial, not as failure.
        Ok(decision.unwrap_or(ApprovalDecision::Denied { reason: None }))
    }

    async fn execute_tool(
        &self,
        name: &str,
        input: Value,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let Some(tool) = self.registry.get(name) else {
            return Ok(ToolResult::error(format!("unknown tool: {name}")));
        };
        let deadline = self.config.tool_timeout(name);

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(deadline) => Ok(ToolResult::error(format!(
                "tool '{name}' timed out after {}s",
                deadline.as_secs()
            ))),
            // Ok(result) may carry a tool-level error for the model;
            // Err(_) is a host-level fault and is fatal for the turn.
            result = tool.execute(input, cancel) => result,
        }
    }
}
