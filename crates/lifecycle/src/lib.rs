//! Lifecycle hooks: skills observe and steer the turn at named phases.
//!
//! Each phase is classified exactly one way — cancellable, modifying, or
//! informational — and dispatch semantics follow the classification:
//!
//! - **Cancellable**: the first handler returning `cancel` wins and stops
//!   further dispatch (a policy skill vetoing a tool call).
//! - **Modifying**: each handler's `modified` map is merged key-wise into
//!   the event data before the next handler runs, so later handlers see
//!   accumulated rewrites.
//! - **Informational**: all handlers run; results are ignored.
//!
//! Handlers run serially in priority order, registration order breaking
//! ties. The handler list is snapshotted before dispatch, so a handler may
//! re-enter the manager (e.g. to register more hooks) without deadlock.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use tl_domain::error::{Error, Result};

pub const PRIORITY_BUILTIN: i32 = 0;
pub const PRIORITY_USER: i32 = 10;
pub const PRIORITY_PROJECT: i32 = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phases
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    OnActivate,
    OnDeactivate,
    OnConversationStart,
    OnBeforePromptBuild,
    OnBeforeToolCall,
    OnAfterToolResult,
    OnAfterResponse,
    OnTurnEnd,
}

/// A phase is exactly one of these; never both cancellable and modifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Cancellable,
    Modifying,
    Informational,
}

impl HookPhase {
    pub fn kind(self) -> PhaseKind {
        match self {
            HookPhase::OnBeforeToolCall => PhaseKind::Cancellable,
            HookPhase::OnBeforePromptBuild
            | HookPhase::OnAfterToolResult
            | HookPhase::OnAfterResponse => PhaseKind::Modifying,
            HookPhase::OnActivate
            | HookPhase::OnDeactivate
            | HookPhase::OnConversationStart
            | HookPhase::OnTurnEnd => PhaseKind::Informational,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::OnActivate => "on_activate",
            HookPhase::OnDeactivate => "on_deactivate",
            HookPhase::OnConversationStart => "on_conversation_start",
            HookPhase::OnBeforePromptBuild => "on_before_prompt_build",
            HookPhase::OnBeforeToolCall => "on_before_tool_call",
            HookPhase::OnAfterToolResult => "on_after_tool_result",
            HookPhase::OnAfterResponse => "on_after_response",
            HookPhase::OnTurnEnd => "on_turn_end",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events and handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a handler sees. `skill_name` is the skill whose handler is being
/// invoked; `data` carries phase-documented keys.
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub phase: HookPhase,
    pub skill_name: String,
    pub data: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct HookResult {
    /// Key-wise overwrites to merge into the event data (modifying phases).
    pub modified: Option<HashMap<String, Value>>,
    /// Stop dispatch and veto the event (cancellable phases).
    pub cancel: bool,
}

impl HookResult {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn cancel() -> Self {
        Self {
            modified: None,
            cancel: true,
        }
    }

    pub fn modify(map: HashMap<String, Value>) -> Self {
        Self {
            modified: Some(map),
            cancel: false,
        }
    }
}

#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, event: &HookEvent) -> Result<HookResult>;
}

/// The accumulated outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub data: HashMap<String, Value>,
    pub cancelled: bool,
    /// Which skill cancelled, when one did.
    pub cancelled_by: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Registration {
    skill: String,
    priority: i32,
    handler: std::sync::Arc<dyn HookHandler>,
}

#[derive(Default)]
pub struct LifecycleManager {
    hooks: RwLock<HashMap<HookPhase, Vec<Registration>>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        phase: HookPhase,
        skill: impl Into<String>,
        priority: i32,
        handler: std::sync::Arc<dyn HookHandler>,
    ) {
        let skill = skill.into();
        tracing::debug!(phase = phase.as_str(), skill = %skill, priority, "hook registered");
        self.hooks.write().entry(phase).or_default().push(Registration {
            skill,
            priority,
            handler,
        });
    }

    /// Remove every hook a skill registered (called on unload).
    pub fn unregister_skill(&self, skill: &str) {
        let mut hooks = self.hooks.write();
        for registrations in hooks.values_mut() {
            registrations.retain(|r| r.skill != skill);
        }
    }

    pub fn handler_count(&self, phase: HookPhase) -> usize {
        self.hooks.read().get(&phase).map_or(0, |v| v.len())
    }

    /// Run a phase's handlers against `data`.
    ///
    /// The registration list is copied under the read lock, then the lock is
    /// released before any handler runs. A handler error aborts dispatch,
    /// wrapped with the offending skill and phase.
    pub async fn dispatch(
        &self,
        phase: HookPhase,
        data: HashMap<String, Value>,
    ) -> Result<DispatchOutcome> {
        let mut snapshot: Vec<(String, i32, std::sync::Arc<dyn HookHandler>)> = {
            let hooks = self.hooks.read();
            hooks
                .get(&phase)
                .map(|regs| {
                    regs.iter()
                        .map(|r| (r.skill.clone(), r.priority, r.handler.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        // Stable: ties keep registration order.
        snapshot.sort_by_key(|(_, priority, _)| *priority);

        let kind = phase.kind();
        let mut outcome = DispatchOutcome {
            data,
            cancelled: false,
            cancelled_by: None,
        };

        for (skill, _, handler) in snapshot {
            let event = HookEvent {
                phase,
                skill_name: skill.clone(),
                data: outcome.data.clone(),
            };
            let result = handler.handle(&event).await.map_err(|e| Error::Hook {
                skill: skill.clone(),
                phase: phase.as_str().into(),
                message: e.to_string(),
            })?;

            match kind {
                PhaseKind::Cancellable => {
                    if result.cancel {
                        tracing::debug!(phase = phase.as_str(), skill = %skill, "hook cancelled dispatch");
                        outcome.cancelled = true;
                        outcome.cancelled_by = Some(skill);
                        return Ok(outcome);
                    }
                }
                PhaseKind::Modifying => {
                    if let Some(modified) = result.modified {
                        for (key, value) in modified {
                            outcome.data.insert(key, value);
                        }
                    }
                }
                PhaseKind::Informational => {}
            }
        }

        Ok(outcome)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Handler that records its invocation order and replays a fixed result.
    struct Recorder {
        label: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
        result: HookResult,
    }

    #[async_trait]
    impl HookHandler for Recorder {
        async fn handle(&self, _event: &HookEvent) -> Result<HookResult> {
            self.order.lock().push(self.label);
            Ok(self.result.clone())
        }
    }

    fn recorder(
        label: &'static str,
        order: &Arc<Mutex<Vec<&'static str>>>,
        result: HookResult,
    ) -> Arc<dyn HookHandler> {
        Arc::new(Recorder {
            label,
            order: order.clone(),
            result,
        })
    }

    #[tokio::test]
    async fn priority_then_registration_order() {
        let manager = LifecycleManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        manager.register(
            HookPhase::OnConversationStart,
            "project",
            PRIORITY_PROJECT,
            recorder("project", &order, HookResult::pass()),
        );
        manager.register(
            HookPhase::OnConversationStart,
            "builtin",
            PRIORITY_BUILTIN,
            recorder("builtin", &order, HookResult::pass()),
        );
        manager.register(
            HookPhase::OnConversationStart,
            "user-a",
            PRIORITY_USER,
            recorder("user-a", &order, HookResult::pass()),
        );
        manager.register(
            HookPhase::OnConversationStart,
            "user-b",
            PRIORITY_USER,
            recorder("user-b", &order, HookResult::pass()),
        );

        manager
            .dispatch(HookPhase::OnConversationStart, HashMap::new())
            .await
            .unwrap();
        assert_eq!(
            *order.lock(),
            vec!["builtin", "user-a", "user-b", "project"]
        );
    }

    #[tokio::test]
    async fn cancellable_stops_at_first_cancel() {
        let manager = LifecycleManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        manager.register(
            HookPhase::OnBeforeToolCall,
            "policy",
            PRIORITY_BUILTIN,
            recorder("policy", &order, HookResult::cancel()),
        );
        manager.register(
            HookPhase::OnBeforeToolCall,
            "later",
            PRIORITY_USER,
            recorder("later", &order, HookResult::pass()),
        );

        let outcome = manager
            .dispatch(HookPhase::OnBeforeToolCall, HashMap::new())
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.cancelled_by.as_deref(), Some("policy"));
        assert_eq!(*order.lock(), vec!["policy"]);
    }

    #[tokio::test]
    async fn modifying_accumulates_across_handlers() {
        /// Asserts it can see the previous handler's write, then adds its own.
        struct SecondModifier;

        #[async_trait]
        impl HookHandler for SecondModifier {
            async fn handle(&self, event: &HookEvent) -> Result<HookResult> {
                assert_eq!(
                    event.data.get("first"),
                    Some(&serde_json::json!("from-first"))
                );
                let mut map = HashMap::new();
                map.insert("second".to_string(), serde_json::json!("from-second"));
                map.insert("first".to_string(), serde_json::json!("overwritten"));
                Ok(HookResult::modify(map))
            }
        }

        let manager = LifecycleManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut first_map = HashMap::new();
        first_map.insert("first".to_string(), serde_json::json!("from-first"));
        manager.register(
            HookPhase::OnAfterToolResult,
            "first",
            PRIORITY_BUILTIN,
            recorder("first", &order, HookResult::modify(first_map)),
        );
        manager.register(
            HookPhase::OnAfterToolResult,
            "second",
            PRIORITY_USER,
            Arc::new(SecondModifier),
        );

        let outcome = manager
            .dispatch(HookPhase::OnAfterToolResult, HashMap::new())
            .await
            .unwrap();
        assert_eq!(outcome.data["first"], serde_json::json!("overwritten"));
        assert_eq!(outcome.data["second"], serde_json::json!("from-second"));
    }

    #[tokio::test]
    async fn handler_error_names_skill_and_phase() {
        struct Failing;

        #[async_trait]
        impl HookHandler for Failing {
            async fn handle(&self, _event: &HookEvent) -> Result<HookResult> {
                Err(Error::Other("disk full".into()))
            }
        }

        let manager = LifecycleManager::new();
        manager.register(
            HookPhase::OnAfterResponse,
            "memory-skill",
            PRIORITY_USER,
            Arc::new(Failing),
        );

        let err = manager
            .dispatch(HookPhase::OnAfterResponse, HashMap::new())
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("memory-skill"));
        assert!(text.contains("on_after_response"));
        assert!(text.contains("disk full"));
    }

    #[tokio::test]
    async fn handlers_may_reenter_the_manager() {
        struct Reentrant {
            manager: Arc<LifecycleManager>,
        }

        #[async_trait]
        impl HookHandler for Reentrant {
            async fn handle(&self, _event: &HookEvent) -> Result<HookResult> {
                // Registering during dispatch must not deadlock.
                struct Noop;
                #[async_trait]
                impl HookHandler for Noop {
                    async fn handle(&self, _e: &HookEvent) -> Result<HookResult> {
                        Ok(HookResult::pass())
                    }
                }
                self.manager.register(
                    HookPhase::OnTurnEnd,
                    "late",
                    PRIORITY_USER,
                    Arc::new(Noop),
                );
                Ok(HookResult::pass())
            }
        }

        let manager = Arc::new(LifecycleManager::new());
        manager.register(
            HookPhase::OnTurnEnd,
            "reentrant",
            PRIORITY_BUILTIN,
            Arc::new(Reentrant {
                manager: manager.clone(),
            }),
        );

        manager
            .dispatch(HookPhase::OnTurnEnd, HashMap::new())
            .await
            .unwrap();
        assert_eq!(manager.handler_count(HookPhase::OnTurnEnd), 2);
    }

    #[tokio::test]
    async fn unregister_skill_removes_all_its_hooks() {
        let manager = LifecycleManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        manager.register(
            HookPhase::OnActivate,
            "gone",
            PRIORITY_USER,
            recorder("gone", &order, HookResult::pass()),
        );
        manager.register(
            HookPhase::OnDeactivate,
            "gone",
            PRIORITY_USER,
            recorder("gone-too", &order, HookResult::pass()),
        );
        manager.unregister_skill("gone");
        assert_eq!(manager.handler_count(HookPhase::OnActivate), 0);
        assert_eq!(manager.handler_count(HookPhase::OnDeactivate), 0);
    }

    #[test]
    fn no_phase_is_both_cancellable_and_modifying() {
        // Kind is total and single-valued by construction; spot-check the
        // documented classifications.
        assert_eq!(HookPhase::OnBeforeToolCall.kind(), PhaseKind::Cancellable);
        assert_eq!(HookPhase::OnBeforePromptBuild.kind(), PhaseKind::Modifying);
        assert_eq!(HookPhase::OnAfterToolResult.kind(), PhaseKind::Modifying);
        assert_eq!(HookPhase::OnAfterResponse.kind(), PhaseKind::Modifying);
        assert_eq!(
            HookPhase::OnConversationStart.kind(),
            PhaseKind::Informational
        );
    }
}
