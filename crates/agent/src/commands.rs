//! Operator command registry — parallel to tools but operator-facing.
//!
//! Commands never touch the conversation unless their handler is wired to
//! do so; execution is entirely independent of the turn engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use tl_domain::error::{Error, Result};

/// What the host should do after running a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    None,
    Quit,
    OpenConfig,
}

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub output: String,
    pub action: CommandAction,
}

impl CommandOutcome {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            action: CommandAction::None,
        }
    }

    pub fn action(action: CommandAction) -> Self {
        Self {
            output: String::new(),
            action,
        }
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Completion candidates for the argument text (not the command name).
    fn complete(&self, _args: &str) -> Vec<String> {
        Vec::new()
    }

    async fn execute(&self, args: &str) -> Result<CommandOutcome>;
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Names are stored lowercase; duplicates fail.
    pub fn register(&self, command: Arc<dyn Command>) -> Result<()> {
        let name = command.name().to_lowercase();
        let mut commands = self.commands.write();
        if commands.contains_key(&name) {
            return Err(Error::Config(format!("command '{name}' already registered")));
        }
        commands.insert(name, command);
        Ok(())
    }

    /// Case-insensitive exact lookup.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.read().get(&name.to_lowercase()).cloned()
    }

    /// Case-insensitive prefix completion, name-sorted.
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_lowercase();
        let mut names: Vec<String> = self
            .commands
            .read()
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// All commands, name-sorted, for help output.
    pub fn all(&self) -> Vec<Arc<dyn Command>> {
        let mut commands: Vec<_> = self.commands.read().values().cloned().collect();
        commands.sort_by(|a, b| a.name().cmp(b.name()));
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Static {
        name: &'static str,
        action: CommandAction,
    }

    #[async_trait]
    impl Command for Static {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test command"
        }
        async fn execute(&self, _args: &str) -> Result<CommandOutcome> {
            Ok(CommandOutcome::action(self.action))
        }
    }

    fn registry() -> CommandRegistry {
        let registry = CommandRegistry::new();
        for name in ["quit", "clear", "config", "help"] {
            registry
                .register(Arc::new(Static {
                    name,
                    action: CommandAction::None,
                }))
                .unwrap();
        }
        registry
    }

    #[test]
    fn prefix_completion_is_sorted_and_case_insensitive() {
        let registry = registry();
        assert_eq!(registry.complete("c"), vec!["clear", "config"]);
        assert_eq!(registry.complete("C"), vec!["clear", "config"]);
        assert_eq!(registry.complete(""), vec!["clear", "config", "help", "quit"]);
        assert!(registry.complete("zz").is_empty());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = registry();
        assert!(registry.get("QUIT").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = registry();
        assert!(registry
            .register(Arc::new(Static {
                name: "quit",
                action: CommandAction::Quit,
            }))
            .is_err());
    }

    #[tokio::test]
    async fn execute_returns_action() {
        let registry = CommandRegistry::new();
        registry
            .register(Arc::new(Static {
                name: "quit",
                action: CommandAction::Quit,
            }))
            .unwrap();
        let outcome = registry.get("quit").unwrap().execute("").await.unwrap();
        assert_eq!(outcome.action, CommandAction::Quit);
    }
}
