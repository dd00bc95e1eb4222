//! Built-in operator commands.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use tl_agent::{Agent, Command, CommandAction, CommandOutcome, CommandRegistry};
use tl_domain::error::Result;

/// Build the registry with the commands defined by this binary. Skills may
/// contribute more at their own layer.
pub fn registry(agent: Arc<Agent>) -> Arc<CommandRegistry> {
    let registry = Arc::new(CommandRegistry::new());

    let register = |cmd: Arc<dyn Command>| {
        if let Err(e) = registry.register(cmd) {
            tracing::warn!(error = %e, "builtin command registration failed");
        }
    };

    register(Arc::new(QuitCommand { name: "quit" }));
    register(Arc::new(QuitCommand { name: "exit" }));
    register(Arc::new(ClearCommand {
        agent: agent.clone(),
    }));
    register(Arc::new(ModelCommand { agent }));
    register(Arc::new(ConfigCommand));
    register(Arc::new(HelpCommand {
        registry: Arc::downgrade(&registry),
    }));

    registry
}

struct QuitCommand {
    name: &'static str,
}

#[async_trait]
impl Command for QuitCommand {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "Exit the session"
    }
    async fn execute(&self, _args: &str) -> Result<CommandOutcome> {
        Ok(CommandOutcome::action(CommandAction::Quit))
    }
}

struct ClearCommand {
    agent: Arc<Agent>,
}

#[async_trait]
impl Command for ClearCommand {
    fn name(&self) -> &str {
        "clear"
    }
    fn description(&self) -> &str {
        "Drop the conversation history (notes and insights survive)"
    }
    async fn execute(&self, _args: &str) -> Result<CommandOutcome> {
        self.agent.clear_conversation();
        Ok(CommandOutcome::text("conversation cleared"))
    }
}

struct ModelCommand {
    agent: Arc<Agent>,
}

#[async_trait]
impl Command for ModelCommand {
    fn name(&self) -> &str {
        "model"
    }
    fn description(&self) -> &str {
        "Show or switch the model: model [name]"
    }
    async fn execute(&self, args: &str) -> Result<CommandOutcome> {
        let args = args.trim();
        if args.is_empty() {
            return Ok(CommandOutcome::text(format!(
                "current model: {}",
                self.agent.model()
            )));
        }
        self.agent.set_model(args);
        Ok(CommandOutcome::text(format!("model set to {args}")))
    }
}

struct ConfigCommand;

#[async_trait]
impl Command for ConfigCommand {
    fn name(&self) -> &str {
        "config"
    }
    fn description(&self) -> &str {
        "Open the configuration"
    }
    async fn execute(&self, _args: &str) -> Result<CommandOutcome> {
        Ok(CommandOutcome::action(CommandAction::OpenConfig))
    }
}

struct HelpCommand {
    registry: Weak<CommandRegistry>,
}

#[async_trait]
impl Command for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }
    fn description(&self) -> &str {
        "List available commands"
    }
    async fn execute(&self, _args: &str) -> Result<CommandOutcome> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(CommandOutcome::text("no commands registered"));
        };
        let mut out = String::new();
        for command in registry.all() {
            out.push_str(&format!("/{:<12} {}\n", command.name(), command.description()));
        }
        Ok(CommandOutcome::text(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_agent::AgentBuilder;
    use tl_domain::config::Config;
    use tl_provider::scripted::ScriptedProvider;

    fn test_agent() -> Arc<Agent> {
        AgentBuilder::new(Arc::new(ScriptedProvider::new(vec![])), Config::default()).build()
    }

    #[tokio::test]
    async fn builtin_commands_are_registered() {
        let registry = registry(test_agent());
        for name in ["quit", "exit", "clear", "model", "config", "help"] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
    }

    #[tokio::test]
    async fn model_command_switches_model() {
        let agent = test_agent();
        let registry = registry(agent.clone());
        let outcome = registry
            .get("model")
            .unwrap()
            .execute("claude-opus-4")
            .await
            .unwrap();
        assert!(outcome.output.contains("claude-opus-4"));
        assert_eq!(agent.model(), "claude-opus-4");
    }

    #[tokio::test]
    async fn help_lists_all_commands() {
        let registry = registry(test_agent());
        let outcome = registry.get("help").unwrap().execute("").await.unwrap();
        assert!(outcome.output.contains("/quit"));
        assert!(outcome.output.contains("/model"));
    }
}
