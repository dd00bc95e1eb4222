//! `tiller` — a terminal-resident coding assistant.

mod bootstrap;
mod dev_provider;
mod ops;
mod repl;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tl_agent::TurnEvent;
use tl_domain::config::Config;

#[derive(Debug, Parser)]
#[command(name = "tiller", version, about = "Terminal coding assistant")]
struct Cli {
    /// Path to config.toml (default: ~/.config/tiller/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat (default when no subcommand is given).
    Chat,
    /// Send a single message and print the final answer. Exits non-zero
    /// when the turn fails.
    Run {
        /// The message to send.
        message: String,
    },
    /// Print the resolved configuration.
    Config,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tiller")
        .join("config.toml")
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        Ok(Config::from_toml(&content)?)
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tiller=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path)?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            let runtime = bootstrap::build_runtime(config, config_path).await?;
            repl::chat(runtime).await
        }
        Command::Run { message } => {
            let runtime = bootstrap::build_runtime(config, config_path).await?;
            run_headless(runtime, message).await
        }
        Command::Config => {
            println!("config path: {}", config_path.display());
            println!("{}", toml_or_default(&config_path));
            Ok(())
        }
    }
}

fn toml_or_default(path: &PathBuf) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|_| "(not present; using defaults)".into())
}

/// Headless mode: one turn, final text on stdout, exit 1 on turn failure.
async fn run_headless(runtime: bootstrap::Runtime, message: String) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let mut rx = runtime.agent.turn(message, cancel);

    let mut failed = false;
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::TextDelta { text } => print!("{text}"),
            TurnEvent::ApprovalRequest { name, respond, .. } => {
                // Headless runs approve nothing; the model sees the denial.
                tracing::info!(tool = %name, "denying tool call in headless mode");
                let _ = respond.send(tl_agent::ApprovalDecision::Denied {
                    reason: Some("headless mode".into()),
                });
            }
            TurnEvent::Warning { message } => tracing::warn!("{message}"),
            TurnEvent::Error { message } => {
                eprintln!("error: {message}");
                failed = true;
            }
            TurnEvent::ToolCall { .. } | TurnEvent::ToolResult { .. } | TurnEvent::Done => {}
        }
    }
    println!();

    runtime.shutdown().await;
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
