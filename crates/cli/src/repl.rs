//! Interactive chat REPL.
//!
//! A readline loop that sends each line to the agent and streams the
//! response back. Slash-commands go through the command registry; Ctrl+C
//! during a turn cancels that turn only.

use std::io::Write;

use tokio_util::sync::CancellationToken;

use tl_agent::{ApprovalDecision, CommandAction, TurnEvent};

use crate::bootstrap::Runtime;

pub async fn chat(runtime: Runtime) -> anyhow::Result<()> {
    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".tiller")
        .join("history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("tiller — type /help for commands, Ctrl+D to exit");
    eprintln!();

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if let Some(command_line) = trimmed.strip_prefix('/') {
                    match run_command(&runtime, command_line).await {
                        CommandAction::Quit => break,
                        CommandAction::OpenConfig => {
                            eprintln!("config: {}", runtime.config_path.display());
                        }
                        CommandAction::None => {}
                    }
                    continue;
                }

                run_turn(&runtime, trimmed).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /quit to exit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    runtime.shutdown().await;
    eprintln!("bye");
    Ok(())
}

// ── Slash commands ─────────────────────────────────────────────────

async fn run_command(runtime: &Runtime, command_line: &str) -> CommandAction {
    let (name, args) = match command_line.split_once(' ') {
        Some((name, args)) => (name, args),
        None => (command_line, ""),
    };

    let Some(command) = runtime.commands.get(name) else {
        let candidates = runtime.commands.complete(name);
        if candidates.is_empty() {
            eprintln!("unknown command: /{name}");
        } else {
            eprintln!("unknown command: /{name} (did you mean {candidates:?}?)");
        }
        return CommandAction::None;
    };

    match command.execute(args).await {
        Ok(outcome) => {
            if !outcome.output.is_empty() {
                eprintln!("{}", outcome.output.trim_end());
            }
            outcome.action
        }
        Err(e) => {
            eprintln!("command failed: {e}");
            CommandAction::None
        }
    }
}

// ── Turn streaming ─────────────────────────────────────────────────

async fn run_turn(runtime: &Runtime, message: &str) {
    let cancel = CancellationToken::new();
    let mut rx = runtime.agent.turn(message, cancel.clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n(cancelling turn)");
                cancel.cancel();
            }
            event = rx.recv() => match event {
                None => break,
                Some(event) => render(event).await,
            }
        }
    }
    println!();
}

async fn render(event: TurnEvent) {
    match event {
        TurnEvent::TextDelta { text } => {
            print!("{text}");
            std::io::stdout().flush().ok();
        }
        TurnEvent::ToolCall { name, input, .. } => {
            eprintln!("\n[tool] {name} {input}");
        }
        TurnEvent::ToolResult {
            llm,
            display,
            is_error,
            ..
        } => {
            let shown = if display.is_empty() { &llm } else { &display };
            let mut preview = shown.to_string();
            if preview.len() > 400 {
                let mut end = 400;
                while !preview.is_char_boundary(end) {
                    end -= 1;
                }
                preview.truncate(end);
                preview.push_str(" …");
            }
            let marker = if is_error { "tool error" } else { "tool ok" };
            eprintln!("[{marker}] {preview}");
        }
        TurnEvent::ApprovalRequest {
            name,
            input,
            respond,
            ..
        } => {
            let decision = ask_approval(&name, &input).await;
            let _ = respond.send(decision);
        }
        TurnEvent::Warning { message } => eprintln!("[warn] {message}"),
        TurnEvent::Error { message } => eprintln!("\n[error] {message}"),
        TurnEvent::Done => {}
    }
}

/// Blocking y/N prompt, off the async runtime.
async fn ask_approval(name: &str, input: &serde_json::Value) -> ApprovalDecision {
    eprint!("\nallow tool {name} with input {input}? [y/N] ");
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok();
        line
    })
    .await
    .unwrap_or_default();

    if answer.trim().eq_ignore_ascii_case("y") {
        ApprovalDecision::Approved
    } else {
        ApprovalDecision::Denied { reason: None }
    }
}
