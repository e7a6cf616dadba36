mod commands;
mod logging;

use std::borrow::Cow::{self, Borrowed, Owned};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use commands::{COMMANDS, Command, Target};
use fanya_application::{ChatEngine, EnginePorts, SendOutcome, StoreEvent};
use fanya_core::config::IdentityConfig;
use fanya_core::message::{LogEntry, MessageId, SenderRole};
use fanya_core::user::CurrentUser;
use fanya_core::{FanyaError, Result as FanyaResult};
use fanya_infrastructure::{ConfigService, InMemoryBackend};
use fanya_interaction::agent_from_config;

/// Ids of log entries already printed, shared by the REPL and the event printer.
type Printed = Arc<Mutex<HashSet<MessageId>>>;

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper {
    commands: Vec<String>,
}

impl CliHelper {
    fn new() -> Self {
        Self {
            commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            let candidates: Vec<Pair> = self
                .commands
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|cmd| Pair {
                    display: cmd.clone(),
                    replacement: cmd.clone(),
                })
                .collect();
            Ok((0, candidates))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for CliHelper {}

// ============================================================================
// Rendering
// ============================================================================

fn print_entry(position: usize, entry: &LogEntry, pinned: bool) {
    let marker = if pinned { "*" } else { " " };
    let prefix = format!("{:>3}{}", position, marker).bright_black();
    let content = &entry.message.content;
    let body = match entry.message.sender_role {
        SenderRole::User if entry.is_pending() => format!("you: {}", content).green().dimmed(),
        SenderRole::User => format!("you: {}", content).green(),
        SenderRole::Agent => content.bright_blue(),
        SenderRole::System => content.red(),
    };
    println!("{} {}", prefix, body);
}

/// Prints the whole bound log and marks every entry as printed.
async fn print_log(engine: &ChatEngine, printed: &Printed) {
    let snapshot = engine.messages().snapshot().await;
    if snapshot.session_id.is_none() {
        println!("{}", "No active session. Type a message to start one.".bright_black());
        return;
    }
    if snapshot.entries.is_empty() {
        println!("{}", "(no messages yet)".bright_black());
    }
    let mut seen = lock(printed);
    for (index, entry) in snapshot.entries.iter().enumerate() {
        print_entry(index + 1, entry, snapshot.pinned.contains(entry.id()));
        seen.insert(entry.id().clone());
    }
}

/// Prints agent and system entries that have not been shown yet.
async fn print_new_entries(engine: &ChatEngine, printed: &Printed) {
    let snapshot = engine.messages().snapshot().await;
    let mut seen = lock(printed);
    for (index, entry) in snapshot.entries.iter().enumerate() {
        if seen.contains(entry.id()) {
            continue;
        }
        seen.insert(entry.id().clone());
        if entry.message.sender_role != SenderRole::User {
            print_entry(index + 1, entry, snapshot.pinned.contains(entry.id()));
        }
    }
}

fn lock(printed: &Printed) -> std::sync::MutexGuard<'_, HashSet<MessageId>> {
    printed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn print_sessions(engine: &ChatEngine) {
    let snapshot = engine.sessions().snapshot().await;
    if let Some(error) = &snapshot.last_error {
        println!("{}", format!("Last error: {}", error).yellow());
    }
    if snapshot.sessions.is_empty() {
        println!("{}", "(no sessions)".bright_black());
        return;
    }
    for (index, session) in snapshot.sessions.iter().enumerate() {
        let active = snapshot.active_id.as_deref() == Some(session.id.as_str());
        let line = format!(
            "{:>3} {} {}{}",
            index + 1,
            if active { ">" } else { " " },
            session.display_name(),
            if session.archived { " [archived]" } else { "" }
        );
        if active {
            println!("{}  {}", line.bright_green(), session.id.bright_black());
        } else {
            println!("{}  {}", line, session.id.bright_black());
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn resolve_session(engine: &ChatEngine, target: &Target) -> FanyaResult<String> {
    match target {
        Target::Id(id) => Ok(id.clone()),
        Target::Index(index) => engine
            .sessions()
            .sessions()
            .await
            .get(index - 1)
            .map(|s| s.id.clone())
            .ok_or_else(|| FanyaError::validation(format!("No session at position {}", index))),
    }
}

async fn resolve_message(engine: &ChatEngine, position: usize) -> FanyaResult<MessageId> {
    engine
        .messages()
        .snapshot()
        .await
        .entries
        .get(position - 1)
        .map(|e| e.id().clone())
        .ok_or_else(|| FanyaError::validation(format!("No message at position {}", position)))
}

fn print_help() {
    let lines = [
        ("<text>", "send a message to the agent"),
        ("/new [name]", "start a new session"),
        ("/sessions", "list sessions"),
        ("/archived", "list sessions including archived ones"),
        ("/switch <n|id>", "open a session"),
        ("/rename <name>", "rename the active session"),
        ("/archive [n|id]", "archive a session (default: active)"),
        ("/unarchive <n|id>", "restore an archived session"),
        ("/pin <n>", "send message n as context with later messages"),
        ("/unpin <n>", "stop sending message n as context"),
        ("/pinned", "show pinned context"),
        ("/log", "show the active session's messages"),
        ("/quit", "exit"),
    ];
    for (usage, description) in lines {
        println!("  {:<20} {}", usage.bright_cyan(), description.bright_black());
    }
}

async fn run_command(engine: &ChatEngine, printed: &Printed, command: Command) -> FanyaResult<()> {
    match command {
        Command::Send(text) => match engine.send(&text).await? {
            SendOutcome::Replied(_) | SendOutcome::Failed(_) => {
                print_new_entries(engine, printed).await;
            }
            SendOutcome::Discarded => {
                println!("{}", "Reply discarded after switching sessions.".bright_black());
            }
        },
        Command::New(name) => {
            let session = engine.create_session(name.as_deref()).await?;
            println!("{}", format!("Started {}", session.display_name()).bright_green());
        }
        Command::Sessions => {
            engine.list_sessions(false).await?;
            print_sessions(engine).await;
        }
        Command::Archived => {
            engine.list_sessions(true).await?;
            print_sessions(engine).await;
        }
        Command::Switch(target) => {
            let session_id = resolve_session(engine, &target).await?;
            engine.select_session(Some(&session_id)).await?;
            let session = engine.sessions().find(&session_id).await?;
            println!("{}", format!("== {} ==", session.display_name()).bright_magenta());
            print_log(engine, printed).await;
        }
        Command::Rename(name) => {
            let Some(active) = engine.sessions().active_id().await else {
                return Err(FanyaError::validation("No active session to rename."));
            };
            let session = engine.rename_session(&active, &name).await?;
            println!("{}", format!("Renamed to {}", session.display_name()).bright_green());
        }
        Command::Archive(target) => {
            let session_id = match target {
                Some(target) => resolve_session(engine, &target).await?,
                None => engine
                    .sessions()
                    .active_id()
                    .await
                    .ok_or_else(|| FanyaError::validation("No active session to archive."))?,
            };
            let session = engine.archive_session(&session_id).await?;
            println!("{}", format!("Archived {}", session.display_name()).bright_green());
        }
        Command::Unarchive(target) => {
            let session_id = resolve_session(engine, &target).await?;
            let session = engine.unarchive_session(&session_id).await?;
            println!("{}", format!("Restored {}", session.display_name()).bright_green());
        }
        Command::Pin(position) => {
            let id = resolve_message(engine, position).await?;
            engine.pin_for_context(&id).await?;
            println!("{}", format!("Pinned message {}", position).bright_green());
        }
        Command::Unpin(position) => {
            let id = resolve_message(engine, position).await?;
            if engine.unpin(&id).await {
                println!("{}", format!("Unpinned message {}", position).bright_green());
            } else {
                println!("{}", format!("Message {} was not pinned", position).bright_black());
            }
        }
        Command::Pinned => {
            let context = engine.messages().context().await;
            if context.is_empty() {
                println!("{}", "(nothing pinned)".bright_black());
            }
            for message in context {
                println!("{} {}", format!("[{}]", message.role).bright_magenta(), message.content);
            }
        }
        Command::Log => print_log(engine, printed).await,
        Command::Help => print_help(),
        Command::Usage(usage) => println!("{}", format!("Usage: {}", usage).yellow()),
        Command::Unknown(name) => {
            println!("{}", format!("Unknown command {}. Try /help", name).bright_black())
        }
        Command::Quit => {}
    }
    Ok(())
}

fn identity(config: &IdentityConfig) -> CurrentUser {
    let mut user = CurrentUser::new(&config.id, &config.email);
    if let Some(name) = &config.name {
        user.metadata = json!({ "name": name });
    }
    user
}

/// The main entry point for the Fanya readline client.
///
/// Runs the engine against the in-process backend: sessions and messages live
/// for the lifetime of the process, and the agent is either the configured
/// webhook or the local echo agent. Push-driven changes are printed by a
/// background task that listens to store events.
#[tokio::main]
async fn main() -> Result<()> {
    // ===== Configuration and logging =====
    let config_service = ConfigService::new()?;
    let config = config_service.load()?;
    let (_log_guard, log_dir) = logging::init(&config.logging)?;
    tracing::info!("[Bootstrap] Config path: {}", config_service.path().display());

    // ===== Engine Initialization =====
    let backend = Arc::new(InMemoryBackend::new());
    let agent = agent_from_config(&config.agent)?;
    let ports = EnginePorts {
        sessions: backend.clone(),
        messages: backend.clone(),
        realtime: backend.clone(),
        agent,
    };
    let engine = Arc::new(ChatEngine::new(ports, &config.engine));
    let printed: Printed = Arc::new(Mutex::new(HashSet::new()));

    let mut events = engine.subscribe();
    let user = identity(&config.identity);
    let greeting = user.display_name();
    engine.set_identity(Some(user)).await?;

    // Spawn store event printer
    let printer = {
        let engine = engine.clone();
        let printed = printed.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(StoreEvent::MessagesChanged { .. }) => {
                        print_new_entries(&engine, &printed).await;
                    }
                    Ok(StoreEvent::ActiveSessionChanged { session_id: None }) => {
                        if let Err(e) = engine.sync_binding().await {
                            tracing::warn!("[Readline] Rebind failed: {}", e);
                        }
                    }
                    Ok(StoreEvent::Alert { message }) => {
                        println!("{}", message.yellow());
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("[Readline] Skipped {} store events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    // ===== REPL Setup =====
    let helper = CliHelper::new();
    let mut rl = Editor::new()?;
    rl.set_helper(Some(helper));

    println!("{}", "=== Fanya ===".bright_magenta().bold());
    println!("{}", format!("Signed in as {}", greeting).bright_black());
    println!(
        "{}",
        format!("Type a message to chat, /help for commands. Logs: {}", log_dir.display())
            .bright_black()
    );
    println!();

    // ===== Main REPL Loop =====
    loop {
        let readline = rl.readline(">> ");

        match readline {
            Ok(line) => {
                let Some(command) = commands::parse(&line) else {
                    continue;
                };
                let _ = rl.add_history_entry(line.as_str());

                if command == Command::Quit {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }

                if let Err(e) = run_command(&engine, &printed, command).await {
                    tracing::debug!("[Readline] Command failed: {}", e);
                    println!("{}", e.user_message().red());
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type '/quit' to exit.".yellow());
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    engine.shutdown().await;
    printer.abort();
    Ok(())
}
