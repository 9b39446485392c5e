//! Terminal front end
//!
//! Reads stdin line by line. Lines starting with `:` are commands, anything
//! else is an utterance handed to the console recognizer while the session is
//! listening. Status changes and errors are printed as they happen.

use crate::config::Config;
use crate::session::{
    SessionController, SessionHandle, SessionRunner, SessionSnapshot, SessionStateChange,
    SessionStatus, TransitionReason,
};
use crate::speech::{self, ConsoleCapture};
use crate::translation::Translator;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};

const HELP: &str = "Commands: :start, :stop, :export [dir], :log, :help, :quit";

/// A line typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Export(Option<PathBuf>),
    Log,
    Help,
    Quit,
    Unknown(String),
    Utterance(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let Some(command) = line.trim().strip_prefix(':') else {
            return ConsoleCommand::Utterance(line.to_string());
        };

        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let argument = parts.next().map(str::trim).filter(|arg| !arg.is_empty());

        match name {
            "start" => ConsoleCommand::Start,
            "stop" => ConsoleCommand::Stop,
            "export" => ConsoleCommand::Export(argument.map(PathBuf::from)),
            "log" => ConsoleCommand::Log,
            "help" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => ConsoleCommand::Unknown(other.to_string()),
        }
    }
}

/// Run an interactive session until `:quit` or end of input
pub async fn run_console(config: Config) -> anyhow::Result<()> {
    config.validate().context("Invalid configuration")?;

    let translator =
        Translator::from_config(&config.translation).context("Failed to set up translation")?;
    tracing::info!("Translation backend: {}", translator.describe());
    check_backend(&translator).await;

    let output =
        speech::output_from_config(&config.output).context("Failed to set up speech output")?;

    let (lines, line_rx) = mpsc::unbounded_channel();
    let capture = Arc::new(ConsoleCapture::new(line_rx));

    let (controller, signals) =
        SessionController::new(&config, capture, output, Arc::new(translator));
    let (session, task) = SessionRunner::spawn(controller, signals);

    let printer = tokio::spawn(print_changes(session.watch(), session.subscribe()));

    println!("Live translator ready. {}", HELP);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await.context("Failed to read input")? {
        if line.trim().is_empty() {
            continue;
        }

        match ConsoleCommand::parse(&line) {
            ConsoleCommand::Start => session.start()?,
            ConsoleCommand::Stop => session.stop()?,
            ConsoleCommand::Export(dir) => export(&session, dir),
            ConsoleCommand::Log => print_log(&session),
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => break,
            ConsoleCommand::Unknown(name) => println!("Unknown command :{}. {}", name, HELP),
            ConsoleCommand::Utterance(text) => {
                if session.snapshot().status == SessionStatus::Listening {
                    let _ = lines.send(text);
                } else {
                    println!("Not listening. Type :start first.");
                }
            }
        }
    }

    session.shutdown()?;
    task.await.context("Session task failed")?;
    printer.abort();

    tracing::info!("Live translator exiting");
    Ok(())
}

/// Warn early when a local backend is unreachable or missing its model
async fn check_backend(translator: &Translator) {
    let Translator::Ollama(ollama) = translator else {
        return;
    };

    if !ollama.is_available().await {
        tracing::warn!("Ollama is not reachable at {}", ollama.base_url());
        return;
    }

    match ollama.list_models().await {
        Ok(models) if !ollama.has_model(&models) => {
            tracing::warn!(
                "Model {} is not pulled; run `ollama pull {}`",
                ollama.model(),
                ollama.model()
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not list Ollama models: {}", e),
    }
}

async fn print_changes(
    snapshots: watch::Receiver<SessionSnapshot>,
    mut changes: broadcast::Receiver<SessionStateChange>,
) {
    loop {
        let change = match changes.recv().await {
            Ok(change) => change,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Status printer skipped {} changes", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let snapshot = snapshots.borrow().clone();
        match change.reason {
            TransitionReason::TranslationSuccess => {
                if let Some(entry) = snapshot.entries.first() {
                    println!("  {} -> {}", entry.source_text, entry.translated_text);
                }
            }
            TransitionReason::EmptyUtterance | TransitionReason::CaptureRestarted => continue,
            _ => {}
        }

        if change.previous != change.new {
            println!("[{}]", change.new.label());
        }
        if change.new == SessionStatus::Idle {
            if let Some(error) = snapshot.error {
                println!("Error: {}", error);
            }
        }
    }
}

fn export(session: &SessionHandle, dir: Option<PathBuf>) {
    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    match session.export_transcript(&dir) {
        Ok(path) => println!("Transcript saved to {}", path.display()),
        Err(e) => {
            tracing::warn!("Export failed: {}", e);
            println!("{}", e.user_message());
        }
    }
}

fn print_log(session: &SessionHandle) {
    let log = session.log();
    let log = log.read();
    if log.is_empty() {
        println!("No translations yet.");
        return;
    }
    for entry in log.newest_first() {
        println!(
            "{}  {} -> {}",
            entry.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
            entry.source_text,
            entry.translated_text
        );
    }
}
