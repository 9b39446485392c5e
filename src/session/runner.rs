//! Session runner
//!
//! Moves a [`SessionController`] onto its own tokio task. User commands and
//! collaborator signals are both queued to that task, so every transition runs
//! on one logical thread. Signals are handled in the order they were sent.
//!
//! Queued commands are served before queued signals. `stop` releases every
//! stage, so any signal still queued behind it carries a dead ticket and is
//! dropped. `start` only acts from `Idle`, where no stage is live and every
//! queued signal is already stale. Serving a command first therefore leaves
//! the session exactly where delivery order would, without running a stage
//! the user has already cancelled.

use super::controller::{
    SessionController, SessionError, SessionSnapshot, SessionStateChange, Signal,
};
use crate::history::{HistoryError, SharedLog};
use crate::translation::TranslationGateway;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Command sent from a [`SessionHandle`] to the session task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    /// Tear the session down and end the task
    Shutdown,
}

/// Spawns session tasks
pub struct SessionRunner;

impl SessionRunner {
    /// Run `controller` on a new task
    ///
    /// `signals` must be the receiver returned by [`SessionController::new`].
    /// The task ends after [`SessionHandle::shutdown`] or once every handle is
    /// dropped; either way the session is torn down first.
    pub fn spawn<G: TranslationGateway>(
        controller: SessionController<G>,
        signals: mpsc::UnboundedReceiver<Signal>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle {
            commands,
            changes: controller.change_sender(),
            snapshot: controller.watch(),
            log: controller.log(),
        };

        let task = tokio::spawn(run_session(controller, command_rx, signals));
        (handle, task)
    }
}

async fn run_session<G: TranslationGateway>(
    mut controller: SessionController<G>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
) {
    tracing::info!("Session task started");

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(SessionCommand::Start) => controller.start(),
                Some(SessionCommand::Stop) => controller.stop(),
                Some(SessionCommand::Shutdown) | None => {
                    controller.teardown();
                    break;
                }
            },

            Some(signal) = signals.recv() => controller.handle_signal(signal),
        }
    }

    tracing::info!("Session task finished");
}

/// Cloneable control surface for a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    changes: broadcast::Sender<SessionStateChange>,
    snapshot: watch::Receiver<SessionSnapshot>,
    log: SharedLog,
}

impl SessionHandle {
    pub fn start(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Start)
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop)
    }

    /// Tear the session down and end its task
    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown)
    }

    /// Current status, error and log
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that resolves whenever the snapshot changes
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Receive every future transition
    pub fn subscribe(&self) -> broadcast::Receiver<SessionStateChange> {
        self.changes.subscribe()
    }

    pub fn log(&self) -> SharedLog {
        self.log.clone()
    }

    /// Write the transcript to a timestamped file in `dir`
    pub fn export_transcript(&self, dir: &Path) -> Result<PathBuf, HistoryError> {
        self.log.read().export_to_file(dir)
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Closed)
    }
}
