//! Session controller
//!
//! Owns the state machine, the capture and output handles, the in-flight
//! translation request and the translation log. It is the only writer of all
//! of them. Collaborators report back through [`Signal`]s which the owner of
//! the controller feeds into [`SessionController::handle_signal`].

use super::state::{
    SessionAction, SessionEvent, SessionStateMachine, SessionStatus, TransitionReason,
};
use crate::config::{CaptureConfig, Config};
use crate::history::{SharedLog, TranslationLog, TranslationLogEntry};
use crate::speech::{
    CaptureEvent, CaptureEvents, CaptureHandle, OutputEvent, OutputEvents, OutputHandle,
    Registration, SpeechCapture, SpeechError, SpeechOutput,
};
use crate::translation::{GatewayError, TranslationGateway};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Capacity of the state change broadcast channel
const STATE_CHANGE_CAPACITY: usize = 64;

/// Identifies one capture activation, output utterance or gateway request
///
/// Every signal carries the ticket of the stage that produced it. A signal
/// whose ticket does not match the live stage is stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Event enqueued for the controller by a collaborator
#[derive(Debug)]
pub enum Signal {
    Capture {
        ticket: Ticket,
        event: CaptureEvent,
    },
    Output {
        ticket: Ticket,
        event: OutputEvent,
    },
    Translation {
        ticket: Ticket,
        source: String,
        outcome: Result<String, GatewayError>,
    },
}

/// Error types for session operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Speech(#[from] SpeechError),

    #[error("No async runtime is available to run the translation request")]
    NoRuntime,

    #[error("The session has shut down")]
    Closed,
}

impl SessionError {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Speech(e) => e.user_message(),
            SessionError::NoRuntime => "Sorry, something went wrong. Please try again.".to_string(),
            SessionError::Closed => "The translation session is no longer running.".to_string(),
        }
    }
}

/// Broadcast on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStateChange {
    pub previous: SessionStatus,
    pub new: SessionStatus,
    pub reason: TransitionReason,
}

/// Everything a presentation layer needs to render the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// Label for `status`
    pub label: String,
    /// Last error, cleared when listening starts again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Log entries, newest first
    pub entries: Vec<TranslationLogEntry>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            label: SessionStatus::Idle.label().to_string(),
            error: None,
            entries: Vec::new(),
        }
    }
}

struct CaptureSlot {
    ticket: Ticket,
    registration: Registration,
    handle: Box<dyn CaptureHandle>,
}

struct OutputSlot {
    ticket: Ticket,
    registration: Registration,
    handle: Box<dyn OutputHandle>,
}

struct PendingTranslation {
    ticket: Ticket,
    task: JoinHandle<()>,
}

/// Drives one translation session
pub struct SessionController<G: TranslationGateway> {
    machine: SessionStateMachine,
    capture_config: CaptureConfig,
    output_language: String,
    translation_timeout: Duration,
    capture: Arc<dyn SpeechCapture>,
    output: Arc<dyn SpeechOutput>,
    gateway: Arc<G>,
    signals: mpsc::UnboundedSender<Signal>,
    next_ticket: u64,
    capture_slot: Option<CaptureSlot>,
    output_slot: Option<OutputSlot>,
    translation: Option<PendingTranslation>,
    last_error: Option<String>,
    log: SharedLog,
    changes: broadcast::Sender<SessionStateChange>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl<G: TranslationGateway> SessionController<G> {
    /// Create an idle controller
    ///
    /// Returns the receiving end of the signal queue. Everything read from it
    /// must be passed to [`handle_signal`](Self::handle_signal).
    pub fn new(
        config: &Config,
        capture: Arc<dyn SpeechCapture>,
        output: Arc<dyn SpeechOutput>,
        gateway: Arc<G>,
    ) -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        let (changes, _) = broadcast::channel(STATE_CHANGE_CAPACITY);
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        let log = TranslationLog::new(
            config.translation.source_language.clone(),
            config.translation.target_language.clone(),
        )
        .shared();

        let controller = Self {
            machine: SessionStateMachine::new(),
            capture_config: config.capture.clone(),
            output_language: config.output.language.clone(),
            translation_timeout: config.translation.timeout(),
            capture,
            output,
            gateway,
            signals,
            next_ticket: 0,
            capture_slot: None,
            output_slot: None,
            translation: None,
            last_error: None,
            log,
            changes,
            snapshots,
        };
        (controller, receiver)
    }

    pub fn status(&self) -> SessionStatus {
        self.machine.status()
    }

    /// Last user-facing error, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Shared view of the translation log
    pub fn log(&self) -> SharedLog {
        Arc::clone(&self.log)
    }

    /// Receive every future transition
    pub fn subscribe(&self) -> broadcast::Receiver<SessionStateChange> {
        self.changes.subscribe()
    }

    /// Watch the current snapshot
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub(crate) fn change_sender(&self) -> broadcast::Sender<SessionStateChange> {
        self.changes.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status();
        SessionSnapshot {
            status,
            label: status.label().to_string(),
            error: self.last_error.clone(),
            entries: self.log.read().newest_first().cloned().collect(),
        }
    }

    pub fn holds_capture(&self) -> bool {
        self.capture_slot.is_some()
    }

    pub fn holds_output(&self) -> bool {
        self.output_slot.is_some()
    }

    pub fn translation_in_flight(&self) -> bool {
        self.translation.is_some()
    }

    /// Begin listening; ignored unless the session is idle
    pub fn start(&mut self) {
        self.dispatch(SessionEvent::Start);
    }

    /// Return to idle, releasing every handle; safe to call repeatedly
    pub fn stop(&mut self) {
        self.dispatch(SessionEvent::Stop);
    }

    /// Same as [`stop`](Self::stop), for disposal of the owner
    pub fn teardown(&mut self) {
        self.dispatch(SessionEvent::Teardown);
    }

    /// Apply a signal from a collaborator
    pub fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Capture { ticket, event } => {
                if self.capture_slot.as_ref().map(|slot| slot.ticket) != Some(ticket) {
                    tracing::debug!("Dropping stale capture event {:?}", event);
                    return;
                }
                let event = match event {
                    CaptureEvent::Result { text, is_final } => {
                        SessionEvent::Utterance { text, is_final }
                    }
                    CaptureEvent::Error { code } => {
                        tracing::debug!("Speech recognition reported {}", code);
                        SessionEvent::CaptureError { code }
                    }
                    CaptureEvent::End => SessionEvent::CaptureEnded,
                };
                self.dispatch(event);
            }
            Signal::Output { ticket, event } => {
                if self.output_slot.as_ref().map(|slot| slot.ticket) != Some(ticket) {
                    tracing::debug!("Dropping stale output event {:?}", event);
                    return;
                }
                let event = match event {
                    OutputEvent::Finished => SessionEvent::OutputFinished,
                    OutputEvent::Failed { message } => {
                        let err = SpeechError::Device(message);
                        tracing::error!("Speech output failed: {}", err);
                        SessionEvent::Fault {
                            message: err.user_message(),
                        }
                    }
                };
                self.dispatch(event);
            }
            Signal::Translation {
                ticket,
                source,
                outcome,
            } => {
                if self.translation.as_ref().map(|pending| pending.ticket) != Some(ticket) {
                    tracing::debug!("Dropping stale translation result for {:?}", ticket);
                    return;
                }
                self.translation = None;
                let event = match outcome {
                    Ok(translated) => SessionEvent::TranslationComplete { source, translated },
                    Err(err) => {
                        tracing::warn!("Translation failed: {}", err);
                        SessionEvent::TranslationFailed {
                            message: err.user_message(),
                        }
                    }
                };
                self.dispatch(event);
            }
        }
    }

    /// Run an event through the machine and carry out the resulting actions
    ///
    /// A failed action becomes a `Fault`, which is dispatched in turn.
    fn dispatch(&mut self, event: SessionEvent) {
        let mut next = Some(event);

        while let Some(event) = next.take() {
            let previous = self.machine.status();
            let logged = self.log.read().len();
            let Some(result) = self.machine.process_event(event) else {
                tracing::debug!("Event ignored in {:?}", previous);
                break;
            };

            if let Err(err) = self.execute(result.actions) {
                tracing::error!("Session action failed: {}", err);
                next = Some(SessionEvent::Fault {
                    message: err.user_message(),
                });
            }

            debug_assert!(!(self.capture_slot.is_some() && self.output_slot.is_some()));

            let log_changed = self.log.read().len() != logged;
            self.publish_snapshot(log_changed);
            let _ = self.changes.send(SessionStateChange {
                previous,
                new: result.new_status,
                reason: result.reason,
            });
        }
    }

    fn execute(&mut self, actions: Vec<SessionAction>) -> Result<(), SessionError> {
        for action in actions {
            match action {
                SessionAction::ReleaseAll => {
                    self.release_capture();
                    self.cancel_translation();
                    self.release_output();
                }
                SessionAction::ClearError => self.last_error = None,
                SessionAction::AcquireCapture => self.acquire_capture()?,
                SessionAction::RestartCapture => self.restart_capture()?,
                SessionAction::ReleaseCapture => self.release_capture(),
                SessionAction::Translate { text } => self.begin_translation(text)?,
                SessionAction::AppendLog { source, translated } => {
                    self.log
                        .write()
                        .append(TranslationLogEntry::new(source, translated));
                }
                SessionAction::Speak { text } => self.speak(&text)?,
                SessionAction::ReleaseOutput => self.release_output(),
                SessionAction::SetError { message } => {
                    tracing::warn!("Session error: {}", message);
                    self.last_error = Some(message);
                }
            }
        }
        Ok(())
    }

    /// Update the watched snapshot in place; entries are rebuilt only when
    /// the log grew
    fn publish_snapshot(&self, log_changed: bool) {
        let status = self.status();
        let error = self.last_error.clone();
        self.snapshots.send_modify(|snapshot| {
            snapshot.status = status;
            snapshot.label = status.label().to_string();
            snapshot.error = error;
            if log_changed {
                snapshot.entries = self.log.read().newest_first().cloned().collect();
            }
        });
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket::new(self.next_ticket)
    }

    fn acquire_capture(&mut self) -> Result<(), SessionError> {
        self.release_capture();

        let ticket = self.issue_ticket();
        let registration = Registration::new();
        let events = CaptureEvents::new(ticket, registration.clone(), self.signals.clone());
        let handle = self.capture.open(&self.capture_config, events)?;

        let slot = self.capture_slot.insert(CaptureSlot {
            ticket,
            registration,
            handle,
        });
        slot.handle.start()?;

        tracing::debug!("Capture handle {:?} acquired", ticket);
        Ok(())
    }

    fn restart_capture(&mut self) -> Result<(), SessionError> {
        match self.capture_slot.as_mut() {
            Some(slot) => {
                tracing::debug!("Restarting capture handle {:?}", slot.ticket);
                slot.handle.start()?;
                Ok(())
            }
            None => self.acquire_capture(),
        }
    }

    /// Deregister, then stop the device, then drop the handle
    fn release_capture(&mut self) {
        if let Some(mut slot) = self.capture_slot.take() {
            slot.registration.revoke();
            slot.handle.stop();
            tracing::debug!("Capture handle {:?} released", slot.ticket);
        }
    }

    fn begin_translation(&mut self, text: String) -> Result<(), SessionError> {
        self.cancel_translation();

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let ticket = self.issue_ticket();
        let gateway = Arc::clone(&self.gateway);
        let signals = self.signals.clone();
        let limit = self.translation_timeout;

        tracing::info!("Translating utterance ({} characters)", text.len());

        let task = runtime.spawn(async move {
            let outcome = match tokio::time::timeout(limit, gateway.translate(&text)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(GatewayError::Timeout(limit.as_secs())),
            };
            let _ = signals.send(Signal::Translation {
                ticket,
                source: text,
                outcome,
            });
        });

        self.translation = Some(PendingTranslation { ticket, task });
        Ok(())
    }

    fn cancel_translation(&mut self) {
        if let Some(pending) = self.translation.take() {
            pending.task.abort();
            tracing::debug!("Translation request {:?} abandoned", pending.ticket);
        }
    }

    fn speak(&mut self, text: &str) -> Result<(), SessionError> {
        self.release_output();

        let ticket = self.issue_ticket();
        let registration = Registration::new();
        let events = OutputEvents::new(ticket, registration.clone(), self.signals.clone());
        let handle = self.output.speak(text, &self.output_language, events)?;

        self.output_slot = Some(OutputSlot {
            ticket,
            registration,
            handle,
        });
        tracing::debug!("Output handle {:?} acquired", ticket);
        Ok(())
    }

    /// Deregister, then cancel synthesis, then drop the handle
    fn release_output(&mut self) {
        if let Some(mut slot) = self.output_slot.take() {
            slot.registration.revoke();
            slot.handle.cancel();
            tracing::debug!("Output handle {:?} released", slot.ticket);
        }
    }
}

impl<G: TranslationGateway> Drop for SessionController<G> {
    fn drop(&mut self) {
        if self.status().is_active()
            || self.capture_slot.is_some()
            || self.output_slot.is_some()
            || self.translation.is_some()
        {
            self.teardown();
        }
    }
}
