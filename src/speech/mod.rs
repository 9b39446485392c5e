//! Speech capture and speech output collaborators
//!
//! The session controller talks to the microphone and the speaker only through
//! the traits in this module. Devices never call into the controller directly:
//! they are handed a [`CaptureEvents`] or [`OutputEvents`] emitter that
//! enqueues events for the controller's event loop.
//!
//! Every emitter is bound to the handle it was created for. Once the
//! controller releases that handle the emitter's registration is revoked and
//! anything the device reports afterwards is dropped.

pub mod console;
pub mod synth;

pub use console::ConsoleCapture;
pub use synth::{CommandSpeechOutput, PacedSpeechOutput};

use crate::config::{CaptureConfig, OutputConfig};
use crate::session::{Signal, Ticket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Recognizer reported that nothing was said before it gave up
pub const NO_SPEECH: &str = "no-speech";

/// Recognizer activation was aborted
pub const ABORTED: &str = "aborted";

/// Recognizer lost access to its audio source
pub const AUDIO_CAPTURE: &str = "audio-capture";

/// Returns whether a recognizer error code is transient noise that must not
/// interrupt the listening loop
pub fn is_recoverable_capture_error(code: &str) -> bool {
    matches!(code, NO_SPEECH | ABORTED)
}

/// Error types for speech devices
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech recognition is not available: {0}")]
    CaptureUnavailable(String),

    #[error("Speech synthesis is not available: {0}")]
    OutputUnavailable(String),

    #[error("Speech device failed: {0}")]
    Device(String),
}

impl SpeechError {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            SpeechError::CaptureUnavailable(_) => {
                "Speech recognition is not supported in this environment.".to_string()
            }
            SpeechError::OutputUnavailable(_) => {
                "Speech synthesis is not supported in this environment.".to_string()
            }
            SpeechError::Device(_) => "Sorry, something went wrong. Please try again.".to_string(),
        }
    }
}

/// Event reported by a speech recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Result { text: String, is_final: bool },
    Error { code: String },
    End,
}

/// Event reported by a speech synthesizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Finished,
    Failed { message: String },
}

/// Handler registration shared between the controller and an emitter
#[derive(Debug, Clone)]
pub(crate) struct Registration(Arc<AtomicBool>);

impl Registration {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn revoke(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Emitter handed to a recognizer when a capture handle is opened
#[derive(Debug, Clone)]
pub struct CaptureEvents {
    ticket: Ticket,
    registration: Registration,
    signals: mpsc::UnboundedSender<Signal>,
}

impl CaptureEvents {
    pub(crate) fn new(
        ticket: Ticket,
        registration: Registration,
        signals: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        Self {
            ticket,
            registration,
            signals,
        }
    }

    /// Report a recognized utterance
    pub fn result(&self, text: impl Into<String>, is_final: bool) {
        self.emit(CaptureEvent::Result {
            text: text.into(),
            is_final,
        });
    }

    /// Report a recognizer error code
    pub fn error(&self, code: impl Into<String>) {
        self.emit(CaptureEvent::Error { code: code.into() });
    }

    /// Report that the recognizer stopped after this activation
    pub fn end(&self) {
        self.emit(CaptureEvent::End);
    }

    /// Returns whether the controller still listens to this emitter
    pub fn is_registered(&self) -> bool {
        self.registration.is_active()
    }

    fn emit(&self, event: CaptureEvent) {
        if !self.registration.is_active() {
            tracing::debug!("Dropping capture event after release: {:?}", event);
            return;
        }
        let _ = self.signals.send(Signal::Capture {
            ticket: self.ticket,
            event,
        });
    }
}

/// Emitter handed to a synthesizer when an output handle is opened
#[derive(Debug, Clone)]
pub struct OutputEvents {
    ticket: Ticket,
    registration: Registration,
    signals: mpsc::UnboundedSender<Signal>,
}

impl OutputEvents {
    pub(crate) fn new(
        ticket: Ticket,
        registration: Registration,
        signals: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        Self {
            ticket,
            registration,
            signals,
        }
    }

    /// Report that the utterance was spoken completely
    pub fn finished(&self) {
        self.emit(OutputEvent::Finished);
    }

    /// Report that playback failed part way
    pub fn failed(&self, message: impl Into<String>) {
        self.emit(OutputEvent::Failed {
            message: message.into(),
        });
    }

    /// Returns whether the controller still listens to this emitter
    pub fn is_registered(&self) -> bool {
        self.registration.is_active()
    }

    fn emit(&self, event: OutputEvent) {
        if !self.registration.is_active() {
            tracing::debug!("Dropping output event after release: {:?}", event);
            return;
        }
        let _ = self.signals.send(Signal::Output {
            ticket: self.ticket,
            event,
        });
    }
}

/// A speech recognizer
///
/// Opening registers `events` with the device. The returned handle is the only
/// way to start or stop it.
pub trait SpeechCapture: Send + Sync {
    fn open(
        &self,
        config: &CaptureConfig,
        events: CaptureEvents,
    ) -> Result<Box<dyn CaptureHandle>, SpeechError>;
}

/// One live registration with a recognizer
///
/// A recognizer is single shot: after each utterance it reports `end` and
/// stays silent until `start` is called again.
pub trait CaptureHandle: Send {
    /// Begin (or resume) listening for one utterance
    fn start(&mut self) -> Result<(), SpeechError>;

    /// Stop listening; must be safe to call more than once
    fn stop(&mut self);
}

/// A speech synthesizer
pub trait SpeechOutput: Send + Sync {
    /// Start speaking `text` and report completion through `events`
    fn speak(
        &self,
        text: &str,
        language: &str,
        events: OutputEvents,
    ) -> Result<Box<dyn OutputHandle>, SpeechError>;
}

/// One scheduled utterance on a synthesizer
pub trait OutputHandle: Send {
    /// Cancel playback; must be safe to call after playback finished
    fn cancel(&mut self);
}

/// Build the speech output described by the config
///
/// A configured speech program must be installed; without one the translation
/// is printed and paced at the configured speaking rate.
pub fn output_from_config(config: &OutputConfig) -> Result<Arc<dyn SpeechOutput>, SpeechError> {
    match config.command.as_deref().map(str::trim) {
        Some(program) if !program.is_empty() => {
            Ok(Arc::new(CommandSpeechOutput::new(program)?))
        }
        _ => Ok(Arc::new(PacedSpeechOutput::new(config.words_per_minute))),
    }
}
