//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use live_translator_lib::config::{CaptureConfig, Config};
use live_translator_lib::session::{SessionController, SessionStateChange, SessionStatus, Signal};
use live_translator_lib::speech::{
    CaptureEvents, CaptureHandle, OutputEvents, OutputHandle, SpeechCapture, SpeechError,
    SpeechOutput,
};
use live_translator_lib::translation::{GatewayError, TranslationGateway};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// =============================================================================
// Speech capture
// =============================================================================

/// Recognizer that only reports what a test tells it to
#[derive(Default)]
pub struct ScriptedCapture {
    opened: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
    live: AtomicUsize,
    events: Mutex<Option<CaptureEvents>>,
    unsupported: bool,
}

impl ScriptedCapture {
    /// A recognizer whose environment does not support speech recognition
    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Default::default()
        }
    }

    /// Emitter of the most recently opened handle
    pub fn events(&self) -> CaptureEvents {
        self.events
            .lock()
            .clone()
            .expect("capture handle was never opened")
    }

    /// Number of capture handles that have not been dropped
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct ScriptedCaptureHandle {
    owner: Arc<ScriptedCapture>,
}

/// Handles report back to the shared recognizer
pub struct SharedCapture(pub Arc<ScriptedCapture>);

impl SpeechCapture for SharedCapture {
    fn open(
        &self,
        config: &CaptureConfig,
        events: CaptureEvents,
    ) -> Result<Box<dyn CaptureHandle>, SpeechError> {
        assert!(!config.interim_results);
        assert!(!config.continuous);

        if self.0.unsupported {
            return Err(SpeechError::CaptureUnavailable(
                "no recognizer installed".to_string(),
            ));
        }
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        self.0.live.fetch_add(1, Ordering::SeqCst);
        *self.0.events.lock() = Some(events);
        Ok(Box::new(ScriptedCaptureHandle {
            owner: Arc::clone(&self.0),
        }))
    }
}

impl CaptureHandle for ScriptedCaptureHandle {
    fn start(&mut self) -> Result<(), SpeechError> {
        self.owner.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.owner.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedCaptureHandle {
    fn drop(&mut self) {
        self.owner.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Speech output
// =============================================================================

/// Synthesizer that records what it was asked to say
#[derive(Default)]
pub struct RecordingOutput {
    spoken: Mutex<Vec<(String, String)>>,
    events: Mutex<Option<OutputEvents>>,
    cancelled: AtomicUsize,
    live: AtomicUsize,
}

impl RecordingOutput {
    /// Texts spoken so far, in order
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|(text, _)| text.clone()).collect()
    }

    /// Language of every utterance, in order
    pub fn languages(&self) -> Vec<String> {
        self.spoken
            .lock()
            .iter()
            .map(|(_, language)| language.clone())
            .collect()
    }

    /// Report that the current utterance finished playing
    pub fn finish(&self) {
        self.events
            .lock()
            .as_ref()
            .expect("nothing is being spoken")
            .finished();
    }

    pub fn events(&self) -> OutputEvents {
        self.events.lock().clone().expect("nothing was spoken")
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct SharedOutput(pub Arc<RecordingOutput>);

pub struct RecordingOutputHandle {
    owner: Arc<RecordingOutput>,
}

impl SpeechOutput for SharedOutput {
    fn speak(
        &self,
        text: &str,
        language: &str,
        events: OutputEvents,
    ) -> Result<Box<dyn OutputHandle>, SpeechError> {
        self.0
            .spoken
            .lock()
            .push((text.to_string(), language.to_string()));
        *self.0.events.lock() = Some(events);
        self.0.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingOutputHandle {
            owner: Arc::clone(&self.0),
        }))
    }
}

impl OutputHandle for RecordingOutputHandle {
    fn cancel(&mut self) {
        self.owner.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for RecordingOutputHandle {
    fn drop(&mut self) {
        self.owner.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Translation gateway
// =============================================================================

/// Gateway that answers from a script, optionally after a delay
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, GatewayError>>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedGateway {
    pub fn replying<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, GatewayError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn translating(translations: &[&str]) -> Self {
        Self::replying(translations.iter().map(|text| Ok(text.to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Texts the gateway was asked to translate
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl TranslationGateway for ScriptedGateway {
    async fn translate(&self, text: &str) -> Result<String, GatewayError> {
        self.calls.lock().push(text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.replies.lock().pop_front();
        reply.unwrap_or(Err(GatewayError::EmptyResult))
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A controller wired to scripted collaborators
pub struct Harness {
    pub controller: SessionController<ScriptedGateway>,
    pub signals: mpsc::UnboundedReceiver<Signal>,
    pub capture: Arc<ScriptedCapture>,
    pub output: Arc<RecordingOutput>,
    pub gateway: Arc<ScriptedGateway>,
    pub changes: broadcast::Receiver<SessionStateChange>,
}

impl Harness {
    pub fn new(gateway: ScriptedGateway) -> Self {
        Self::build(Config::default(), ScriptedCapture::default(), gateway)
    }

    pub fn build(config: Config, capture: ScriptedCapture, gateway: ScriptedGateway) -> Self {
        let capture = Arc::new(capture);
        let output = Arc::new(RecordingOutput::default());
        let gateway = Arc::new(gateway);

        let (controller, signals) = SessionController::new(
            &config,
            Arc::new(SharedCapture(Arc::clone(&capture))),
            Arc::new(SharedOutput(Arc::clone(&output))),
            Arc::clone(&gateway),
        );
        let changes = controller.subscribe();

        Self {
            controller,
            signals,
            capture,
            output,
            gateway,
            changes,
        }
    }

    /// Deliver every signal already queued
    pub fn pump(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            self.controller.handle_signal(signal);
        }
    }

    /// Wait for the next signal and deliver it
    pub async fn next(&mut self) {
        let signal = self.signals.recv().await.expect("signal queue closed");
        self.controller.handle_signal(signal);
    }

    /// Recognize `text` as a final utterance
    pub fn say(&mut self, text: &str) {
        self.capture.events().result(text, true);
        self.pump();
    }

    /// Statuses entered since the last call, in order
    pub fn statuses(&mut self) -> Vec<SessionStatus> {
        self.transitions().into_iter().map(|change| change.new).collect()
    }

    /// Transitions since the last call, in order
    pub fn transitions(&mut self) -> Vec<SessionStateChange> {
        let mut changes = Vec::new();
        while let Ok(change) = self.changes.try_recv() {
            changes.push(change);
        }
        changes
    }

    /// Assert the controller and the devices agree that at most one handle is held
    pub fn assert_handles_exclusive(&self) {
        let capture = self.capture.live_handles();
        let output = self.output.live_handles();
        assert!(capture <= 1, "{} capture handles alive", capture);
        assert!(output <= 1, "{} output handles alive", output);
        assert!(capture + output <= 1, "capture and output held together");
        assert_eq!(self.controller.holds_capture(), capture == 1);
        assert_eq!(self.controller.holds_output(), output == 1);
    }
}
