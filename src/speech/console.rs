//! Line-based speech recognizer
//!
//! Stands in for a microphone recognizer in terminal sessions: each typed line
//! is one recognized utterance. Behaves like a single-shot recognizer, so every
//! activation ends with `end` and must be restarted by its owner.

use super::{CaptureEvents, CaptureHandle, SpeechCapture, SpeechError, AUDIO_CAPTURE, NO_SPEECH};
use crate::config::CaptureConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Recognizer fed by a stream of text lines
#[derive(Clone)]
pub struct ConsoleCapture {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl ConsoleCapture {
    /// Create a recognizer that consumes `lines` as utterances
    pub fn new(lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(lines)),
        }
    }
}

impl SpeechCapture for ConsoleCapture {
    fn open(
        &self,
        config: &CaptureConfig,
        events: CaptureEvents,
    ) -> Result<Box<dyn CaptureHandle>, SpeechError> {
        if config.continuous || config.interim_results {
            tracing::warn!("Console recognizer is single shot with final results only");
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SpeechError::CaptureUnavailable(e.to_string()))?;

        tracing::debug!("Console recognizer opened (language: {})", config.language);

        Ok(Box::new(ConsoleCaptureHandle {
            lines: Arc::clone(&self.lines),
            events,
            runtime,
            no_speech_timeout: Duration::from_secs(config.no_speech_timeout_secs),
            activation: None,
        }))
    }
}

struct ConsoleCaptureHandle {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    events: CaptureEvents,
    runtime: tokio::runtime::Handle,
    no_speech_timeout: Duration,
    activation: Option<JoinHandle<()>>,
}

impl CaptureHandle for ConsoleCaptureHandle {
    fn start(&mut self) -> Result<(), SpeechError> {
        // The previous activation has already reported `end`
        if let Some(previous) = self.activation.take() {
            previous.abort();
        }

        let lines = Arc::clone(&self.lines);
        let events = self.events.clone();
        let no_speech_timeout = self.no_speech_timeout;

        self.activation = Some(self.runtime.spawn(async move {
            let next = {
                let mut lines = lines.lock().await;
                tokio::time::timeout(no_speech_timeout, lines.recv()).await
            };

            match next {
                Ok(Some(line)) => events.result(line, true),
                Ok(None) => events.error(AUDIO_CAPTURE),
                Err(_) => events.error(NO_SPEECH),
            }
            events.end();
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(activation) = self.activation.take() {
            activation.abort();
            tracing::debug!("Console recognizer stopped");
        }
    }
}

impl Drop for ConsoleCaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
