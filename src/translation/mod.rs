//! Translation gateway
//!
//! The session controller sees translation as one opaque asynchronous call:
//! source text in, target text out, or a [`GatewayError`]. Backends do not
//! retry; the controller bounds each call with a timeout and decides what a
//! failure means for the session.

pub mod gemini;
pub mod ollama;
pub mod prompts;

pub use gemini::GeminiTranslator;
pub use ollama::OllamaTranslator;

use crate::config::{ConfigurationError, TranslationConfig, TranslationProvider};
use std::future::Future;

/// Message shown for every gateway failure that is not a credential problem
pub const GENERIC_FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Message shown when the backend rejects the API key
pub const INVALID_CREDENTIAL_MESSAGE: &str =
    "The translation service rejected the API key. Please check your configuration.";

/// Error types for translation requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("The API key was rejected")]
    InvalidCredential,

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Request was blocked: {0}")]
    Blocked(String),

    #[error("Received an empty translation")]
    EmptyResult,
}

impl GatewayError {
    /// Message suitable for showing to the user
    ///
    /// Never includes server responses or credential material.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::InvalidCredential => INVALID_CREDENTIAL_MESSAGE.to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Translates source-language text into the target language
pub trait TranslationGateway: Send + Sync + 'static {
    fn translate(&self, text: &str) -> impl Future<Output = Result<String, GatewayError>> + Send;
}

/// The backend selected in the configuration
#[derive(Debug, Clone)]
pub enum Translator {
    Gemini(GeminiTranslator),
    Ollama(OllamaTranslator),
}

impl Translator {
    /// Build the configured backend
    pub fn from_config(config: &TranslationConfig) -> Result<Self, ConfigurationError> {
        match config.provider {
            TranslationProvider::Gemini => Ok(Translator::Gemini(GeminiTranslator::new(config)?)),
            TranslationProvider::Ollama => Ok(Translator::Ollama(OllamaTranslator::new(config)?)),
        }
    }

    /// Human-readable backend description for logs
    pub fn describe(&self) -> String {
        match self {
            Translator::Gemini(t) => format!("Gemini ({})", t.model()),
            Translator::Ollama(t) => format!("Ollama ({} at {})", t.model(), t.base_url()),
        }
    }
}

impl TranslationGateway for Translator {
    async fn translate(&self, text: &str) -> Result<String, GatewayError> {
        match self {
            Translator::Gemini(t) => t.translate(text).await,
            Translator::Ollama(t) => t.translate(text).await,
        }
    }
}

/// Map a `reqwest` transport error
pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(timeout_secs)
    } else {
        GatewayError::ConnectionFailed(e.to_string())
    }
}
