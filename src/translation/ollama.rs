//! Ollama translation backend
//!
//! Local alternative to Gemini using the Ollama API (default
//! `http://localhost:11434`). No API key is involved; the server only needs
//! the configured model pulled.

use super::prompts::{clean_translation, translation_prompt};
use super::{transport_error, GatewayError, TranslationGateway};
use crate::config::{ConfigurationError, TranslationConfig};
use serde::{Deserialize, Serialize};

/// Request body for Ollama generate endpoint
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    options: GenerateOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// Response from Ollama generate endpoint (non-streaming)
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Response from Ollama tags endpoint
#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

/// Model information from Ollama
#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

/// Ollama HTTP client for translation
#[derive(Debug, Clone)]
pub struct OllamaTranslator {
    base_url: String,
    model: String,
    temperature: f32,
    source_language: String,
    target_language: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OllamaTranslator {
    /// Create a client from the translation config
    pub fn new(config: &TranslationConfig) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.effective_base_url().to_string(),
            model: config.effective_model().to_string(),
            temperature: config.temperature,
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    /// Returns the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the server base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the Ollama server is reachable
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Ollama not available: {}", e);
                false
            }
        }
    }

    /// List models pulled on the Ollama server
    pub async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(GatewayError::ServerError {
                status: response.status().as_u16(),
                message: "failed to list models".to_string(),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ParseError(e.to_string()))?;

        let model_names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        tracing::debug!("Found {} Ollama models", model_names.len());
        Ok(model_names)
    }

    /// Returns whether `available` contains the configured model
    ///
    /// Ollama reports untagged models as `name:latest`.
    pub fn has_model(&self, available: &[String]) -> bool {
        available.iter().any(|name| {
            name == &self.model || name.strip_suffix(":latest") == Some(self.model.as_str())
        })
    }

    fn build_request(&self, text: &str) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: translation_prompt(&self.source_language, &self.target_language, text),
            options: GenerateOptions {
                temperature: self.temperature,
            },
            stream: false,
        }
    }
}

impl TranslationGateway for OllamaTranslator {
    async fn translate(&self, text: &str) -> Result<String, GatewayError> {
        let url = format!("{}/api/generate", self.base_url);

        tracing::debug!(
            "Sending translation request to Ollama with model: {} ({} characters)",
            self.model,
            text.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&self.build_request(text))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            tracing::error!("Ollama request failed ({}): {}", status, message);
            return Err(GatewayError::ServerError { status, message });
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ParseError(e.to_string()))?;

        let translation = clean_translation(&generate_response.response);
        if translation.is_empty() {
            return Err(GatewayError::EmptyResult);
        }
        Ok(translation)
    }
}
