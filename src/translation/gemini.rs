//! Gemini translation backend
//!
//! Calls the `generateContent` endpoint with thinking disabled and a low
//! temperature. The API key travels in the `x-goog-api-key` header and never
//! appears in URLs or logs.

use super::prompts::{clean_translation, translation_prompt};
use super::{transport_error, GatewayError, TranslationGateway};
use crate::config::{ConfigurationError, TranslationConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request body for the generateContent endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

/// Response from the generateContent endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Gemini HTTP client for translation
#[derive(Clone)]
pub struct GeminiTranslator {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    source_language: String,
    target_language: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl fmt::Debug for GeminiTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiTranslator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl GeminiTranslator {
    /// Create a client from the translation config
    ///
    /// Fails with [`ConfigurationError::MissingApiKey`] when no key is set.
    pub fn new(config: &TranslationConfig) -> Result<Self, ConfigurationError> {
        let api_key = config
            .api_key()
            .ok_or(ConfigurationError::MissingApiKey)?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.effective_base_url().to_string(),
            api_key,
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

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request(&self, text: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: translation_prompt(&self.source_language, &self.target_language, text),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                thinking_config: ThinkingConfig { thinking_budget: 0 },
            },
        }
    }
}

impl TranslationGateway for GeminiTranslator {
    async fn translate(&self, text: &str) -> Result<String, GatewayError> {
        tracing::debug!(
            "Sending translation request to Gemini with model: {} ({} characters)",
            self.model,
            text.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(text))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let err = classify_failure(status.as_u16(), &body);
            tracing::error!("Gemini request failed: {}", err);
            return Err(err);
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ParseError(e.to_string()))?;

        let translation = extract_translation(body)?;
        tracing::debug!("Gemini translation received ({} characters)", translation.len());
        Ok(translation)
    }
}

/// Map an unsuccessful HTTP status and body to a gateway error
fn classify_failure(status: u16, body: &str) -> GatewayError {
    let rejected_key = body.contains("API key not valid") || body.contains("API_KEY_INVALID");
    match status {
        401 | 403 => GatewayError::InvalidCredential,
        400 if rejected_key => GatewayError::InvalidCredential,
        _ => GatewayError::ServerError {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

/// Pull the translated text out of a response body
fn extract_translation(response: GenerateContentResponse) -> Result<String, GatewayError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(GatewayError::Blocked(reason));
    }

    let raw: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let translation = clean_translation(&raw);
    if translation.is_empty() {
        return Err(GatewayError::EmptyResult);
    }
    Ok(translation)
}
