//! Configuration management for Live Translator
//!
//! Settings are stored in `~/.live-translator/config.json` with schema
//! versioning and migrations. The loaded [`Config`] is passed explicitly to
//! the components that need it; nothing reads configuration from ambient
//! global state. [`Config::validate`] runs once at startup so a missing API
//! key is reported before any session starts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current config schema version
const CURRENT_VERSION: u32 = 1;

/// Environment variable that overrides `translation.api_key`
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Default Gemini endpoint
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default Ollama server address
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Error types for loading and validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),

    #[error("The translation API key is missing. Set GEMINI_API_KEY or translation.api_key")]
    MissingApiKey,

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Speech recognition settings
    pub capture: CaptureConfig,
    /// Speech synthesis settings
    pub output: OutputConfig,
    /// Translation backend settings
    pub translation: TranslationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            capture: CaptureConfig::default(),
            output: OutputConfig::default(),
            translation: TranslationConfig::default(),
        }
    }
}

/// Speech recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Recognition language (BCP 47)
    pub language: String,
    /// Whether partial results are reported before the utterance is final
    pub interim_results: bool,
    /// Whether the recognizer keeps listening across utterances
    pub continuous: bool,
    /// Seconds of silence before an activation reports `no-speech`
    pub no_speech_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            language: "es-ES".to_string(),
            interim_results: false,
            continuous: false,
            no_speech_timeout_secs: 8,
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Synthesis language (BCP 47)
    pub language: String,
    /// External speech program (e.g. "espeak-ng"); printed output when None
    pub command: Option<String>,
    /// Speaking rate used to pace printed output
    pub words_per_minute: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            language: "de-DE".to_string(),
            command: None,
            words_per_minute: 160,
        }
    }
}

/// Translation backend options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranslationProvider {
    /// Google Gemini generateContent API
    #[default]
    Gemini,
    /// Local Ollama server
    Ollama,
}

/// Translation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Which backend serves translations
    pub provider: TranslationProvider,
    /// API key (Gemini only); overridden by `GEMINI_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model name; provider default when None
    pub model: Option<String>,
    /// Server base URL; provider default when None
    pub base_url: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on a single translation request
    pub timeout_secs: u64,
    /// Language the speaker uses, as named in the prompt
    pub source_language: String,
    /// Language spoken back, as named in the prompt
    pub target_language: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            api_key: None,
            model: None,
            base_url: None,
            temperature: 0.2,
            timeout_secs: 30,
            source_language: "Spanish".to_string(),
            target_language: "German".to_string(),
        }
    }
}

impl TranslationConfig {
    /// Model to request, falling back to the provider default
    pub fn effective_model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) if !model.trim().is_empty() => model.trim(),
            (_, TranslationProvider::Gemini) => DEFAULT_GEMINI_MODEL,
            (_, TranslationProvider::Ollama) => DEFAULT_OLLAMA_MODEL,
        }
    }

    /// Base URL without a trailing slash, falling back to the provider default
    pub fn effective_base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) if !url.trim().is_empty() => url.trim().trim_end_matches('/'),
            (_, TranslationProvider::Gemini) => DEFAULT_GEMINI_BASE_URL,
            (_, TranslationProvider::Ollama) => DEFAULT_OLLAMA_BASE_URL,
        }
    }

    /// The API key if one is configured and non-blank
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Replace the API key with `key` when it is present and non-blank
    pub fn override_api_key(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.translation.api_key = Some(key);
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.override_api_key(std::env::var(API_KEY_ENV).ok());
    }

    /// Check the settings a session cannot run without
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let translation = &self.translation;

        if translation.provider == TranslationProvider::Gemini && translation.api_key().is_none() {
            return Err(ConfigurationError::MissingApiKey);
        }

        url::Url::parse(translation.effective_base_url()).map_err(|e| {
            ConfigurationError::Invalid {
                field: "translation.base_url",
                reason: e.to_string(),
            }
        })?;

        if !(0.0..=2.0).contains(&translation.temperature) {
            return Err(ConfigurationError::Invalid {
                field: "translation.temperature",
                reason: format!("{} is outside 0.0..=2.0", translation.temperature),
            });
        }

        if translation.timeout_secs == 0 {
            return Err(ConfigurationError::Invalid {
                field: "translation.timeout_secs",
                reason: "must be greater than 0".to_string(),
            });
        }

        let languages = [
            ("capture.language", &self.capture.language),
            ("output.language", &self.output.language),
            ("translation.source_language", &translation.source_language),
            ("translation.target_language", &translation.target_language),
        ];
        for (field, value) in languages {
            if value.trim().is_empty() {
                return Err(ConfigurationError::Invalid {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Load configuration from `path`, using defaults when the file is absent
    pub fn load_from(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = serde_json::from_str(&contents)?;
        let original_version = config.version;
        let migrated = migrate_config(config)?;

        if migrated.version != original_version {
            migrated.save_to(path)?;
        }

        Ok(migrated)
    }

    /// Save configuration to `path`, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigurationError> {
        let write_err = |source| ConfigurationError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(write_err)?;

        tracing::info!("Config saved to {:?}", path);
        Ok(())
    }
}

/// Get the path to the config directory (~/.live-translator)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".live-translator")
}

/// Get the path to the config file (~/.live-translator/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load the user's configuration with environment overrides applied
pub fn load() -> Result<Config, ConfigurationError> {
    let path = get_config_path();
    let mut config = Config::load_from(&path)?;
    config.apply_env();
    tracing::info!(
        "Config loaded from {:?} (provider: {:?})",
        path,
        config.translation.provider
    );
    Ok(config)
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, ConfigurationError> {
    let original_version = config.version;

    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version > CURRENT_VERSION {
        return Err(ConfigurationError::UnknownVersion(config.version));
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, ConfigurationError> {
    match config.version {
        // Version 0 -> 1: sections gained serde defaults
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => Err(ConfigurationError::UnknownVersion(v)),
    }
}
