//! Translation log
//!
//! Append-only record of completed translations. Entries are stored in the
//! order they were produced; presentation reads them newest first and the
//! plain-text transcript lists them oldest first.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Delimiter written after every transcript entry
const ENTRY_DELIMITER: &str = "---";

/// Error types for transcript export
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("The translation log is empty")]
    Empty,

    #[error("Failed to write transcript {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HistoryError {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            HistoryError::Empty => "There is nothing to export yet.".to_string(),
            HistoryError::Write { path, .. } => {
                format!("Could not save the transcript to {}.", path.display())
            }
        }
    }
}

/// A completed translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationLogEntry {
    pub id: Uuid,
    pub source_text: String,
    pub translated_text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranslationLogEntry {
    /// Create an entry stamped with the current time
    pub fn new(source_text: impl Into<String>, translated_text: impl Into<String>) -> Self {
        Self::with_timestamp(source_text, translated_text, Utc::now())
    }

    pub fn with_timestamp(
        source_text: impl Into<String>,
        translated_text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_text: source_text.into(),
            translated_text: translated_text.into(),
            timestamp,
        }
    }
}

/// Log shared between the session controller and its observers
///
/// Only the controller writes to it.
pub type SharedLog = Arc<RwLock<TranslationLog>>;

/// Ordered, append-only list of translations
#[derive(Debug, Clone)]
pub struct TranslationLog {
    entries: Vec<TranslationLogEntry>,
    source_label: String,
    target_label: String,
}

impl Default for TranslationLog {
    fn default() -> Self {
        Self::new("Spanish", "German")
    }
}

impl TranslationLog {
    /// Create an empty log whose transcript names the two languages
    pub fn new(source_label: impl Into<String>, target_label: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            source_label: source_label.into(),
            target_label: target_label.into(),
        }
    }

    /// Wrap the log for sharing
    pub fn shared(self) -> SharedLog {
        Arc::new(RwLock::new(self))
    }

    pub fn append(&mut self, entry: TranslationLogEntry) {
        tracing::debug!(
            "Appending log entry {} ({} entries)",
            entry.id,
            self.entries.len() + 1
        );
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&TranslationLogEntry> {
        self.entries.last()
    }

    /// Entries in display order (newest first)
    pub fn newest_first(&self) -> impl Iterator<Item = &TranslationLogEntry> {
        self.entries.iter().rev()
    }

    /// Entries in the order they were produced
    pub fn chronological(&self) -> impl Iterator<Item = &TranslationLogEntry> {
        self.entries.iter()
    }

    /// Render the plain-text transcript, oldest entry first
    pub fn export_transcript(&self) -> String {
        self.chronological()
            .map(|entry| {
                format!(
                    "Timestamp: {}\n{}: {}\n{}: {}\n\n{}\n",
                    entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                    self.source_label,
                    entry.source_text,
                    self.target_label,
                    entry.translated_text,
                    ENTRY_DELIMITER
                )
            })
            .collect()
    }

    /// Write the transcript to a timestamped file in `dir`
    ///
    /// Returns the path of the written file.
    pub fn export_to_file(&self, dir: &Path) -> Result<PathBuf, HistoryError> {
        if self.is_empty() {
            return Err(HistoryError::Empty);
        }

        let path = dir.join(export_filename(Utc::now()));
        let write_err = |source| HistoryError::Write {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(write_err)?;
        fs::write(&path, self.export_transcript()).map_err(write_err)?;

        tracing::info!("Exported {} log entries to {:?}", self.len(), path);
        Ok(path)
    }
}

/// Transcript file name for an export made at `at`
///
/// Colons are replaced so the name is valid on every filesystem.
pub fn export_filename(at: DateTime<Utc>) -> String {
    format!(
        "translation_log_{}.txt",
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace(':', "-")
    )
}
