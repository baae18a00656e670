//! Runtime configuration.
//!
//! Resolved once when the host opens the notes store and passed into the session.
//! Nothing in this crate reads environment variables.

use std::path::{Path, PathBuf};

use crate::merge::{contains_trigger, DEFAULT_SAFETY_NET, DEFAULT_SIMILARITY_THRESHOLD};
use crate::store::{StoreError, StoreResult};

/// Default key the patient snapshot is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "clinical_notes.patients";

/// Default database file name.
pub const DEFAULT_DATABASE_FILE: &str = "clinical_notes.db";

#[derive(Clone, Debug)]
pub struct NotesConfig {
    database_path: PathBuf,
    storage_key: String,
    similarity_threshold: f64,
    safety_net_text: String,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            safety_net_text: DEFAULT_SAFETY_NET.to_string(),
        }
    }
}

impl NotesConfig {
    pub fn new(
        database_path: PathBuf,
        storage_key: String,
        similarity_threshold: f64,
        safety_net_text: String,
    ) -> StoreResult<Self> {
        if storage_key.trim().is_empty() {
            return Err(StoreError::InvalidInput("storage_key cannot be empty".into()));
        }
        if !(similarity_threshold > 0.0 && similarity_threshold <= 1.0) {
            return Err(StoreError::InvalidInput(format!(
                "similarity_threshold must be in (0, 1], got {}",
                similarity_threshold
            )));
        }
        // Otherwise a previous advice line would survive re-processing
        if !contains_trigger(&safety_net_text) {
            return Err(StoreError::InvalidInput(
                "safety_net_text must mention worsening symptoms or 999".into(),
            ));
        }

        Ok(Self {
            database_path,
            storage_key,
            similarity_threshold,
            safety_net_text,
        })
    }

    /// Defaults with a different database location.
    pub fn with_database_path(database_path: PathBuf) -> Self {
        Self {
            database_path,
            ..Self::default()
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    pub fn safety_net_text(&self) -> &str {
        &self.safety_net_text
    }
}
