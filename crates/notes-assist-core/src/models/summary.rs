//! Structured summaries and their immutable records.

use notes_assist_llm::SummaryOutput;
use serde::{Deserialize, Serialize};

/// Structured clinical summary, serialized with the service's field names.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClinicalSummary {
    #[serde(rename = "Acute Issues", default)]
    pub acute_issues: Vec<String>,
    #[serde(rename = "Pending Tasks and action Plan", default)]
    pub pending_tasks: Vec<String>,
    #[serde(rename = "Past medical history", default)]
    pub past_history: Vec<String>,
    /// Only present on summaries produced by an update
    #[serde(rename = "Key Changes", default, skip_serializing_if = "Option::is_none")]
    pub key_changes: Option<Vec<String>>,
}

impl ClinicalSummary {
    /// JSON embedded as previous state in update requests.
    pub fn to_context_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Apply `f` to every list, including key changes when present.
    pub fn map_lists<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(Vec<String>) -> Vec<String>,
    {
        self.acute_issues = f(self.acute_issues);
        self.pending_tasks = f(self.pending_tasks);
        self.past_history = f(self.past_history);
        self.key_changes = self.key_changes.map(&mut f);
        self
    }
}

impl From<SummaryOutput> for ClinicalSummary {
    fn from(output: SummaryOutput) -> Self {
        Self {
            acute_issues: output.acute_issues,
            pending_tasks: output.pending_tasks,
            past_history: output.past_history,
            key_changes: output.key_changes,
        }
    }
}

/// A timestamped summary. Never mutated once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryRecord {
    summary: ClinicalSummary,
    /// RFC 3339 capture time
    created_at: String,
}

impl SummaryRecord {
    /// Wrap a summary, stamped now.
    pub fn new(summary: ClinicalSummary) -> Self {
        Self::with_timestamp(summary, chrono::Utc::now().to_rfc3339())
    }

    pub fn with_timestamp(summary: ClinicalSummary, created_at: String) -> Self {
        Self {
            summary,
            created_at,
        }
    }

    pub fn summary(&self) -> &ClinicalSummary {
        &self.summary
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Whether this record came from an update (carries key changes).
    pub fn is_update(&self) -> bool {
        self.summary.key_changes.is_some()
    }
}
