//! Patient models.

use serde::{Deserialize, Serialize};

use super::SummaryRecord;

/// A patient and their summary history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// UUID v7, so ids sort in creation order
    pub id: String,
    /// Display name
    pub name: String,
    /// Date of birth, free text
    #[serde(default)]
    pub date_of_birth: Option<String>,
    /// External identifier such as a hospital or NHS number, free text
    #[serde(default)]
    pub external_id: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Summary history, newest first
    #[serde(default)]
    pub summaries: Vec<SummaryRecord>,
}

impl Patient {
    /// Create a new patient with no history.
    pub fn new(name: String) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            name,
            date_of_birth: None,
            external_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            summaries: Vec::new(),
        }
    }

    /// Most recent summary, if any.
    pub fn latest_summary(&self) -> Option<&SummaryRecord> {
        self.summaries.first()
    }

    pub fn has_summaries(&self) -> bool {
        !self.summaries.is_empty()
    }

    /// Prepend a record so index 0 stays the newest.
    pub(crate) fn push_summary(&mut self, record: SummaryRecord) {
        self.summaries.insert(0, record);
    }

    /// Merge identity fields. History is left alone.
    pub(crate) fn apply_identity(&mut self, update: &IdentityUpdate) {
        if let Some(name) = &update.name {
            self.name = name.trim().to_string();
        }
        if let Some(dob) = &update.date_of_birth {
            self.date_of_birth = non_blank(dob);
        }
        if let Some(external_id) = &update.external_id {
            self.external_id = non_blank(external_id);
        }
    }
}

/// Identity fields to change. `None` leaves a field as is; a blank string clears
/// an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IdentityUpdate {
    pub name: Option<String>,
    pub date_of_birth: Option<String>,
    pub external_id: Option<String>,
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClinicalSummary;

    #[test]
    fn test_new_patient() {
        let patient = Patient::new("Jane Doe".into());
        assert_eq!(patient.name, "Jane Doe");
        assert!(!patient.has_summaries());
        assert_eq!(patient.id.len(), 36); // UUID format
    }

    #[test]
    fn test_ids_follow_creation_order() {
        let first = Patient::new("A".into());
        let second = Patient::new("B".into());
        assert!(first.id < second.id);
    }

    #[test]
    fn test_push_summary_prepends() {
        let mut patient = Patient::new("Jane Doe".into());
        let older = SummaryRecord::with_timestamp(ClinicalSummary::default(), "2026-01-01T00:00:00Z".into());
        let newer = SummaryRecord::with_timestamp(ClinicalSummary::default(), "2026-01-02T00:00:00Z".into());

        patient.push_summary(older);
        patient.push_summary(newer.clone());

        assert_eq!(patient.latest_summary(), Some(&newer));
        assert_eq!(patient.summaries.len(), 2);
    }

    #[test]
    fn test_apply_identity() {
        let mut patient = Patient::new("Jane Doe".into());
        patient.external_id = Some("943 476 5919".into());

        patient.apply_identity(&IdentityUpdate {
            name: Some("  Jane Smith ".into()),
            date_of_birth: Some("1970-03-02".into()),
            external_id: Some("   ".into()),
        });

        assert_eq!(patient.name, "Jane Smith");
        assert_eq!(patient.date_of_birth.as_deref(), Some("1970-03-02"));
        assert_eq!(patient.external_id, None);
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let json = r#"{"id":"p-1","name":"Jane Doe","created_at":"2026-01-01T00:00:00Z"}"#;
        let patient: Patient = serde_json::from_str(json).unwrap();
        assert!(patient.summaries.is_empty());
        assert!(patient.date_of_birth.is_none());
    }
}
