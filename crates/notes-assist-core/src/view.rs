//! Which patient and summary version is on screen.
//!
//! Derived state over the record store; never persisted and never mutates the
//! store.

use crate::models::{Patient, SummaryRecord};
use crate::store::{PersistencePort, RecordStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSelection {
    patient_id: Option<String>,
    /// Index into the patient's history; 0 is the newest
    index: usize,
}

impl ViewSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a patient and show their newest summary.
    pub fn select(&mut self, patient_id: impl Into<String>) {
        self.patient_id = Some(patient_id.into());
        self.index = 0;
    }

    pub fn clear(&mut self) {
        self.patient_id = None;
        self.index = 0;
    }

    /// Show an older (or the newest) version.
    pub fn view_version(&mut self, index: usize) {
        self.index = index;
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_selected(&self, patient_id: &str) -> bool {
        self.patient_id.as_deref() == Some(patient_id)
    }

    /// Clear the selection if it points at `patient_id`. Returns whether it did.
    pub fn on_patient_removed(&mut self, patient_id: &str) -> bool {
        if self.is_selected(patient_id) {
            self.clear();
            true
        } else {
            false
        }
    }

    pub fn selected_patient<'a, P: PersistencePort>(
        &self,
        store: &'a RecordStore<P>,
    ) -> Option<&'a Patient> {
        store.get_patient(self.patient_id.as_deref()?)
    }

    /// The record on screen, or `None` for "no summary shown".
    pub fn current_record<'a, P: PersistencePort>(
        &self,
        store: &'a RecordStore<P>,
    ) -> Option<&'a SummaryRecord> {
        self.selected_patient(store)?.summaries.get(self.index)
    }
}

/// Case-insensitive substring match on patient name. A blank query matches all.
pub fn filter_patients<'a>(patients: &'a [Patient], query: &str) -> Vec<&'a Patient> {
    let query = query.trim().to_lowercase();
    patients
        .iter()
        .filter(|p| query.is_empty() || p.name.to_lowercase().contains(&query))
        .collect()
}
