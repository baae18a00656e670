//! Record store: the patient list and its key-value persistence.
//!
//! The whole list is written as one blob under one key after every change. Loading
//! never fails: a missing, unreadable or unsupported blob gives an empty store.

mod memory;
mod sqlite;

pub use memory::*;
pub use sqlite::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::{IdentityUpdate, Patient, SummaryRecord};

/// Current snapshot layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Where snapshots live.
pub trait PersistencePort {
    fn load_blob(&self, key: &str) -> StoreResult<Option<String>>;
    fn save_blob(&mut self, key: &str, value: &str) -> StoreResult<()>;
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    patients: &'a [Patient],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    patients: Vec<Patient>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredBlob {
    Versioned(Snapshot),
    /// Bare patient array written before snapshots were versioned
    Legacy(Vec<Patient>),
}

/// Serialize a patient list as a versioned snapshot.
pub fn encode_snapshot(patients: &[Patient]) -> StoreResult<String> {
    Ok(serde_json::to_string(&SnapshotRef {
        version: SNAPSHOT_VERSION,
        patients,
    })?)
}

/// Parse a snapshot, accepting the legacy unversioned layout.
pub fn decode_snapshot(blob: &str) -> StoreResult<Vec<Patient>> {
    match serde_json::from_str::<StoredBlob>(blob)? {
        StoredBlob::Versioned(snapshot) if snapshot.version > SNAPSHOT_VERSION => {
            Err(StoreError::Persistence(format!(
                "Unsupported snapshot version {} (current {})",
                snapshot.version, SNAPSHOT_VERSION
            )))
        }
        StoredBlob::Versioned(snapshot) => Ok(snapshot.patients),
        StoredBlob::Legacy(patients) => Ok(patients),
    }
}

/// The durable patient list. Single writer.
pub struct RecordStore<P: PersistencePort> {
    port: P,
    key: String,
    patients: Vec<Patient>,
}

impl<P: PersistencePort> RecordStore<P> {
    /// Open a store and restore whatever the port holds under `key`.
    pub fn open(port: P, key: impl Into<String>) -> Self {
        let key = key.into();
        let patients = Self::load(&port, &key);
        Self {
            port,
            key,
            patients,
        }
    }

    /// Read the persisted list. Errors are logged and give an empty list.
    pub fn load(port: &P, key: &str) -> Vec<Patient> {
        let blob = match port.load_blob(key) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!(key, "No saved patients; starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read saved patients; starting empty");
                return Vec::new();
            }
        };

        match decode_snapshot(&blob) {
            Ok(patients) => {
                debug!(key, count = patients.len(), "Restored patients");
                patients
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to parse saved patients; starting empty");
                Vec::new()
            }
        }
    }

    /// Write the current list.
    pub fn save(&mut self) -> StoreResult<()> {
        let blob = encode_snapshot(&self.patients)?;
        self.write(&blob)
    }

    fn write(&mut self, blob: &str) -> StoreResult<()> {
        self.port.save_blob(&self.key, blob).map_err(|e| {
            error!(key = %self.key, error = %e, "Failed to save patients");
            e
        })
    }

    /// Persist `next`, then make it current. On failure nothing changes.
    fn commit(&mut self, next: Vec<Patient>) -> StoreResult<()> {
        let blob = encode_snapshot(&next)?;
        self.write(&blob)?;
        self.patients = next;
        debug!(count = self.patients.len(), "Saved patients");
        Ok(())
    }

    /// All patients, newest first.
    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn get_patient(&self, patient_id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == patient_id)
    }

    pub fn latest_summary(&self, patient_id: &str) -> Option<&SummaryRecord> {
        self.get_patient(patient_id)?.latest_summary()
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Add a patient as the newest entry.
    pub fn add_patient(&mut self, name: &str) -> StoreResult<Patient> {
        let patient = Patient::new(validate_name(name)?);
        let mut next = Vec::with_capacity(self.patients.len() + 1);
        next.push(patient.clone());
        next.extend(self.patients.iter().cloned());

        self.commit(next)?;
        info!(patient_id = %patient.id, "Added patient");
        Ok(patient)
    }

    /// Add a patient whose history starts with `record`, in one write.
    pub fn create_patient_with_summary(
        &mut self,
        name: &str,
        record: SummaryRecord,
    ) -> StoreResult<Patient> {
        let mut patient = Patient::new(validate_name(name)?);
        patient.push_summary(record);

        let mut next = Vec::with_capacity(self.patients.len() + 1);
        next.push(patient.clone());
        next.extend(self.patients.iter().cloned());

        self.commit(next)?;
        info!(patient_id = %patient.id, "Added patient with first summary");
        Ok(patient)
    }

    /// Prepend a summary to a patient's history.
    pub fn append_summary(&mut self, patient_id: &str, record: SummaryRecord) -> StoreResult<()> {
        let mut next = self.patients.clone();
        let patient = next
            .iter_mut()
            .find(|p| p.id == patient_id)
            .ok_or_else(|| StoreError::NotFound(patient_id.to_string()))?;
        patient.push_summary(record);
        let history_len = patient.summaries.len();

        self.commit(next)?;
        info!(patient_id, history_len, "Appended summary");
        Ok(())
    }

    /// Merge identity fields into a patient.
    pub fn update_patient_identity(
        &mut self,
        patient_id: &str,
        update: &IdentityUpdate,
    ) -> StoreResult<Patient> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }

        let mut next = self.patients.clone();
        let patient = next
            .iter_mut()
            .find(|p| p.id == patient_id)
            .ok_or_else(|| StoreError::NotFound(patient_id.to_string()))?;
        patient.apply_identity(update);
        let updated = patient.clone();

        self.commit(next)?;
        Ok(updated)
    }

    /// Remove a patient and all history. Returns whether anything was removed.
    pub fn delete_patient(&mut self, patient_id: &str) -> StoreResult<bool> {
        if self.get_patient(patient_id).is_none() {
            return Ok(false);
        }

        let next = self
            .patients
            .iter()
            .filter(|p| p.id != patient_id)
            .cloned()
            .collect();

        self.commit(next)?;
        info!(patient_id, "Deleted patient");
        Ok(true)
    }

    /// Remove every patient.
    pub fn clear_all(&mut self) -> StoreResult<()> {
        self.commit(Vec::new())?;
        info!("Cleared all patients");
        Ok(())
    }
}

fn validate_name(name: &str) -> StoreResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput("Patient name is required".into()));
    }
    Ok(trimmed.to_string())
}
