//! Notes-Assist Core Library
//!
//! Local-first clinical summary store with versioned per-patient history.
//!
//! # Architecture
//!
//! ```text
//! Notes + attachments ──► Merge Engine ──► CREATE / UPDATE request
//!                              ▲                     │
//!                              │                     ▼
//!                  latest summary (index 0)   Summarization Service
//!                              │                     │
//!                       ┌──────┴──────┐              ▼
//!                       │ Record Store │◄── validate → dedupe → safety-net
//!                       └──────┬──────┘
//!                              │ one blob, one key, every mutation
//!                              ▼
//!                        Key-value storage
//! ```
//!
//! # Core Principle
//!
//! **Submissions are all or nothing.** A service failure, a malformed response or
//! a response that arrives after the user moved on never touches stored history.
//!
//! # Modules
//!
//! - [`store`]: Record store and key-value persistence ports
//! - [`models`]: Domain types (Patient, ClinicalSummary, SummaryRecord)
//! - [`merge`]: Request building, response validation and post-processing
//! - [`view`]: Selected patient and viewed summary version
//! - [`session`]: Single-submission coordination with stale-response guard
//! - [`config`]: Startup configuration

pub mod config;
pub mod merge;
pub mod models;
pub mod session;
pub mod store;
pub mod view;

// Re-export commonly used types
pub use config::NotesConfig;
pub use merge::{MergeEngine, MergeError, Mode, SubmissionInput, SubmissionTarget};
pub use models::{ClinicalSummary, IdentityUpdate, Patient, SummaryRecord};
pub use session::{NotesSession, SubmissionTicket};
pub use store::{MemoryBlobStore, PersistencePort, RecordStore, SqliteBlobStore};
pub use view::{filter_patients, ViewSelection};

use notes_assist_llm::{Attachment, SummarizerError};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum NotesAssistError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("{0}")]
    SubmissionFailed(String),

    #[error("{0}")]
    SubmissionInFlight(String),

    #[error("{0}")]
    StaleSubmission(String),
}

impl From<store::StoreError> for NotesAssistError {
    fn from(e: store::StoreError) -> Self {
        match e {
            store::StoreError::NotFound(id) => NotesAssistError::NotFound(id),
            store::StoreError::InvalidInput(msg) => NotesAssistError::InvalidInput(msg),
            store::StoreError::Json(e) => NotesAssistError::SerializationError(e.to_string()),
            other => NotesAssistError::StorageError(other.to_string()),
        }
    }
}

impl From<MergeError> for NotesAssistError {
    fn from(e: MergeError) -> Self {
        let message = e.user_message();
        match e {
            MergeError::InvalidInput(msg) => NotesAssistError::InvalidInput(msg),
            MergeError::SubmissionInFlight => NotesAssistError::SubmissionInFlight(message),
            MergeError::Stale(_) => NotesAssistError::StaleSubmission(message),
            MergeError::Service(_) | MergeError::InvalidResponse(_) => {
                NotesAssistError::SubmissionFailed(message)
            }
            MergeError::Json(e) => NotesAssistError::SerializationError(e.to_string()),
            MergeError::Store(e) => e.into(),
        }
    }
}

impl From<serde_json::Error> for NotesAssistError {
    fn from(e: serde_json::Error) -> Self {
        NotesAssistError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for NotesAssistError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        NotesAssistError::StorageError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install a log subscriber. Safe to call more than once.
#[uniffi::export]
pub fn init_logging(filter: String) {
    let filter = tracing_subscriber::EnvFilter::try_new(&filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Open or create the notes store described by `config`.
#[uniffi::export]
pub fn open_notes(config: FfiNotesConfig) -> Result<Arc<NotesAssistCore>, NotesAssistError> {
    let config: NotesConfig = config.try_into()?;
    let port = SqliteBlobStore::open(config.database_path())?;
    Ok(Arc::new(NotesAssistCore {
        session: Arc::new(Mutex::new(NotesSession::open(port, &config))),
    }))
}

/// Create an in-memory notes store (for testing).
#[uniffi::export]
pub fn open_notes_in_memory() -> Result<Arc<NotesAssistCore>, NotesAssistError> {
    let port = SqliteBlobStore::open_in_memory()?;
    Ok(Arc::new(NotesAssistCore {
        session: Arc::new(Mutex::new(NotesSession::open(port, &NotesConfig::default()))),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe session wrapper for FFI.
#[derive(uniffi::Object)]
pub struct NotesAssistCore {
    session: Arc<Mutex<NotesSession<SqliteBlobStore>>>,
}

#[uniffi::export]
impl NotesAssistCore {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Create a new patient with no history.
    pub fn add_patient(&self, name: String) -> Result<FfiPatient, NotesAssistError> {
        let mut session = self.session.lock()?;
        let patient = session.add_patient(&name)?;
        Ok(patient.into())
    }

    /// Get a patient by id.
    pub fn get_patient(&self, patient_id: String) -> Result<Option<FfiPatient>, NotesAssistError> {
        let session = self.session.lock()?;
        Ok(session.store().get_patient(&patient_id).map(|p| p.into()))
    }

    /// Patients whose name contains `query`, newest first.
    pub fn search_patients(&self, query: String) -> Result<Vec<FfiPatient>, NotesAssistError> {
        let session = self.session.lock()?;
        Ok(session.search(&query).into_iter().map(|p| p.into()).collect())
    }

    /// Edit name, date of birth or external id.
    pub fn update_patient_identity(
        &self,
        patient_id: String,
        update: FfiIdentityUpdate,
    ) -> Result<FfiPatient, NotesAssistError> {
        let mut session = self.session.lock()?;
        let patient = session.update_patient_identity(&patient_id, &update.into())?;
        Ok(patient.into())
    }

    /// Delete a patient and all history. The host confirms with the user first.
    pub fn delete_patient(&self, patient_id: String) -> Result<bool, NotesAssistError> {
        let mut session = self.session.lock()?;
        Ok(session.delete_patient(&patient_id)?)
    }

    /// Delete every patient.
    pub fn clear_all(&self) -> Result<(), NotesAssistError> {
        let mut session = self.session.lock()?;
        session.clear_all()?;
        Ok(())
    }

    /// Full summary history for a patient, newest first.
    pub fn get_history(&self, patient_id: String) -> Result<Vec<FfiSummaryRecord>, NotesAssistError> {
        let session = self.session.lock()?;
        let patient = session
            .store()
            .get_patient(&patient_id)
            .ok_or_else(|| NotesAssistError::NotFound(patient_id.clone()))?;
        Ok(patient.summaries.iter().map(|r| r.into()).collect())
    }

    // =========================================================================
    // View Operations
    // =========================================================================

    pub fn select_patient(&self, patient_id: String) -> Result<(), NotesAssistError> {
        let mut session = self.session.lock()?;
        session.select_patient(&patient_id)?;
        Ok(())
    }

    pub fn clear_selection(&self) -> Result<(), NotesAssistError> {
        let mut session = self.session.lock()?;
        session.clear_selection();
        Ok(())
    }

    /// Show summary version `index` (0 = newest) of the selected patient.
    pub fn view_version(&self, index: u32) -> Result<(), NotesAssistError> {
        let mut session = self.session.lock()?;
        session.view_version(index as usize);
        Ok(())
    }

    /// What is currently on screen.
    pub fn get_view(&self) -> Result<FfiViewState, NotesAssistError> {
        let session = self.session.lock()?;
        let patient = session.selected_patient();
        Ok(FfiViewState {
            patient_id: patient.map(|p| p.id.clone()),
            version_index: session.view().index() as u32,
            history_len: patient.map(|p| p.summaries.len() as u32).unwrap_or(0),
            summary: session.current_record().map(|r| r.into()),
            is_submitting: session.is_submitting(),
        })
    }

    // =========================================================================
    // Submission Operations
    // =========================================================================

    /// Start a submission and get the request body to send to the service.
    pub fn begin_submission(
        &self,
        text: String,
        attachments: Vec<FfiAttachment>,
        new_patient_name: Option<String>,
    ) -> Result<FfiSubmissionTicket, NotesAssistError> {
        let mut session = self.session.lock()?;
        let input = SubmissionInput {
            text,
            attachments: attachments.into_iter().map(|a| a.into()).collect(),
        };
        let ticket = session.begin_submission(input, new_patient_name.as_deref())?;
        Ok(FfiSubmissionTicket {
            token: ticket.token,
            mode: format!("{:?}", ticket.request.variant()),
            request_body_json: serde_json::to_string(&ticket.request.to_generate_content_body())?,
        })
    }

    /// Finish a submission with the service's raw response text.
    pub fn complete_submission(
        &self,
        token: u64,
        response_text: String,
    ) -> Result<FfiPatient, NotesAssistError> {
        let mut session = self.session.lock()?;
        let patient_id = session.complete_submission(token, &response_text)?;
        let patient = session
            .store()
            .get_patient(&patient_id)
            .ok_or(NotesAssistError::NotFound(patient_id))?;
        Ok(patient.into())
    }

    /// Report that the service call failed. Returns the message to show.
    pub fn fail_submission(&self, token: u64, detail: String) -> Result<String, NotesAssistError> {
        let mut session = self.session.lock()?;
        let error = session.fail_submission(token, SummarizerError::Transport(detail));
        Ok(error.user_message())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe configuration. Unset fields take defaults.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNotesConfig {
    pub database_path: String,
    pub storage_key: Option<String>,
    pub similarity_threshold: Option<f64>,
    pub safety_net_text: Option<String>,
}

impl TryFrom<FfiNotesConfig> for NotesConfig {
    type Error = NotesAssistError;

    fn try_from(config: FfiNotesConfig) -> Result<Self, Self::Error> {
        let defaults = NotesConfig::default();
        Ok(NotesConfig::new(
            PathBuf::from(config.database_path),
            config
                .storage_key
                .unwrap_or_else(|| defaults.storage_key().to_string()),
            config
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold()),
            config
                .safety_net_text
                .unwrap_or_else(|| defaults.safety_net_text().to_string()),
        )?)
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub date_of_birth: Option<String>,
    pub external_id: Option<String>,
    pub created_at: String,
    pub summary_count: u32,
}

impl From<&Patient> for FfiPatient {
    fn from(patient: &Patient) -> Self {
        Self {
            id: patient.id.clone(),
            name: patient.name.clone(),
            date_of_birth: patient.date_of_birth.clone(),
            external_id: patient.external_id.clone(),
            created_at: patient.created_at.clone(),
            summary_count: patient.summaries.len() as u32,
        }
    }
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        (&patient).into()
    }
}

/// FFI-safe identity update.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiIdentityUpdate {
    pub name: Option<String>,
    pub date_of_birth: Option<String>,
    pub external_id: Option<String>,
}

impl From<FfiIdentityUpdate> for IdentityUpdate {
    fn from(update: FfiIdentityUpdate) -> Self {
        IdentityUpdate {
            name: update.name,
            date_of_birth: update.date_of_birth,
            external_id: update.external_id,
        }
    }
}

/// FFI-safe summary record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSummaryRecord {
    pub created_at: String,
    pub acute_issues: Vec<String>,
    pub pending_tasks: Vec<String>,
    pub past_history: Vec<String>,
    pub key_changes: Option<Vec<String>>,
}

impl From<&SummaryRecord> for FfiSummaryRecord {
    fn from(record: &SummaryRecord) -> Self {
        let summary = record.summary();
        Self {
            created_at: record.created_at().to_string(),
            acute_issues: summary.acute_issues.clone(),
            pending_tasks: summary.pending_tasks.clone(),
            past_history: summary.past_history.clone(),
            key_changes: summary.key_changes.clone(),
        }
    }
}

/// FFI-safe attachment; bytes are base64-encoded on the way in.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAttachment {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub file_name: Option<String>,
}

impl From<FfiAttachment> for Attachment {
    fn from(attachment: FfiAttachment) -> Self {
        let mut encoded = Attachment::from_bytes(attachment.mime_type, &attachment.data);
        encoded.file_name = attachment.file_name;
        encoded
    }
}

/// FFI-safe submission ticket.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSubmissionTicket {
    pub token: u64,
    /// "Create" or "Update"
    pub mode: String,
    /// generateContent request body
    pub request_body_json: String,
}

/// FFI-safe view state.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiViewState {
    pub patient_id: Option<String>,
    pub version_index: u32,
    pub history_len: u32,
    /// `None` when no summary is shown
    pub summary: Option<FfiSummaryRecord>,
    pub is_submitting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use notes_assist_llm::MockSummarizer;

    fn create_response(text: &str) -> String {
        let request = notes_assist_llm::SummaryRequest::Create(notes_assist_llm::CreateRequest {
            text: text.into(),
            attachments: vec![],
        });
        MockSummarizer::summarize_to_value(&request).to_string()
    }

    #[test]
    fn test_ffi_submission_flow() {
        let core = open_notes_in_memory().unwrap();

        let ticket = core
            .begin_submission("cough, fever".into(), vec![], Some("Jane Doe".into()))
            .unwrap();
        assert_eq!(ticket.mode, "Create");
        assert!(core.get_view().unwrap().is_submitting);

        assert!(ticket.request_body_json.contains("generationConfig"));

        let patient = core
            .complete_submission(ticket.token, create_response("cough, fever"))
            .unwrap();
        assert_eq!(patient.name, "Jane Doe");
        assert_eq!(patient.summary_count, 1);

        let view = core.get_view().unwrap();
        assert_eq!(view.patient_id, Some(patient.id));
        assert_eq!(view.history_len, 1);
        assert!(view.summary.unwrap().key_changes.is_none());
    }

    #[test]
    fn test_ffi_errors_map_to_user_messages() {
        let core = open_notes_in_memory().unwrap();

        let err = core.begin_submission("".into(), vec![], Some("Jane".into())).unwrap_err();
        assert!(matches!(err, NotesAssistError::InvalidInput(_)));

        let ticket = core
            .begin_submission("cough".into(), vec![], Some("Jane".into()))
            .unwrap();
        let busy = core
            .begin_submission("cough".into(), vec![], Some("Jane".into()))
            .unwrap_err();
        assert!(matches!(busy, NotesAssistError::SubmissionInFlight(_)));

        let message = core.fail_submission(ticket.token, "timeout".into()).unwrap();
        assert_eq!(message, merge::GENERIC_FAILURE_MESSAGE);
        assert!(core.search_patients("".into()).unwrap().is_empty());
    }

    #[test]
    fn test_ffi_attachment_is_encoded() {
        let attachment: Attachment = FfiAttachment {
            mime_type: "text/plain".into(),
            data: b"hello".to_vec(),
            file_name: Some("note.txt".into()),
        }
        .into();
        assert_eq!(attachment.data, "aGVsbG8=");
        assert_eq!(attachment.file_name.as_deref(), Some("note.txt"));
    }

    #[test]
    fn test_open_notes_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = FfiNotesConfig {
            database_path: dir.path().join("notes.db").to_string_lossy().into_owned(),
            storage_key: None,
            similarity_threshold: None,
            safety_net_text: None,
        };

        let core = open_notes(config.clone()).unwrap();
        let patient = core.add_patient("Jane Doe".into()).unwrap();
        drop(core);

        let reopened = open_notes(config).unwrap();
        assert!(reopened.get_patient(patient.id).unwrap().is_some());
    }
}
