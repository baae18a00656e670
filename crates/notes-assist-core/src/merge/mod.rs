//! Summary merge engine.
//!
//! Pipeline: Input validation → Mode (CREATE/UPDATE) → Request → Service →
//! Schema validation → Post-processing → Record Store
//!
//! Every step before the store write is pure or read-only, so a failure anywhere
//! leaves patients and history untouched.

mod postprocess;

pub use postprocess::*;

use notes_assist_llm::{
    parse_summary_output, Attachment, CreateRequest, ExtractionError, SchemaVariant, Summarizer,
    SummarizerError, SummaryRequest, UpdateRequest,
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::NotesConfig;
use crate::models::{ClinicalSummary, SummaryRecord};
use crate::store::{PersistencePort, RecordStore, StoreError};

/// Message shown for any service or response failure.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, the summary could not be generated. Please try again.";

/// Merge errors.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A submission is already in flight")]
    SubmissionInFlight,

    #[error("Stale submission dropped: {0}")]
    Stale(String),

    #[error("Summarization service error: {0}")]
    Service(#[from] SummarizerError),

    #[error("Invalid summary response: {0}")]
    InvalidResponse(#[from] ExtractionError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl MergeError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            MergeError::InvalidInput(msg) => msg.clone(),
            MergeError::SubmissionInFlight => {
                "A summary is already being generated. Please wait for it to finish.".into()
            }
            MergeError::Stale(_) => {
                "The patient changed before the summary arrived, so it was discarded.".into()
            }
            MergeError::Service(_) | MergeError::InvalidResponse(_) => {
                GENERIC_FAILURE_MESSAGE.into()
            }
            MergeError::Json(_) | MergeError::Store(_) => {
                "The summary could not be saved.".into()
            }
        }
    }
}

pub type MergeResult<T> = Result<T, MergeError>;

/// Whether a submission creates the first summary or updates the latest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

impl From<Mode> for SchemaVariant {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Create => SchemaVariant::Create,
            Mode::Update => SchemaVariant::Update,
        }
    }
}

/// Who a submission is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionTarget {
    /// An existing patient, by id
    Existing(String),
    /// A patient created when the summary commits
    New { name: String },
}

/// Raw user input for one submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionInput {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl SubmissionInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// No text and no attachments.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

/// Check input before any request is made.
pub fn validate_submission(target: &SubmissionTarget, input: &SubmissionInput) -> MergeResult<()> {
    if let SubmissionTarget::New { name } = target {
        if name.trim().is_empty() {
            return Err(MergeError::InvalidInput("Please enter a patient name.".into()));
        }
    }
    if input.is_empty() {
        return Err(MergeError::InvalidInput(
            "Please enter some notes or attach a file.".into(),
        ));
    }
    Ok(())
}

/// Builds requests and reconciles responses.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    safety_net_text: String,
    similarity_threshold: f64,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self {
            safety_net_text: DEFAULT_SAFETY_NET.to_string(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl MergeEngine {
    pub fn from_config(config: &NotesConfig) -> Self {
        Self {
            safety_net_text: config.safety_net_text().to_string(),
            similarity_threshold: config.similarity_threshold(),
        }
    }

    /// CREATE iff the target has no summary yet.
    pub fn mode_for<P: PersistencePort>(
        &self,
        store: &RecordStore<P>,
        target: &SubmissionTarget,
    ) -> MergeResult<Mode> {
        match target {
            SubmissionTarget::New { .. } => Ok(Mode::Create),
            SubmissionTarget::Existing(id) => {
                let patient = store
                    .get_patient(id)
                    .ok_or_else(|| MergeError::InvalidInput(format!("Unknown patient: {}", id)))?;
                Ok(if patient.has_summaries() {
                    Mode::Update
                } else {
                    Mode::Create
                })
            }
        }
    }

    /// Build the tagged request for a submission.
    pub fn build_request<P: PersistencePort>(
        &self,
        store: &RecordStore<P>,
        target: &SubmissionTarget,
        input: SubmissionInput,
    ) -> MergeResult<SummaryRequest> {
        validate_submission(target, &input)?;
        let mode = self.mode_for(store, target)?;
        debug!(?mode, attachments = input.attachments.len(), "Building summary request");

        let request = match (mode, target) {
            (Mode::Update, SubmissionTarget::Existing(id)) => {
                let latest = store
                    .latest_summary(id)
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                SummaryRequest::Update(UpdateRequest {
                    text: input.text,
                    attachments: input.attachments,
                    previous_summary: latest.summary().to_context_json()?,
                })
            }
            _ => SummaryRequest::Create(CreateRequest {
                text: input.text,
                attachments: input.attachments,
            }),
        };
        Ok(request)
    }

    /// Deterministic clean-up of a parsed summary.
    pub fn post_process(&self, summary: ClinicalSummary) -> ClinicalSummary {
        post_process(summary, &self.safety_net_text, self.similarity_threshold)
    }

    /// Validate raw service output and turn it into a record stamped now.
    pub fn reconcile(&self, variant: SchemaVariant, raw_response: &str) -> MergeResult<SummaryRecord> {
        let output = parse_summary_output(raw_response, variant).map_err(|e| {
            error!(?variant, error = %e, "Summary response failed validation");
            e
        })?;
        let summary = self.post_process(output.into());
        Ok(SummaryRecord::new(summary))
    }

    /// Write a record for the target. Returns the patient id.
    pub fn commit<P: PersistencePort>(
        &self,
        store: &mut RecordStore<P>,
        target: &SubmissionTarget,
        record: SummaryRecord,
    ) -> MergeResult<String> {
        let patient_id = match target {
            SubmissionTarget::Existing(id) => {
                store.append_summary(id, record)?;
                id.clone()
            }
            SubmissionTarget::New { name } => store.create_patient_with_summary(name, record)?.id,
        };
        info!(patient_id = %patient_id, "Committed summary");
        Ok(patient_id)
    }

    /// Request, reconcile and commit in one call. All or nothing.
    pub fn run<P, S>(
        &self,
        store: &mut RecordStore<P>,
        target: &SubmissionTarget,
        input: SubmissionInput,
        service: &S,
    ) -> MergeResult<String>
    where
        P: PersistencePort,
        S: Summarizer + ?Sized,
    {
        let request = self.build_request(store, target, input)?;
        let raw_response = service.summarize(&request).map_err(|e| {
            error!(error = %e, "Summarization service failed");
            e
        })?;
        let record = self.reconcile(request.variant(), &raw_response)?;
        self.commit(store, target, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;
    use notes_assist_llm::MockSummarizer;

    fn setup_store() -> RecordStore<MemoryBlobStore> {
        RecordStore::open(MemoryBlobStore::new(), "patients")
    }

    fn new_target(name: &str) -> SubmissionTarget {
        SubmissionTarget::New { name: name.into() }
    }

    #[test]
    fn test_mode_for_new_and_existing() {
        let engine = MergeEngine::default();
        let mut store = setup_store();
        let patient = store.add_patient("Jane Doe").unwrap();
        let existing = SubmissionTarget::Existing(patient.id.clone());

        assert_eq!(engine.mode_for(&store, &new_target("John")).unwrap(), Mode::Create);
        assert_eq!(engine.mode_for(&store, &existing).unwrap(), Mode::Create);

        store
            .append_summary(&patient.id, SummaryRecord::new(ClinicalSummary::default()))
            .unwrap();
        assert_eq!(engine.mode_for(&store, &existing).unwrap(), Mode::Update);

        let unknown = SubmissionTarget::Existing("missing".into());
        assert!(matches!(engine.mode_for(&store, &unknown), Err(MergeError::InvalidInput(_))));
    }

    #[test]
    fn test_update_request_embeds_latest_summary() {
        let engine = MergeEngine::default();
        let mut store = setup_store();
        let patient = store.add_patient("Jane Doe").unwrap();
        let older = ClinicalSummary {
            acute_issues: vec!["Cough".into()],
            ..Default::default()
        };
        let newer = ClinicalSummary {
            acute_issues: vec!["Fever".into()],
            ..Default::default()
        };
        store.append_summary(&patient.id, SummaryRecord::new(older)).unwrap();
        store.append_summary(&patient.id, SummaryRecord::new(newer.clone())).unwrap();

        let request = engine
            .build_request(
                &store,
                &SubmissionTarget::Existing(patient.id),
                SubmissionInput::new("now also confused"),
            )
            .unwrap();

        match request {
            SummaryRequest::Update(update) => {
                assert_eq!(update.previous_summary, newer.to_context_json().unwrap());
                assert_eq!(update.text, "now also confused");
            }
            other => panic!("expected update request, got {:?}", other),
        }
    }

    #[test]
    fn test_input_validation() {
        let engine = MergeEngine::default();
        let store = setup_store();

        let err = engine
            .build_request(&store, &new_target("  "), SubmissionInput::new("cough"))
            .unwrap_err();
        assert!(matches!(err, MergeError::InvalidInput(_)));

        let err = engine
            .build_request(&store, &new_target("Jane"), SubmissionInput::new("   "))
            .unwrap_err();
        assert_eq!(err.user_message(), "Please enter some notes or attach a file.");

        let attachment_only = SubmissionInput::default()
            .with_attachment(Attachment::from_bytes("application/pdf", b"%PDF"));
        assert!(engine
            .build_request(&store, &new_target("Jane"), attachment_only)
            .is_ok());
    }

    #[test]
    fn test_reconcile_adds_safety_net() {
        let engine = MergeEngine::default();
        let raw = r#"{"Acute Issues":["Cough"],"Pending Tasks and action Plan":["Return if symptoms worsen","CXR"],"Past medical history":[]}"#;

        let record = engine.reconcile(SchemaVariant::Create, raw).unwrap();
        let tasks = &record.summary().pending_tasks;
        assert_eq!(tasks, &vec!["CXR".to_string(), DEFAULT_SAFETY_NET.to_string()]);
        assert!(!record.is_update());
    }

    #[test]
    fn test_run_with_mock_summarizer() {
        let engine = MergeEngine::default();
        let mut store = setup_store();

        let patient_id = engine
            .run(&mut store, &new_target("Jane Doe"), SubmissionInput::new("cough, fever"), &MockSummarizer)
            .unwrap();

        let latest = store.latest_summary(&patient_id).unwrap();
        assert_eq!(latest.summary().acute_issues, vec!["Cough", "Fever"]);
    }

    #[test]
    fn test_service_failure_is_generic_and_leaves_store() {
        let engine = MergeEngine::default();
        let mut store = setup_store();
        let failing = |_: &SummaryRequest| -> Result<String, SummarizerError> {
            Err(SummarizerError::Transport("connection reset".into()))
        };

        let err = engine
            .run(&mut store, &new_target("Jane Doe"), SubmissionInput::new("cough"), &failing)
            .unwrap_err();

        assert!(matches!(err, MergeError::Service(_)));
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_failure_leaves_history() {
        let engine = MergeEngine::default();
        let blobs = MemoryBlobStore::new();
        let mut store = RecordStore::open(blobs.clone(), "patients");
        let patient = store.add_patient("Jane Doe").unwrap();

        blobs.set_fail_writes(true);
        let err = engine
            .run(
                &mut store,
                &SubmissionTarget::Existing(patient.id.clone()),
                SubmissionInput::new("cough"),
                &MockSummarizer,
            )
            .unwrap_err();

        assert!(matches!(err, MergeError::Store(_)));
        assert!(!store.get_patient(&patient.id).unwrap().has_summaries());
    }
}
