//! One form context: store, view selection and the in-flight submission.
//!
//! At most one submission is outstanding. Every context change (selecting another
//! patient, deleting, clearing) bumps a generation counter and abandons the
//! outstanding submission, so a response that arrives late is dropped instead of
//! being written to the wrong place.

use notes_assist_llm::{SchemaVariant, Summarizer, SummarizerError, SummaryRequest};
use tracing::{error, info, warn};

use crate::config::NotesConfig;
use crate::merge::{MergeEngine, MergeError, MergeResult, SubmissionInput, SubmissionTarget};
use crate::models::{IdentityUpdate, Patient, SummaryRecord};
use crate::store::{PersistencePort, RecordStore, StoreError};
use crate::view::{filter_patients, ViewSelection};

/// Handed to the caller when a submission starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionTicket {
    /// Pass back to `complete_submission` / `fail_submission`
    pub token: u64,
    pub request: SummaryRequest,
}

#[derive(Debug, Clone)]
struct PendingSubmission {
    token: u64,
    target: SubmissionTarget,
    variant: SchemaVariant,
}

pub struct NotesSession<P: PersistencePort> {
    store: RecordStore<P>,
    view: ViewSelection,
    engine: MergeEngine,
    generation: u64,
    in_flight: Option<PendingSubmission>,
}

impl<P: PersistencePort> NotesSession<P> {
    pub fn new(store: RecordStore<P>, engine: MergeEngine) -> Self {
        Self {
            store,
            view: ViewSelection::new(),
            engine,
            generation: 0,
            in_flight: None,
        }
    }

    /// Restore the store from `port` and configure the engine.
    pub fn open(port: P, config: &NotesConfig) -> Self {
        let store = RecordStore::open(port, config.storage_key());
        Self::new(store, MergeEngine::from_config(config))
    }

    pub fn store(&self) -> &RecordStore<P> {
        &self.store
    }

    pub fn view(&self) -> &ViewSelection {
        &self.view
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a submission is outstanding; the UI disables submit while true.
    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.in_flight.take() {
            info!(token = pending.token, "Abandoned in-flight submission");
        }
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn select_patient(&mut self, patient_id: &str) -> MergeResult<()> {
        if self.store.get_patient(patient_id).is_none() {
            return Err(StoreError::NotFound(patient_id.to_string()).into());
        }
        self.bump_generation();
        self.view.select(patient_id);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.bump_generation();
        self.view.clear();
    }

    /// Browse history. Does not touch stored data or the in-flight submission.
    pub fn view_version(&mut self, index: usize) {
        self.view.view_version(index);
    }

    pub fn selected_patient(&self) -> Option<&Patient> {
        self.view.selected_patient(&self.store)
    }

    pub fn current_record(&self) -> Option<&SummaryRecord> {
        self.view.current_record(&self.store)
    }

    pub fn search(&self, query: &str) -> Vec<&Patient> {
        filter_patients(self.store.patients(), query)
    }

    // =========================================================================
    // Patients
    // =========================================================================

    pub fn add_patient(&mut self, name: &str) -> MergeResult<Patient> {
        Ok(self.store.add_patient(name)?)
    }

    pub fn update_patient_identity(
        &mut self,
        patient_id: &str,
        update: &IdentityUpdate,
    ) -> MergeResult<Patient> {
        Ok(self.store.update_patient_identity(patient_id, update)?)
    }

    /// Delete a patient. If they were selected the selection is cleared too.
    pub fn delete_patient(&mut self, patient_id: &str) -> MergeResult<bool> {
        let removed = self.store.delete_patient(patient_id)?;
        let pending_for_patient = matches!(
            &self.in_flight,
            Some(PendingSubmission { target: SubmissionTarget::Existing(id), .. }) if id == patient_id
        );
        if self.view.on_patient_removed(patient_id) || pending_for_patient {
            self.bump_generation();
        }
        Ok(removed)
    }

    pub fn clear_all(&mut self) -> MergeResult<()> {
        self.store.clear_all()?;
        self.bump_generation();
        self.view.clear();
        Ok(())
    }

    // =========================================================================
    // Submissions
    // =========================================================================

    fn current_target(&self, new_patient_name: Option<&str>) -> SubmissionTarget {
        match self.view.patient_id() {
            Some(id) => SubmissionTarget::Existing(id.to_string()),
            None => SubmissionTarget::New {
                name: new_patient_name.unwrap_or_default().trim().to_string(),
            },
        }
    }

    /// Start a submission for the selected patient, or for a new patient named
    /// `new_patient_name` when nobody is selected.
    pub fn begin_submission(
        &mut self,
        input: SubmissionInput,
        new_patient_name: Option<&str>,
    ) -> MergeResult<SubmissionTicket> {
        if self.in_flight.is_some() {
            return Err(MergeError::SubmissionInFlight);
        }

        let target = self.current_target(new_patient_name);
        let request = self.engine.build_request(&self.store, &target, input)?;

        self.generation += 1;
        let token = self.generation;
        self.in_flight = Some(PendingSubmission {
            token,
            target,
            variant: request.variant(),
        });
        info!(token, variant = ?request.variant(), "Submission started");

        Ok(SubmissionTicket { token, request })
    }

    /// Finish a submission with the raw service response. Returns the patient id.
    pub fn complete_submission(&mut self, token: u64, raw_response: &str) -> MergeResult<String> {
        let pending = match self.in_flight.take() {
            Some(pending) if pending.token == token && pending.token == self.generation => pending,
            other => {
                self.in_flight = other;
                warn!(token, generation = self.generation, "Dropping response for a stale submission");
                return Err(MergeError::Stale(format!(
                    "submission {} is no longer current",
                    token
                )));
            }
        };

        let record = self.engine.reconcile(pending.variant, raw_response)?;
        let patient_id = self.engine.commit(&mut self.store, &pending.target, record)?;

        self.generation += 1;
        self.view.select(patient_id.clone());
        Ok(patient_id)
    }

    /// Record a service failure for the submission. Nothing is written.
    pub fn fail_submission(&mut self, token: u64, service_error: SummarizerError) -> MergeError {
        if self.in_flight.as_ref().map(|pending| pending.token) != Some(token) {
            warn!(token, "Ignoring failure for a stale submission");
            return MergeError::Stale(format!("submission {} is no longer current", token));
        }

        self.in_flight = None;
        error!(token, error = %service_error, "Summarization service failed");
        MergeError::Service(service_error)
    }

    /// Begin, call `service`, and complete in one step.
    pub fn submit<S: Summarizer + ?Sized>(
        &mut self,
        input: SubmissionInput,
        new_patient_name: Option<&str>,
        service: &S,
    ) -> MergeResult<String> {
        let ticket = self.begin_submission(input, new_patient_name)?;
        match service.summarize(&ticket.request) {
            Ok(raw_response) => self.complete_submission(ticket.token, &raw_response),
            Err(e) => Err(self.fail_submission(ticket.token, e)),
        }
    }
}
