//! Snapshot persistence tests against SQLite and the in-memory port.

use notes_assist_core::models::{ClinicalSummary, SummaryRecord};
use notes_assist_core::store::{
    decode_snapshot, encode_snapshot, MemoryBlobStore, PersistencePort, RecordStore,
    SqliteBlobStore,
};
use notes_assist_core::{NotesConfig, NotesSession, SubmissionInput};
use notes_assist_llm::MockSummarizer;
use proptest::prelude::*;

const KEY: &str = "clinical_notes.patients";

fn summary_with_issue(issue: &str) -> SummaryRecord {
    SummaryRecord::new(ClinicalSummary {
        acute_issues: vec![issue.to_string()],
        ..Default::default()
    })
}

#[test]
fn test_session_survives_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = NotesConfig::with_database_path(dir.path().join("notes.db"));

    let patient_id = {
        let port = SqliteBlobStore::open(config.database_path()).unwrap();
        let mut session = NotesSession::open(port, &config);
        let id = session
            .submit(SubmissionInput::new("cough, fever"), Some("Jane Doe"), &MockSummarizer)
            .unwrap();
        session
            .submit(SubmissionInput::new("now also confused"), None, &MockSummarizer)
            .unwrap();
        id
    };

    let port = SqliteBlobStore::open(config.database_path()).unwrap();
    let session = NotesSession::open(port, &config);
    let patient = session.store().get_patient(&patient_id).unwrap();

    assert_eq!(patient.name, "Jane Doe");
    assert_eq!(patient.summaries.len(), 2);
    assert!(patient.summaries[0].is_update());
    assert!(!patient.summaries[1].is_update());
    // View state is not persisted
    assert!(session.view().patient_id().is_none());
}

#[test]
fn test_corrupt_blob_starts_empty() {
    let mut port = SqliteBlobStore::open_in_memory().unwrap();
    port.save_blob(KEY, "{not json").unwrap();

    let store = RecordStore::open(port, KEY);
    assert!(store.is_empty());
}

#[test]
fn test_legacy_array_blob_is_read() {
    let blobs = MemoryBlobStore::new();
    let mut store = RecordStore::open(blobs.clone(), KEY);
    let patient = store.add_patient("Jane Doe").unwrap();

    let legacy = serde_json::to_string(store.patients()).unwrap();
    blobs.insert(KEY, &legacy).unwrap();

    let reopened = RecordStore::open(blobs, KEY);
    assert_eq!(reopened.get_patient(&patient.id).unwrap().name, "Jane Doe");
}

#[test]
fn test_failed_write_keeps_memory_and_disk_in_step() {
    let blobs = MemoryBlobStore::new();
    let mut store = RecordStore::open(blobs.clone(), KEY);
    let patient = store.add_patient("Jane Doe").unwrap();
    let before = blobs.get(KEY).unwrap();

    blobs.set_fail_writes(true);
    assert!(store.append_summary(&patient.id, summary_with_issue("Cough")).is_err());
    assert!(store.delete_patient(&patient.id).is_err());

    assert_eq!(blobs.get(KEY).unwrap(), before);
    assert!(!store.get_patient(&patient.id).unwrap().has_summaries());
}

#[derive(Debug, Clone)]
enum Op {
    Add(String),
    Delete(usize),
    Append(usize, String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[A-Za-z][A-Za-z ]{0,15}".prop_map(Op::Add),
        (0usize..8).prop_map(Op::Delete),
        (0usize..8, "[a-z ]{1,20}").prop_map(|(i, s)| Op::Append(i, s)),
    ]
}

proptest! {
    #[test]
    fn prop_save_load_round_trip(ops in prop::collection::vec(op_strategy(), 0..25)) {
        let blobs = MemoryBlobStore::new();
        let mut store = RecordStore::open(blobs.clone(), KEY);

        for op in ops {
            match op {
                Op::Add(name) => {
                    store.add_patient(&name).unwrap();
                }
                Op::Delete(i) => {
                    if let Some(id) = store.patients().get(i).map(|p| p.id.clone()) {
                        prop_assert!(store.delete_patient(&id).unwrap());
                    }
                }
                Op::Append(i, issue) => {
                    if let Some(id) = store.patients().get(i).map(|p| p.id.clone()) {
                        store.append_summary(&id, summary_with_issue(&issue)).unwrap();
                    }
                }
            }
        }

        let reopened = RecordStore::open(blobs.clone(), KEY);
        prop_assert_eq!(reopened.patients(), store.patients());

        let blob = encode_snapshot(store.patients()).unwrap();
        prop_assert_eq!(decode_snapshot(&blob).unwrap(), store.patients().to_vec());
    }

    #[test]
    fn prop_newest_summary_first(issues in prop::collection::vec("[a-z]{1,12}", 1..10)) {
        let mut store = RecordStore::open(MemoryBlobStore::new(), KEY);
        let patient = store.add_patient("Jane Doe").unwrap();

        for issue in &issues {
            store.append_summary(&patient.id, summary_with_issue(issue)).unwrap();
            let latest = store.latest_summary(&patient.id).unwrap();
            prop_assert_eq!(&latest.summary().acute_issues[0], issue);
        }

        let history: Vec<&str> = store
            .get_patient(&patient.id)
            .unwrap()
            .summaries
            .iter()
            .map(|r| r.summary().acute_issues[0].as_str())
            .collect();
        let expected: Vec<&str> = issues.iter().rev().map(|s| s.as_str()).collect();
        prop_assert_eq!(history, expected);
    }
}
