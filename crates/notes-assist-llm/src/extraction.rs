//! Structured summary extraction from service output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::request::{
    SchemaVariant, SummaryRequest, FIELD_ACUTE_ISSUES, FIELD_KEY_CHANGES, FIELD_PAST_HISTORY,
    FIELD_PENDING_TASKS,
};
use crate::service::{Summarizer, SummarizerError};

/// Extraction errors.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Validated service output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryOutput {
    pub acute_issues: Vec<String>,
    pub pending_tasks: Vec<String>,
    pub past_history: Vec<String>,
    /// Present only when parsed against the UPDATE schema
    pub key_changes: Option<Vec<String>>,
}

/// Parse service output and check it against the declared schema.
///
/// Every field required by `variant` must be present and be a list of strings.
/// `Key Changes` on a CREATE response is ignored.
pub fn parse_summary_output(text: &str, variant: SchemaVariant) -> ExtractionResult<SummaryOutput> {
    // The model sometimes wraps the object in prose or a code fence
    let json_start = text.find('{').ok_or_else(|| {
        ExtractionError::InvalidFormat("No JSON object found in response".into())
    })?;
    let json_end = text.rfind('}').ok_or_else(|| {
        ExtractionError::InvalidFormat("No closing brace found in response".into())
    })?;
    if json_end < json_start {
        return Err(ExtractionError::InvalidFormat(
            "Closing brace precedes opening brace".into(),
        ));
    }

    let value: Value = serde_json::from_str(&text[json_start..=json_end])?;
    let object = value
        .as_object()
        .ok_or_else(|| ExtractionError::InvalidFormat("Expected a JSON object".into()))?;

    let key_changes = match variant {
        SchemaVariant::Create => None,
        SchemaVariant::Update => Some(string_list(object, FIELD_KEY_CHANGES)?),
    };

    Ok(SummaryOutput {
        acute_issues: string_list(object, FIELD_ACUTE_ISSUES)?,
        pending_tasks: string_list(object, FIELD_PENDING_TASKS)?,
        past_history: string_list(object, FIELD_PAST_HISTORY)?,
        key_changes,
    })
}

fn string_list(object: &Map<String, Value>, field: &str) -> ExtractionResult<Vec<String>> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ExtractionError::MissingField(field.to_string())),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ExtractionError::InvalidFormat(format!("\"{}\" must contain only strings", field))
                })
            })
            .collect(),
        Some(_) => Err(ExtractionError::InvalidFormat(format!(
            "\"{}\" must be a list of strings",
            field
        ))),
    }
}

/// Offline summarizer for testing and demos.
///
/// Splits the input into phrases and files them under acute issues. Updates carry
/// the previous state forward and report the new phrases as key changes. The
/// pending tasks always include its own worsening-symptoms advice.
pub struct MockSummarizer;

impl MockSummarizer {
    pub fn summarize_to_value(request: &SummaryRequest) -> Value {
        let mut phrases = split_phrases(request.text());
        if !request.attachments().is_empty() {
            phrases.push(format!(
                "Attachment reviewed ({} file(s))",
                request.attachments().len()
            ));
        }

        let previous: Map<String, Value> = request
            .prior_summary_context()
            .and_then(|context| serde_json::from_str(context).ok())
            .unwrap_or_default();
        let previous_list = |field: &str| -> Vec<String> {
            string_list(&previous, field).unwrap_or_default()
        };

        let mut acute_issues = previous_list(FIELD_ACUTE_ISSUES);
        let mut new_items = Vec::new();
        for phrase in phrases {
            let seen = acute_issues
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(&phrase));
            if !seen {
                acute_issues.push(phrase.clone());
                new_items.push(phrase);
            }
        }

        let mut pending_tasks = previous_list(FIELD_PENDING_TASKS);
        if pending_tasks.is_empty() {
            pending_tasks.push("Review in clinic in 1 week".to_string());
        }
        pending_tasks.push("Return if symptoms worsen".to_string());

        let mut output = Map::new();
        output.insert(FIELD_ACUTE_ISSUES.into(), to_value(acute_issues));
        output.insert(FIELD_PENDING_TASKS.into(), to_value(pending_tasks));
        output.insert(FIELD_PAST_HISTORY.into(), to_value(previous_list(FIELD_PAST_HISTORY)));

        if request.variant() == SchemaVariant::Update {
            let key_changes: Vec<String> = if new_items.is_empty() {
                vec!["No significant change".to_string()]
            } else {
                new_items.iter().map(|item| format!("New: {}", item)).collect()
            };
            output.insert(FIELD_KEY_CHANGES.into(), to_value(key_changes));
        }

        Value::Object(output)
    }
}

impl Summarizer for MockSummarizer {
    fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError> {
        Ok(Self::summarize_to_value(request).to_string())
    }
}

fn to_value(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}

/// Split free text into capitalised phrases.
fn split_phrases(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c == ';' || c == '\n')
        .flat_map(|part| part.split(" and "))
        .map(|phrase| {
            let phrase = phrase.trim();
            let lower = phrase.to_lowercase();
            let skip = ["now also ", "also ", "now "]
                .iter()
                .find(|prefix| lower.starts_with(*prefix))
                .map(|prefix| prefix.len())
                .unwrap_or(0);
            phrase.get(skip..).unwrap_or(phrase).trim().to_string()
        })
        .filter(|phrase| !phrase.is_empty())
        .map(|phrase| {
            let mut chars = phrase.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => phrase,
            }
        })
        .collect()
}
