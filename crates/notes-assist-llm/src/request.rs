//! Summary requests sent to the summarization service.
//!
//! A request is either a [`CreateRequest`] (no prior summary for the patient) or an
//! [`UpdateRequest`] (the latest summary is embedded and the service is asked to
//! report what changed). The two variants carry different response schemas.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::prompts::{make_create_prompt, make_update_prompt, SYSTEM_PROMPT};

/// Response field: acute issues.
pub const FIELD_ACUTE_ISSUES: &str = "Acute Issues";
/// Response field: pending tasks and action plan.
pub const FIELD_PENDING_TASKS: &str = "Pending Tasks and action Plan";
/// Response field: past medical history.
pub const FIELD_PAST_HISTORY: &str = "Past medical history";
/// Response field: key changes (UPDATE only).
pub const FIELD_KEY_CHANGES: &str = "Key Changes";

/// Which response schema a request declares.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SchemaVariant {
    Create,
    Update,
}

impl SchemaVariant {
    /// Fields the service must return for this variant, in display order.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            SchemaVariant::Create => &[FIELD_ACUTE_ISSUES, FIELD_PENDING_TASKS, FIELD_PAST_HISTORY],
            SchemaVariant::Update => &[
                FIELD_ACUTE_ISSUES,
                FIELD_PENDING_TASKS,
                FIELD_PAST_HISTORY,
                FIELD_KEY_CHANGES,
            ],
        }
    }

    /// Response schema in the OpenAPI subset accepted by generateContent.
    pub fn response_schema(&self) -> Value {
        let string_list = json!({ "type": "ARRAY", "items": { "type": "STRING" } });
        let mut properties = serde_json::Map::new();
        for field in self.required_fields() {
            properties.insert((*field).to_string(), string_list.clone());
        }

        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": self.required_fields(),
        })
    }
}

/// A user-supplied file, carried as base64 text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    /// Standard base64 of the file bytes
    pub data: String,
    pub file_name: Option<String>,
}

impl Attachment {
    /// Encode raw bytes.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
            file_name: None,
        }
    }

    /// Read a file and encode it, guessing the MIME type from the extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut attachment = Self::from_bytes(guess_mime_type(path), &bytes);
        attachment.file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(attachment)
    }

    /// Decode back to bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// Guess a MIME type from a file extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

/// Request for a first summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateRequest {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// Request for an updated summary diffed against `previous_summary`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateRequest {
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// JSON of the latest summary record, using the response field names
    pub previous_summary: String,
}

/// Tagged summary request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SummaryRequest {
    Create(CreateRequest),
    Update(UpdateRequest),
}

impl SummaryRequest {
    pub fn variant(&self) -> SchemaVariant {
        match self {
            SummaryRequest::Create(_) => SchemaVariant::Create,
            SummaryRequest::Update(_) => SchemaVariant::Update,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            SummaryRequest::Create(r) => &r.text,
            SummaryRequest::Update(r) => &r.text,
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        match self {
            SummaryRequest::Create(r) => &r.attachments,
            SummaryRequest::Update(r) => &r.attachments,
        }
    }

    /// Prior-summary context, present only on updates.
    pub fn prior_summary_context(&self) -> Option<&str> {
        match self {
            SummaryRequest::Create(_) => None,
            SummaryRequest::Update(r) => Some(&r.previous_summary),
        }
    }

    pub fn response_schema(&self) -> Value {
        self.variant().response_schema()
    }

    /// User prompt for this request.
    pub fn prompt(&self) -> String {
        match self {
            SummaryRequest::Create(r) => make_create_prompt(&r.text),
            SummaryRequest::Update(r) => make_update_prompt(&r.text, &r.previous_summary),
        }
    }

    /// Render a generateContent request body.
    pub fn to_generate_content_body(&self) -> Value {
        let mut parts = vec![json!({ "text": self.prompt() })];
        for attachment in self.attachments() {
            parts.push(json!({
                "inline_data": {
                    "mime_type": attachment.mime_type,
                    "data": attachment.data,
                }
            }));
        }

        json!({
            "system_instruction": {
                "parts": [{ "text": SYSTEM_PROMPT }]
            },
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": self.response_schema(),
            }
        })
    }
}
