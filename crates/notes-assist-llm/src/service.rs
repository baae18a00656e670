//! The summarization capability consumed by the merge engine.

use thiserror::Error;

use crate::request::SummaryRequest;

/// Failures raised by a summarization backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SummarizerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Service returned an empty response")]
    EmptyResponse,
}

/// A summarization backend.
///
/// Returns the raw response text; schema validation happens on the caller's side.
pub trait Summarizer {
    fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError>;
}

impl<F> Summarizer for F
where
    F: Fn(&SummaryRequest) -> Result<String, SummarizerError>,
{
    fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError> {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CreateRequest;

    #[test]
    fn test_closure_summarizer() {
        let service = |request: &SummaryRequest| -> Result<String, SummarizerError> {
            Ok(format!("echo: {}", request.text()))
        };
        let request = SummaryRequest::Create(CreateRequest {
            text: "cough".into(),
            attachments: vec![],
        });
        assert_eq!(service.summarize(&request).unwrap(), "echo: cough");
    }

    #[test]
    fn test_error_display() {
        let err = SummarizerError::Quota("429".into());
        assert_eq!(err.to_string(), "Quota exceeded: 429");
    }
}
