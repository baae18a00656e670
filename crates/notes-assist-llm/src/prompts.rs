//! Prompts for clinical summarization.
//!
//! The response shape is enforced by the schema attached to each request, so the
//! prompts only describe content.

/// System instruction for the summarization model.
pub const SYSTEM_PROMPT: &str = r#"You are a clinical documentation assistant working in UK general practice.

Summarise the clinician's notes and any attached documents into short, factual items:
- Acute Issues: current presenting problems and active concerns
- Pending Tasks and action Plan: investigations, referrals, follow-up and advice
- Past medical history: relevant background conditions, operations and medications

Rules:
- One finding or action per item, written as a short phrase
- Do not invent findings that are not supported by the input
- Use standard UK clinical abbreviations only when unambiguous"#;

/// Prompt for a first summary of a patient.
pub fn make_create_prompt(text: &str) -> String {
    format!(
        r#"Create a structured clinical summary from these notes:

"{}"

Return a JSON object with the arrays "Acute Issues", "Pending Tasks and action Plan" and "Past medical history"."#,
        text
    )
}

/// Prompt for an updated summary, diffed against the previous one.
pub fn make_update_prompt(text: &str, previous_summary: &str) -> String {
    format!(
        r#"This is the patient's previous summary:

{}

New information:

"{}"

Produce an updated summary that merges the new information into the previous state.
Resolved problems move out of "Acute Issues"; background information stays in "Past medical history".
List every difference from the previous summary in "Key Changes", one item per change.

Return a JSON object with the arrays "Acute Issues", "Pending Tasks and action Plan", "Past medical history" and "Key Changes"."#,
        previous_summary, text
    )
}
