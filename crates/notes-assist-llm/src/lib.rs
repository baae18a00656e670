//! Summarization service contract for clinical notes.
//!
//! This crate describes what is sent to the generative model (prompts, attachments
//! and the CREATE/UPDATE response schemas) and how its output is validated. The
//! network call itself belongs to the host, or to any [`Summarizer`] implementation.

pub mod extraction;
pub mod prompts;
pub mod request;
pub mod service;

pub use extraction::*;
pub use prompts::*;
pub use request::*;
pub use service::*;
