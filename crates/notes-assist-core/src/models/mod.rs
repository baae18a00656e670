//! Domain models for clinical notes.

mod patient;
mod summary;

pub use patient::*;
pub use summary::*;
