//! Course document handling
//!
//! - `envelope`: raw vs. enveloped document shapes
//! - `markers`: `[IMAGE:...]` placeholder edits in study text
//! - `mutator`: download / patch / upload of whole documents

pub mod envelope;
pub mod markers;
pub mod mutator;

pub use envelope::CourseDocument;
pub use markers::{place_image, MarkerEdit};
pub use mutator::{document_path, AttachOutcome, DocumentMutator};
