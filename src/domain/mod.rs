//! Core data model for the extraction pipeline.
//!
//! These types are the contracts the pipeline produces and consumes:
//! documents in, patient segments through the middle, immutable
//! `PatientRecord`s out. Everything serializes with serde so records can
//! flow to the storage collaborator unchanged.

pub mod document;
pub mod record;
pub mod segment;

pub use document::{Document, DocumentMetadata};
pub use record::{AgentKind, FieldExtraction, PatientRecord, ValidationStatus};
pub use segment::PatientSegment;
