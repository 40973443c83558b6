//! caseminer - structured patient-record extraction from biomedical text
//!
//! An LLM-driven pipeline that turns unstructured case reports into
//! per-patient clinical records with ontology normalization and source-span
//! grounding for human review.
//!
//! # Architecture
//!
//! - Documents are segmented into patient-scoped text spans.
//! - Five specialized agents (demographics, genetics, phenotypes,
//!   treatments, outcomes) extract fields concurrently per segment, going
//!   through a provider pool that handles retry, fallback, rate limits, and
//!   health tracking.
//! - Phenotype and gene mentions are normalized against closed ontology
//!   vocabularies (HPO, HGNC) with exact-then-fuzzy matching.
//! - Every value is grounded to a literal source span where possible.
//! - One immutable `PatientRecord` per segment is merged, confidence-scored,
//!   and handed to a fire-and-forget sink.
//!
//! # Modules
//!
//! - `providers`: LLM backend abstraction and the fallback pool
//! - `segmenter`: document → patient segments
//! - `ontology`: vocabularies and fuzzy normalization
//! - `agents`: the extraction roles and their prompts
//! - `grounding`: source-span resolution
//! - `merge`: conflict resolution and confidence aggregation
//! - `pipeline`: the orchestrator tying it all together
//! - `domain`: shared data model
//!
//! # Usage
//!
//! ```bash
//! # Extract records from a text file
//! caseminer extract report.txt --config caseminer.yaml
//!
//! # Show provider health and quota
//! caseminer providers --config caseminer.yaml
//! ```

pub mod agents;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod grounding;
pub mod merge;
pub mod ontology;
pub mod pipeline;
pub mod providers;
pub mod segmenter;

// Re-export main types at crate root for convenience
pub use config::Config;
pub use domain::{AgentKind, Document, FieldExtraction, PatientRecord, PatientSegment};
pub use error::{PipelineError, ProviderError};
pub use grounding::ExtractionSpan;
pub use ontology::{MatchMethod, NormalizedTerm, Normalizer, Ontology, OntologyTerm};
pub use pipeline::{ExtractionPipeline, OrchestratorConfig, PipelineStatus};
pub use providers::{GenerateOptions, Provider, ProviderPool, ProviderStatus};
pub use segmenter::Segmenter;
