//! Extracted fields and the merged patient record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grounding::ExtractionSpan;
use crate::ontology::NormalizedTerm;

/// The fixed set of extraction agent roles.
///
/// Declaration order is also merge priority: on an exact confidence tie for
/// the same field, the earlier role wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Demographics,
    Genetics,
    Phenotypes,
    Treatments,
    Outcomes,
}

impl AgentKind {
    /// All roles, in priority order.
    pub const ALL: [AgentKind; 5] = [
        AgentKind::Demographics,
        AgentKind::Genetics,
        AgentKind::Phenotypes,
        AgentKind::Treatments,
        AgentKind::Outcomes,
    ];

    /// Merge priority; lower wins ties.
    pub fn priority(self) -> u8 {
        match self {
            AgentKind::Demographics => 0,
            AgentKind::Genetics => 1,
            AgentKind::Phenotypes => 2,
            AgentKind::Treatments => 3,
            AgentKind::Outcomes => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Demographics => "demographics",
            AgentKind::Genetics => "genetics",
            AgentKind::Phenotypes => "phenotypes",
            AgentKind::Treatments => "treatments",
            AgentKind::Outcomes => "outcomes",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The smallest unit of extracted knowledge.
///
/// Owned by exactly one agent invocation and immutable afterwards. Absence
/// of evidence is represented by the field not existing at all, never by a
/// zero-confidence placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldExtraction {
    /// Field name, e.g. `age_of_onset`, `gene_symbol`, `phenotype_1`
    pub field_name: String,

    /// Verbatim value as the agent reported it
    pub raw_value: String,

    /// Ontology normalization, for phenotype/gene fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_value: Option<NormalizedTerm>,

    /// Agent's confidence in this value, in [0, 1]
    pub confidence: f64,

    /// Role that produced the field
    pub agent: AgentKind,

    /// Located source span, when grounding succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_span: Option<ExtractionSpan>,
}

impl FieldExtraction {
    /// Create a field extraction with confidence clamped into [0, 1].
    pub fn new(
        field_name: impl Into<String>,
        raw_value: impl Into<String>,
        confidence: f64,
        agent: AgentKind,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            raw_value: raw_value.into(),
            normalized_value: None,
            confidence: confidence.clamp(0.0, 1.0),
            agent,
            source_span: None,
        }
    }
}

/// Human-review state of an emitted record.
///
/// Starts at `Pending`; only the external review collaborator moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Validated,
    Rejected,
}

/// One structured patient record per segment, as emitted by the merger.
///
/// Immutable once emitted; corrections arrive as separate validation events
/// downstream, never as in-place mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Unique identifier for this record
    pub id: Uuid,

    /// Segment this record was extracted from
    pub segment_id: Uuid,

    /// Document the segment belongs to
    pub document_id: Uuid,

    /// Winning field extraction per field name
    pub fields: BTreeMap<String, FieldExtraction>,

    /// Confidence of the winning extraction per field name
    pub confidence_scores: BTreeMap<String, f64>,

    /// Arithmetic mean of `confidence_scores`, 0.0 when no fields
    pub overall_confidence: f64,

    /// Human-review state, always `Pending` at emission
    pub validation_status: ValidationStatus,

    /// Diagnostics accumulated during extraction (exhausted retries etc.)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,

    /// When the merger produced this record
    pub created_at: DateTime<Utc>,
}

impl PatientRecord {
    /// Whether any field was extracted at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Spans of all grounded fields, in field-name order.
    pub fn spans(&self) -> Vec<&ExtractionSpan> {
        self.fields
            .values()
            .filter_map(|f| f.source_span.as_ref())
            .collect()
    }
}
