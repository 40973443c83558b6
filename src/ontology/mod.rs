//! Closed ontology vocabularies (HPO phenotypes, HGNC gene symbols).
//!
//! A vocabulary is loaded once at startup from the ontology store
//! collaborator and shared read-only across tasks; lookup failure degrades
//! normalization to `match_method = none` rather than aborting the pipeline.

pub mod matcher;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;

pub use matcher::{Normalizer, NormalizerConfig};

/// One vocabulary entry: canonical label plus accepted synonyms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyTerm {
    /// Ontology identifier, e.g. `HP:0001250` or an HGNC symbol id
    pub id: String,

    /// Preferred label, e.g. `Seizure`
    pub canonical_label: String,

    /// Alternate surface forms
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// How a mention was matched against the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    None,
}

/// Result of normalizing one free-text mention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTerm {
    /// The mention as extracted
    pub original_text: String,

    /// Matched ontology id, absent when no match cleared the threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ontology_id: Option<String>,

    /// Canonical label of the matched term
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ontology_label: Option<String>,

    /// Match confidence in [0, 1]; 1.0 for exact, 0.0 for none
    pub match_confidence: f64,

    /// How the match was found
    pub match_method: MatchMethod,
}

impl NormalizedTerm {
    /// The "no match" result for a mention.
    pub fn unmatched(original_text: impl Into<String>) -> Self {
        Self {
            original_text: original_text.into(),
            ontology_id: None,
            ontology_label: None,
            match_confidence: 0.0,
            match_method: MatchMethod::None,
        }
    }
}

/// A closed, pre-loaded vocabulary with a case-insensitive exact index.
pub struct Ontology {
    name: String,
    terms: Vec<OntologyTerm>,
    /// Folded label/synonym -> index into `terms`
    exact: HashMap<String, usize>,
}

impl Ontology {
    /// Build a vocabulary from terms, indexing canonical labels and synonyms.
    ///
    /// When two terms share a folded surface form, the term with the lowest
    /// id keeps it, which keeps exact lookups deterministic.
    pub fn new(name: impl Into<String>, terms: Vec<OntologyTerm>) -> Self {
        let mut exact: HashMap<String, usize> = HashMap::new();
        for (idx, term) in terms.iter().enumerate() {
            let mut surfaces = vec![term.canonical_label.as_str()];
            surfaces.extend(term.synonyms.iter().map(|s| s.as_str()));
            for surface in surfaces {
                let key = matcher::fold(surface);
                if key.is_empty() {
                    continue;
                }
                match exact.get(&key) {
                    Some(&existing) if terms[existing].id <= term.id => {}
                    _ => {
                        exact.insert(key, idx);
                    }
                }
            }
        }
        Self {
            name: name.into(),
            terms,
            exact,
        }
    }

    /// An empty vocabulary; every lookup degrades to `MatchMethod::None`.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Load a vocabulary from a JSON array of terms.
    pub fn from_json_file(name: &str, path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::OntologyLoad {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let terms: Vec<OntologyTerm> =
            serde_json::from_str(&content).map_err(|e| PipelineError::OntologyLoad {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        info!(ontology = name, terms = terms.len(), "loaded vocabulary");
        Ok(Self::new(name, terms))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub(crate) fn terms(&self) -> &[OntologyTerm] {
        &self.terms
    }

    /// Case-insensitive exact lookup against canonical labels and synonyms.
    pub fn lookup_exact(&self, text: &str) -> Option<&OntologyTerm> {
        self.exact.get(&matcher::fold(text)).map(|&i| &self.terms[i])
    }
}
