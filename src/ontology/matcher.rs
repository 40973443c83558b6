//! Fuzzy normalization of free-text mentions against a vocabulary.
//!
//! Matching runs in two stages: a case-insensitive exact lookup, then a
//! fuzzy pass scoring every term by character edit distance and token
//! overlap. Ties break on edit distance to the canonical label, then lowest
//! ontology id, so results are reproducible run to run.

use serde::{Deserialize, Serialize};

use super::{MatchMethod, NormalizedTerm, Ontology, OntologyTerm};

/// Fuzzy-matching knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Minimum fuzzy score to accept a candidate (default: 0.6)
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

fn default_fuzzy_threshold() -> f64 {
    0.6
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

/// Maps free-text mentions to canonical ontology terms.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize one mention against a vocabulary.
    pub fn normalize(&self, text: &str, ontology: &Ontology) -> NormalizedTerm {
        let folded = fold(text);
        if folded.is_empty() || ontology.is_empty() {
            return NormalizedTerm::unmatched(text);
        }

        if let Some(term) = ontology.lookup_exact(text) {
            return NormalizedTerm {
                original_text: text.to_string(),
                ontology_id: Some(term.id.clone()),
                ontology_label: Some(term.canonical_label.clone()),
                match_confidence: 1.0,
                match_method: MatchMethod::Exact,
            };
        }

        let mut best: Option<(f64, usize, &OntologyTerm)> = None;
        for term in ontology.terms() {
            let score = score_term(&folded, term);
            if score < self.config.fuzzy_threshold {
                continue;
            }
            let canonical_distance = edit_distance(&folded, &fold(&term.canonical_label));
            let better = match &best {
                None => true,
                Some((best_score, best_distance, best_term)) => {
                    score > *best_score
                        || (score == *best_score
                            && (canonical_distance < *best_distance
                                || (canonical_distance == *best_distance
                                    && term.id < best_term.id)))
                }
            };
            if better {
                best = Some((score, canonical_distance, term));
            }
        }

        match best {
            Some((score, _, term)) => NormalizedTerm {
                original_text: text.to_string(),
                ontology_id: Some(term.id.clone()),
                ontology_label: Some(term.canonical_label.clone()),
                match_confidence: score,
                match_method: MatchMethod::Fuzzy,
            },
            None => NormalizedTerm::unmatched(text),
        }
    }

    /// Normalize a batch of mentions, one result per input in input order.
    pub fn normalize_batch(&self, texts: &[String], ontology: &Ontology) -> Vec<NormalizedTerm> {
        texts
            .iter()
            .map(|t| self.normalize(t, ontology))
            .collect()
    }
}

/// Best fuzzy score of a folded mention against any surface of a term.
fn score_term(folded_mention: &str, term: &OntologyTerm) -> f64 {
    let mut best = similarity(folded_mention, &fold(&term.canonical_label));
    for synonym in &term.synonyms {
        let s = similarity(folded_mention, &fold(synonym));
        if s > best {
            best = s;
        }
    }
    best
}

/// Similarity in [0, 1]: the better of character-level edit similarity and
/// token-set overlap. Edit similarity catches inflection ("seizures" vs
/// "Seizure"); token overlap catches reordered multi-word terms.
fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    let char_sim = 1.0 - edit_distance(a, b) as f64 / max_len as f64;
    char_sim.max(token_overlap(a, b))
}

/// Dice coefficient over whitespace tokens.
fn token_overlap(a: &str, b: &str) -> f64 {
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let common = tokens_a.iter().filter(|t| tokens_b.contains(t)).count();
    2.0 * common as f64 / (tokens_a.len() + tokens_b.len()) as f64
}

/// Levenshtein distance over chars, single-row DP.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

/// Fold a surface form for matching: lowercase, strip punctuation,
/// collapse whitespace.
pub(crate) fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() || c == '-' {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}
