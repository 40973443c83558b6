//! Grounding: locating the literal source span for each extracted value.
//!
//! Spans are byte offsets into the segment text, found by case-insensitive
//! literal search. Higher-confidence fields claim their spans first;
//! overlapping lower-confidence spans are dropped. A field whose value
//! cannot be found keeps its extraction but gets no span: traceability
//! degrades gracefully, data is never discarded.
//!
//! Case folding is ASCII-only so offsets always index the original bytes
//! exactly; a non-ASCII case variant simply fails to ground.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::FieldExtraction;

/// Characters of context captured around a span for review UIs.
const ANCHOR_WINDOW: usize = 80;

/// A located region of segment text proving a `FieldExtraction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSpan {
    /// Start byte offset into the segment text (inclusive)
    pub start: usize,

    /// End byte offset (exclusive)
    pub end: usize,

    /// The matched text, exactly as it appears in the segment
    pub text: String,

    /// Field this span proves
    pub field_name: String,

    /// Role that extracted the field, e.g. `demographics`
    pub extraction_type: String,

    /// SHA256 of the span bytes, to detect drifted source text
    pub slice_sha256: String,

    /// Context around the span
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_text: Option<String>,
}

/// Resolve spans for a set of field extractions against segment text.
///
/// Fields are processed in descending confidence order (ties keep the input
/// declaration order); each takes its first occurrence that does not overlap
/// an already-claimed span. Returns one span per grounded field.
pub fn resolve_spans(segment_text: &str, fields: &[FieldExtraction]) -> Vec<ExtractionSpan> {
    let mut order: Vec<usize> = (0..fields.len()).collect();
    order.sort_by(|&a, &b| {
        fields[b]
            .confidence
            .partial_cmp(&fields[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut spans = Vec::new();

    for idx in order {
        let field = &fields[idx];
        let needle = field.raw_value.trim();
        if needle.is_empty() {
            continue;
        }
        let Some((start, end)) = first_unclaimed_match(segment_text, needle, &claimed) else {
            continue;
        };
        claimed.push((start, end));
        spans.push(ExtractionSpan {
            start,
            end,
            text: segment_text[start..end].to_string(),
            field_name: field.field_name.clone(),
            extraction_type: field.agent.as_str().to_string(),
            slice_sha256: slice_hash(&segment_text.as_bytes()[start..end]),
            anchor_text: Some(anchor_text(segment_text, start, end, ANCHOR_WINDOW)),
        });
    }

    spans
}

/// Attach resolved spans back onto their field extractions.
pub fn attach_spans(fields: &mut [FieldExtraction], spans: &[ExtractionSpan]) {
    for field in fields.iter_mut() {
        field.source_span = spans
            .iter()
            .find(|s| s.field_name == field.field_name)
            .cloned();
    }
}

/// First case-insensitive occurrence of `needle` in `haystack` that does not
/// overlap any claimed interval.
fn first_unclaimed_match(
    haystack: &str,
    needle: &str,
    claimed: &[(usize, usize)],
) -> Option<(usize, usize)> {
    for (start, end) in find_matches_ascii_ci(haystack, needle) {
        let overlaps = claimed.iter().any(|&(cs, ce)| start < ce && cs < end);
        if !overlaps {
            return Some((start, end));
        }
    }
    None
}

/// All case-insensitive (ASCII) occurrences, as byte offset pairs.
///
/// Sliding-window byte comparison; offsets index the original haystack.
fn find_matches_ascii_ci(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || pat.len() > hay.len() {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for i in 0..=(hay.len() - pat.len()) {
        if hay[i..i + pat.len()].eq_ignore_ascii_case(pat) {
            matches.push((i, i + pat.len()));
        }
    }
    matches
}

fn slice_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Extract ~`window` characters of context around a span, respecting UTF-8
/// boundaries, with ellipses where truncated.
fn anchor_text(text: &str, start: usize, end: usize, window: usize) -> String {
    let span_len = end - start;
    let each_side = window.saturating_sub(span_len) / 2;

    let mut anchor_start = start.saturating_sub(each_side);
    while anchor_start > 0 && !text.is_char_boundary(anchor_start) {
        anchor_start -= 1;
    }

    let mut anchor_end = (end + each_side).min(text.len());
    while anchor_end < text.len() && !text.is_char_boundary(anchor_end) {
        anchor_end += 1;
    }

    let prefix = if anchor_start > 0 { "..." } else { "" };
    let suffix = if anchor_end < text.len() { "..." } else { "" };
    format!("{}{}{}", prefix, &text[anchor_start..anchor_end], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentKind;

    fn field(name: &str, value: &str, confidence: f64) -> FieldExtraction {
        FieldExtraction::new(name, value, confidence, AgentKind::Phenotypes)
    }

    #[test]
    fn span_text_is_literal_substring_at_offsets() {
        let text = "The patient developed Seizures at age two.";
        let spans = resolve_spans(text, &[field("phenotype_1", "seizures", 0.9)]);
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.text, "Seizures");
        assert_eq!(&text[span.start..span.end], span.text);
    }

    #[test]
    fn unfindable_value_yields_no_span_but_is_kept() {
        let text = "The patient was well.";
        let mut fields = vec![field("phenotype_1", "cardiomegaly", 0.9)];
        let spans = resolve_spans(text, &fields);
        assert!(spans.is_empty());
        attach_spans(&mut fields, &spans);
        assert_eq!(fields.len(), 1);
        assert!(fields[0].source_span.is_none());
    }

    #[test]
    fn higher_confidence_field_claims_overlapping_span() {
        // Both values match the same region; only the stronger one grounds.
        let text = "Recurrent febrile seizures were noted.";
        let fields = vec![
            field("phenotype_1", "febrile seizures", 0.6),
            field("phenotype_2", "seizures", 0.9),
        ];
        let spans = resolve_spans(text, &fields);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].field_name, "phenotype_2");
        assert_eq!(spans[0].text, "seizures");
    }

    #[test]
    fn equal_values_claim_distinct_occurrences() {
        let text = "seizures at onset, and seizures again at follow-up";
        let fields = vec![
            field("phenotype_1", "seizures", 0.8),
            field("phenotype_2", "seizures", 0.8),
        ];
        let spans = resolve_spans(text, &fields);
        assert_eq!(spans.len(), 2);
        assert_ne!(spans[0].start, spans[1].start);
    }

    #[test]
    fn tie_breaks_by_declaration_order() {
        let text = "hypotonia was present";
        let fields = vec![
            field("phenotype_1", "hypotonia", 0.7),
            field("phenotype_2", "hypotonia", 0.7),
        ];
        let spans = resolve_spans(text, &fields);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].field_name, "phenotype_1");
    }

    #[test]
    fn attach_links_spans_to_fields() {
        let text = "a 6-year-old male with seizures";
        let mut fields = vec![
            field("sex", "male", 0.95),
            field("phenotype_1", "seizures", 0.9),
        ];
        let spans = resolve_spans(text, &fields);
        attach_spans(&mut fields, &spans);
        assert!(fields.iter().all(|f| f.source_span.is_some()));
    }

    #[test]
    fn slice_hash_is_stable() {
        let text = "seizures here";
        let spans = resolve_spans(text, &[field("phenotype_1", "seizures", 0.9)]);
        let again = resolve_spans(text, &[field("phenotype_1", "seizures", 0.9)]);
        assert_eq!(spans[0].slice_sha256, again[0].slice_sha256);
        assert!(spans[0].slice_sha256.starts_with("sha256:"));
    }

    #[test]
    fn anchor_text_marks_truncation() {
        let long = "x".repeat(200);
        let text = format!("{long} seizures {long}");
        let spans = resolve_spans(&text, &[field("phenotype_1", "seizures", 0.9)]);
        let anchor = spans[0].anchor_text.as_deref().unwrap();
        assert!(anchor.starts_with("..."));
        assert!(anchor.ends_with("..."));
        assert!(anchor.contains("seizures"));
    }
}
