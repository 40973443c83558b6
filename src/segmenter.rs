//! Document segmentation into patient-scoped text spans.
//!
//! Case reports enumerate patients with headings or clause markers like
//! "Patient 1", "Case 2", "Proband II". The segmenter slices the raw text at
//! those markers into contiguous, non-overlapping spans; a document without
//! detectable markers is a single implicit patient and yields one segment
//! covering the whole text.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Document, PatientSegment};

/// Marker words followed by an arabic or roman numeral, case-insensitive.
const MARKER_PATTERN: &str = r"(?i)\b(?:patient|case|proband|subject|individual)\s+(?:\d{1,3}|[IVXivx]{1,5})\b";

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MARKER_PATTERN).expect("marker pattern is valid"))
}

/// Segmenter tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Segments shorter than this (in bytes) are merged into the preceding
    /// segment instead of being dropped (default: 25)
    #[serde(default = "default_min_segment_chars")]
    pub min_segment_chars: usize,
}

fn default_min_segment_chars() -> usize {
    // Short enough that a one-clause patient ("Patient 2 was a 5-year-old
    // female.") stands alone; fragments below this are heading noise.
    25
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_segment_chars: default_min_segment_chars(),
        }
    }
}

/// Splits documents into ordered patient segments.
///
/// Deterministic on identical input: re-invoking `segment` on the same
/// document text produces the same boundaries.
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Split a document into patient segments, ordered by `char_start`.
    ///
    /// Returns an empty vector only for documents with no readable text;
    /// the pipeline rejects those before segmentation.
    pub fn segment(&self, document: &Document) -> Vec<PatientSegment> {
        let text = &document.raw_text;
        if text.trim().is_empty() {
            return Vec::new();
        }

        let boundaries = self.find_boundaries(text);
        debug!(
            document_id = %document.id,
            markers = boundaries.len(),
            "segmenting document"
        );

        // No markers: single implicit patient.
        if boundaries.len() < 2 {
            return vec![PatientSegment::from_slice(
                document.id,
                text,
                0,
                text.len(),
            )];
        }

        // Slice between consecutive boundaries. Any preamble before the
        // first marker is folded into the first segment so every byte of the
        // document stays covered.
        let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(boundaries.len());
        for (i, &start) in boundaries.iter().enumerate() {
            let start = if i == 0 { 0 } else { start };
            let end = boundaries.get(i + 1).copied().unwrap_or(text.len());
            ranges.push((start, end));
        }

        // Discard whitespace-only slices, merge undersized slices backwards.
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            if text[start..end].trim().is_empty() {
                continue;
            }
            let too_short = end - start < self.config.min_segment_chars;
            match merged.last_mut() {
                Some(prev) if too_short => prev.1 = end,
                _ => merged.push((start, end)),
            }
        }

        // A short first slice has no predecessor; merge it forwards.
        if merged.len() >= 2 && merged[0].1 - merged[0].0 < self.config.min_segment_chars {
            let first = merged.remove(0);
            merged[0].0 = first.0;
        }

        merged
            .into_iter()
            .map(|(start, end)| PatientSegment::from_slice(document.id, text, start, end))
            .collect()
    }

    /// Byte offsets where a new patient plausibly starts.
    ///
    /// A marker only counts as a boundary at the start of the text, after a
    /// line break, or after sentence-ending punctuation; mid-sentence
    /// references ("as in patient 1 above") are ignored.
    fn find_boundaries(&self, text: &str) -> Vec<usize> {
        let mut boundaries = Vec::new();
        for m in marker_regex().find_iter(text) {
            let start = m.start();
            if start == 0 || is_boundary_prefix(&text[..start]) {
                boundaries.push(start);
            }
        }
        boundaries.dedup();
        boundaries
    }
}

/// Whether the text leading up to a marker ends a sentence or a line.
fn is_boundary_prefix(prefix: &str) -> bool {
    let trimmed = prefix.trim_end_matches([' ', '\t']);
    matches!(
        trimmed.chars().last(),
        None | Some('\n') | Some('.') | Some(';') | Some(':') | Some('!') | Some('?')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_text(text: &str) -> Vec<PatientSegment> {
        Segmenter::default().segment(&Document::new(text))
    }

    #[test]
    fn two_patient_clauses_yield_two_segments() {
        let text = "Patient 1 was a 3-year-old male with recurrent seizures and delay. \
                    Patient 2 was a 5-year-old female with hypotonia and regression.";
        let segments = segment_text(text);
        assert_eq!(segments.len(), 2);
        assert!(segments[0].text.starts_with("Patient 1"));
        assert!(segments[1].text.starts_with("Patient 2"));
    }

    #[test]
    fn segments_are_sorted_and_non_overlapping() {
        let text = "Case 1: a boy presented with ataxia and nystagmus at age two.\n\
                    Case 2: his sister presented with ataxia at age four.\n\
                    Case 3: an unrelated girl presented with seizures at age one.\n";
        let segments = segment_text(text);
        assert_eq!(segments.len(), 3);
        for pair in segments.windows(2) {
            assert!(pair[0].char_start < pair[1].char_start);
            assert!(pair[0].char_end <= pair[1].char_start);
        }
    }

    #[test]
    fn unmarked_document_is_single_segment() {
        let text = "A 6-year-old male presented with global developmental delay.";
        let segments = segment_text(text);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].char_start, 0);
        assert_eq!(segments[0].char_end, text.len());
    }

    #[test]
    fn whitespace_only_document_yields_nothing() {
        assert!(segment_text("  \n\t ").is_empty());
    }

    #[test]
    fn preamble_is_folded_into_first_segment() {
        let text = "We report two siblings with a novel variant.\n\
                    Patient 1 was a 3-year-old male with infantile spasms and delay.\n\
                    Patient 2 was a 5-year-old female with later-onset focal seizures.";
        let segments = segment_text(text);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].char_start, 0);
        assert!(segments[0].text.contains("two siblings"));
        assert!(segments[1].text.starts_with("Patient 2"));
    }

    #[test]
    fn short_trailing_segment_merges_backwards() {
        let text = "Patient 1 was a 3-year-old male with recurrent afebrile seizures.\n\
                    Patient 2 died.";
        let segments = segment_text(text);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].text.contains("Patient 2 died"));
        assert_eq!(segments[0].char_end, text.len());
    }

    #[test]
    fn mid_sentence_reference_is_not_a_boundary() {
        let text = "Patient 1 was a 3-year-old male whose course resembled that \
                    of patient 2 in the prior report, with seizures from infancy.";
        let segments = segment_text(text);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn segmentation_is_deterministic() {
        let text = "Patient 1 was a 3-year-old male with spasms and severe delay. \
                    Patient 2 was a 5-year-old female with absence-type seizures.";
        let doc = Document::new(text);
        let segmenter = Segmenter::default();
        let a = segmenter.segment(&doc);
        let b = segmenter.segment(&doc);
        let offsets = |v: &[PatientSegment]| -> Vec<(usize, usize)> {
            v.iter().map(|s| (s.char_start, s.char_end)).collect()
        };
        assert_eq!(offsets(&a), offsets(&b));
    }

    #[test]
    fn segment_text_matches_document_slice() {
        let text = "Case 1: a boy with ataxia from the age of two years onward.\n\
                    Case 2: a girl with ataxia and epilepsy from the first year.";
        let doc = Document::new(text);
        for seg in Segmenter::default().segment(&doc) {
            assert_eq!(seg.text, &text[seg.char_start..seg.char_end]);
        }
    }
}
