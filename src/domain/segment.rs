//! Patient-scoped text segments produced by the segmenter.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous region of a document believed to describe one patient.
///
/// `char_start`/`char_end` are UTF-8 byte offsets into the owning
/// document's `raw_text`; `text` is exactly `raw_text[char_start..char_end]`.
/// Segments of one document never overlap and are ordered by `char_start`.
/// Never mutated after the segmenter creates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSegment {
    /// Unique identifier for this segment
    pub id: Uuid,

    /// Owning document
    pub document_id: Uuid,

    /// Start offset into `Document.raw_text` (inclusive)
    pub char_start: usize,

    /// End offset into `Document.raw_text` (exclusive)
    pub char_end: usize,

    /// The segment text itself
    pub text: String,
}

impl PatientSegment {
    /// Slice a segment out of a document's raw text.
    ///
    /// Callers must pass offsets on UTF-8 boundaries; the segmenter only
    /// produces boundaries it found in the text itself.
    pub fn from_slice(document_id: Uuid, raw_text: &str, start: usize, end: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            char_start: start,
            char_end: end,
            text: raw_text[start..end].to_string(),
        }
    }

    /// Segment length in bytes.
    pub fn len(&self) -> usize {
        self.char_end - self.char_start
    }

    /// Whether the segment holds no text.
    pub fn is_empty(&self) -> bool {
        self.char_start == self.char_end
    }
}
