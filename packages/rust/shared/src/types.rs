//! Core domain types for the askdocs question-answering pipeline.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CorrelationId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one embedding round-trip (time-sortable).
///
/// Every outbound embedding request carries exactly one correlation id, and
/// every inbound result is attributed to a pending call through it. Ids are
/// unique for the process lifetime, so a result from an abandoned call can
/// never satisfy a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Generate a new time-sortable correlation identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// MediaType
// ---------------------------------------------------------------------------

/// Declared media type of an input document, used to pick an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    PlainText,
    Markdown,
    Html,
}

impl MediaType {
    /// Guess the media type from a file extension. Unknown extensions are
    /// treated as plain text.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            _ => Self::PlainText,
        }
    }

    /// Canonical name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A caller-supplied input document: raw bytes plus a declared media type.
///
/// Owned by the caller for the duration of one pipeline run and not retained
/// after extraction.
#[derive(Debug, Clone)]
pub struct Document {
    /// Display name (usually the file name), used in failure messages.
    pub name: String,
    /// Declared media type; selects the extractor.
    pub media_type: MediaType,
    /// Raw content bytes.
    pub bytes: Vec<u8>,
}

impl Document {
    /// Build a document from a name, media type, and raw bytes.
    pub fn new(name: impl Into<String>, media_type: MediaType, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type,
            bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// TextSegment
// ---------------------------------------------------------------------------

/// A contiguous slice of extracted text with its stable sequence index.
///
/// The index is the segment's position in the split of the concatenated
/// extraction output, and survives the embedding round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    /// Position in the original split order.
    pub index: usize,
    /// Segment text.
    pub text: String,
}

impl TextSegment {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SegmentEmbedding / KnowledgeBatch
// ---------------------------------------------------------------------------

/// A text segment paired with its vector representation.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEmbedding {
    pub segment: TextSegment,
    pub vector: Vec<f32>,
}

/// The complete, ordered set of (segment, vector) pairs for one pipeline run.
///
/// A batch can only be assembled when every expected sequence index has a
/// result; partial batches are unrepresentable. Entries are sorted by the
/// segment's original index regardless of arrival order.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBatch {
    entries: Vec<SegmentEmbedding>,
}

impl KnowledgeBatch {
    /// Assemble a batch from collected results.
    ///
    /// Returns `None` unless the entries cover exactly `expected` distinct
    /// sequence indices. On success the batch is sorted by index.
    pub fn assemble(expected: usize, mut entries: Vec<SegmentEmbedding>) -> Option<Self> {
        let distinct: HashSet<usize> = entries.iter().map(|e| e.segment.index).collect();
        if distinct.len() != expected || entries.len() != expected {
            return None;
        }
        entries.sort_by_key(|e| e.segment.index);
        Some(Self { entries })
    }

    pub fn entries(&self) -> &[SegmentEmbedding] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the segments in index order.
    pub fn segments(&self) -> impl Iterator<Item = &TextSegment> {
        self.entries.iter().map(|e| &e.segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize) -> SegmentEmbedding {
        SegmentEmbedding {
            segment: TextSegment::new(index, format!("segment {index}")),
            vector: vec![index as f32],
        }
    }

    #[test]
    fn correlation_id_roundtrip() {
        let id = CorrelationId::new();
        let s = id.to_string();
        let parsed: CorrelationId = s.parse().expect("parse CorrelationId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn correlation_ids_are_distinct() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn media_type_from_path() {
        assert_eq!(
            MediaType::from_path(Path::new("notes.md")),
            MediaType::Markdown
        );
        assert_eq!(
            MediaType::from_path(Path::new("page.HTML")),
            MediaType::Html
        );
        assert_eq!(
            MediaType::from_path(Path::new("report.txt")),
            MediaType::PlainText
        );
        assert_eq!(
            MediaType::from_path(Path::new("no_extension")),
            MediaType::PlainText
        );
    }

    #[test]
    fn batch_assembles_sorted_from_unordered_entries() {
        let batch =
            KnowledgeBatch::assemble(3, vec![entry(2), entry(0), entry(1)]).expect("complete");
        let indices: Vec<usize> = batch.segments().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn batch_rejects_missing_index() {
        assert!(KnowledgeBatch::assemble(3, vec![entry(0), entry(2)]).is_none());
    }

    #[test]
    fn batch_rejects_duplicate_index() {
        assert!(KnowledgeBatch::assemble(2, vec![entry(1), entry(1)]).is_none());
    }
}
