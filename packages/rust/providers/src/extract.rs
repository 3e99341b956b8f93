//! Text extractor trait and built-in extractors.
//!
//! Extractors turn one [`Document`] into plain text. The registry resolves
//! the extractor for a document's declared media type; unsupported types are
//! a provider failure, not a fallback.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use askdocs_shared::{AskDocsError, Document, MediaType, Result};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Trait for media-type-specific text extraction.
pub trait TextExtractor: Send + Sync {
    /// Whether this extractor handles `media_type`.
    fn supports(&self, media_type: MediaType) -> bool;

    /// Extract plain text from the document's raw bytes.
    ///
    /// An empty result is legal here; the pipeline decides what emptiness
    /// means for the run.
    fn extract(&self, document: &Document) -> Result<String>;

    /// Human-readable extractor name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered extractors, resolved by media type.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Create a registry with all built-in extractors.
    pub fn new() -> Self {
        Self {
            extractors: vec![
                Box::new(PlainTextExtractor),
                Box::new(MarkdownExtractor),
                Box::new(HtmlExtractor),
            ],
        }
    }

    /// Resolve the extractor for `media_type`.
    pub fn resolve(&self, media_type: MediaType) -> Result<&dyn TextExtractor> {
        self.extractors
            .iter()
            .find(|e| e.supports(media_type))
            .map(|e| e.as_ref())
            .ok_or_else(|| {
                AskDocsError::provider(format!("no extractor registered for {media_type}"))
            })
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode document bytes as UTF-8, failing with the document name attached.
fn decode_utf8(document: &Document) -> Result<String> {
    String::from_utf8(document.bytes.clone()).map_err(|e| {
        AskDocsError::provider(format!("{}: invalid UTF-8 content: {e}", document.name))
    })
}

// ---------------------------------------------------------------------------
// PlainTextExtractor
// ---------------------------------------------------------------------------

/// Passes UTF-8 text through unchanged.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn supports(&self, media_type: MediaType) -> bool {
        media_type == MediaType::PlainText
    }

    fn extract(&self, document: &Document) -> Result<String> {
        decode_utf8(document)
    }

    fn name(&self) -> &str {
        "plain-text"
    }
}

// ---------------------------------------------------------------------------
// MarkdownExtractor
// ---------------------------------------------------------------------------

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```[^\n]*$").unwrap());
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());
static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_`]+").unwrap());

/// Strips Markdown markup, keeping the readable text (including code block
/// contents, which often carry the answer for technical documents).
pub struct MarkdownExtractor;

impl TextExtractor for MarkdownExtractor {
    fn supports(&self, media_type: MediaType) -> bool {
        media_type == MediaType::Markdown
    }

    fn extract(&self, document: &Document) -> Result<String> {
        let raw = decode_utf8(document)?;
        let text = FENCE_RE.replace_all(&raw, "");
        let text = HEADING_RE.replace_all(&text, "");
        let text = IMAGE_RE.replace_all(&text, "");
        let text = LINK_RE.replace_all(&text, "$1");
        let text = EMPHASIS_RE.replace_all(&text, "");
        Ok(text.into_owned())
    }

    fn name(&self) -> &str {
        "markdown"
    }
}

// ---------------------------------------------------------------------------
// HtmlExtractor
// ---------------------------------------------------------------------------

/// Extracts readable text from HTML block elements, skipping page chrome.
pub struct HtmlExtractor;

impl TextExtractor for HtmlExtractor {
    fn supports(&self, media_type: MediaType) -> bool {
        media_type == MediaType::Html
    }

    fn extract(&self, document: &Document) -> Result<String> {
        let raw = decode_utf8(document)?;
        Ok(html_to_text(&raw))
    }

    fn name(&self) -> &str {
        "html"
    }
}

/// Collect text from block-level elements, one paragraph per block.
/// Falls back to the whole body when no block elements are present.
fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    let block_sel =
        Selector::parse("p, h1, h2, h3, h4, h5, h6, li, pre, blockquote, td").unwrap();
    let blocks: Vec<String> = doc
        .select(&block_sel)
        .map(|el| squish(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect();

    if !blocks.is_empty() {
        return blocks.join("\n\n");
    }

    let body_sel = Selector::parse("body").unwrap();
    doc.select(&body_sel)
        .next()
        .map(|body| squish(&body.text().collect::<String>()))
        .unwrap_or_default()
}

/// Collapse internal whitespace runs and trim.
fn squish(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
