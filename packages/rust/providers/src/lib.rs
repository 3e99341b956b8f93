//! Capability providers for the askdocs pipeline.
//!
//! This crate provides the narrow interfaces the pipeline core calls, plus
//! default implementations:
//! - [`extract`] — per-media-type text extraction ([`ExtractorRegistry`])
//! - [`split`] — text segmentation ([`ParagraphSplitter`])
//! - [`embed`] — embedding backends ([`HashEmbedder`], [`HttpEmbedder`])
//! - [`retrieve`] — similarity retrieval ([`CosineRetriever`])
//! - [`answer`] — answer generation ([`OpenRouterAnswerer`])
//!
//! No orchestration logic lives here; providers are invoked by the core and
//! report failures through `AskDocsError`.

pub mod answer;
pub mod embed;
pub mod extract;
pub mod retrieve;
pub mod split;

pub use answer::{Answerer, OpenRouterAnswerer};
pub use embed::{EmbeddingBackend, HashEmbedder, HttpEmbedder};
pub use extract::{
    ExtractorRegistry, HtmlExtractor, MarkdownExtractor, PlainTextExtractor, TextExtractor,
};
pub use retrieve::{CosineRetriever, Retriever, cosine_similarity};
pub use split::{ParagraphSplitter, TextSplitter};
