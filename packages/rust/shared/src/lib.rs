//! Shared types, error model, and configuration for askdocs.
//!
//! This crate is the foundation depended on by all other askdocs crates.
//! It provides:
//! - [`AskDocsError`] — the unified error type
//! - Domain types ([`Document`], [`TextSegment`], [`KnowledgeBatch`], [`CorrelationId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChannelConfig, EmbeddingConfig, OpenRouterConfig, PipelineConfig, RetrievalConfig,
    SplitConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{AskDocsError, Result};
pub use types::{
    CorrelationId, Document, KnowledgeBatch, MediaType, SegmentEmbedding, TextSegment,
};
