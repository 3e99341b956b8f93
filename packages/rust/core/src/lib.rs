//! Core pipeline orchestration for askdocs.
//!
//! This crate ties the capability providers and the message channel together
//! into the staged question-answering flow:
//! - [`bridge`] — the offload bridge turning the asynchronous embedding
//!   round-trip into a synchronous, deadline-bounded call
//! - [`pipeline`] — the fail-fast stage machine producing a [`PipelineOutcome`]

pub mod bridge;
pub mod pipeline;

pub use bridge::{EmbedFailure, OffloadBridge, ResultDispatcher};
pub use pipeline::{
    Orchestrator, PipelineOutcome, ProgressReporter, SilentProgress, StageFailure,
};
