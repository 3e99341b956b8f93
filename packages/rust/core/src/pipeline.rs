//! End-to-end question-answering pipeline:
//! validate → extract → split → embed (offloaded) → retrieve → answer.
//!
//! A six-state linear state machine with no backtracking: the first failing
//! state determines the outcome and every later state is skipped, so at most
//! one side-effect-producing call happens per stage per run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use askdocs_providers::{Answerer, ExtractorRegistry, Retriever, TextSplitter};
use askdocs_shared::Document;

use crate::bridge::{EmbedFailure, OffloadBridge};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// The failure kind of the stage that ended a run early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    /// More documents supplied than the configured maximum.
    TooManyInputs { limit: usize },
    /// No documents, or an empty question.
    MissingInput,
    /// A document yielded no text; the run fails rather than answering from
    /// partial input.
    ExtractionFailed { document: String },
    /// The splitter produced no segments.
    SplitFailed,
    /// The offload bridge could not deliver a complete batch.
    EmbeddingFailed(EmbedFailure),
    /// The retriever found nothing relevant to the question.
    NoRelevantContent,
    /// The answerer failed (e.g. an invalid credential to the model).
    AnswerFailed { reason: String },
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyInputs { limit } => {
                write!(f, "Please supply a maximum of {limit} documents.")
            }
            Self::MissingInput => {
                f.write_str("Both documents and a user question are required.")
            }
            Self::ExtractionFailed { document } => write!(
                f,
                "No text could be extracted from {document}. \
                 Please ensure the file is not empty, encrypted, or corrupted."
            ),
            Self::SplitFailed => f.write_str(
                "Couldn't split the text into segments. Please try again with different text.",
            ),
            Self::EmbeddingFailed(failure) => write!(
                f,
                "Couldn't create embeddings from the text ({failure}). Please try again."
            ),
            Self::NoRelevantContent => f.write_str(
                "Couldn't find any relevant content for your question. \
                 Please try asking a different question.",
            ),
            Self::AnswerFailed { reason } => {
                write!(f, "Couldn't generate an answer: {reason}")
            }
        }
    }
}

/// Terminal value of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The answerer's text.
    Answered(String),
    /// The first stage failure, already carrying its user-facing message.
    Failed(StageFailure),
}

impl PipelineOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered(_))
    }

    /// The text shown to the user: the answer, or the failure message.
    pub fn message(&self) -> String {
        match self {
            Self::Answered(text) => text.clone(),
            Self::Failed(failure) => failure.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called once with the terminal outcome.
    fn done(&self, outcome: &PipelineOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _outcome: &PipelineOutcome) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one question against one document set through the staged pipeline.
///
/// Providers are invoked through their narrow interfaces; the only
/// asynchronous collaboration is the embedding stage, which goes through the
/// [`OffloadBridge`].
pub struct Orchestrator {
    extractors: ExtractorRegistry,
    splitter: Arc<dyn TextSplitter>,
    bridge: OffloadBridge,
    retriever: Arc<dyn Retriever>,
    answerer: Arc<dyn Answerer>,
    max_documents: usize,
}

impl Orchestrator {
    pub fn new(
        extractors: ExtractorRegistry,
        splitter: Arc<dyn TextSplitter>,
        bridge: OffloadBridge,
        retriever: Arc<dyn Retriever>,
        answerer: Arc<dyn Answerer>,
        max_documents: usize,
    ) -> Self {
        Self {
            extractors,
            splitter,
            bridge,
            retriever,
            answerer,
            max_documents: max_documents.max(1),
        }
    }

    /// Run the pipeline. `embed_timeout` bounds the offloaded embedding call.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn execute(
        &self,
        documents: &[Document],
        question: &str,
        embed_timeout: Duration,
        progress: &dyn ProgressReporter,
    ) -> PipelineOutcome {
        let start = Instant::now();
        let outcome = self
            .run_stages(documents, question, embed_timeout, progress)
            .await;
        progress.done(&outcome);

        info!(
            answered = outcome.is_answered(),
            elapsed_ms = start.elapsed().as_millis(),
            "pipeline run complete"
        );
        outcome
    }

    async fn run_stages(
        &self,
        documents: &[Document],
        question: &str,
        embed_timeout: Duration,
        progress: &dyn ProgressReporter,
    ) -> PipelineOutcome {
        use PipelineOutcome::Failed;

        // --- Stage 1: Validating ---
        progress.phase("Validating input");
        if documents.len() > self.max_documents {
            warn!(
                supplied = documents.len(),
                limit = self.max_documents,
                "too many documents"
            );
            return Failed(StageFailure::TooManyInputs {
                limit: self.max_documents,
            });
        }
        if documents.is_empty() || question.trim().is_empty() {
            warn!("documents or question missing");
            return Failed(StageFailure::MissingInput);
        }

        // --- Stage 2: Extracting ---
        progress.phase("Extracting text");
        let mut combined = String::new();
        for document in documents {
            let text = match self
                .extractors
                .resolve(document.media_type)
                .and_then(|extractor| extractor.extract(document))
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(document = %document.name, error = %e, "extraction failed");
                    return Failed(StageFailure::ExtractionFailed {
                        document: document.name.clone(),
                    });
                }
            };
            if text.trim().is_empty() {
                warn!(document = %document.name, "document yielded no text");
                return Failed(StageFailure::ExtractionFailed {
                    document: document.name.clone(),
                });
            }
            if !combined.is_empty() {
                combined.push_str("\n\n");
            }
            combined.push_str(&text);
        }

        // --- Stage 3: Splitting ---
        progress.phase("Splitting text");
        let segments = match self.splitter.split(&combined) {
            Ok(segments) => segments,
            Err(e) => {
                warn!(error = %e, "splitter failed");
                return Failed(StageFailure::SplitFailed);
            }
        };
        if segments.is_empty() {
            warn!("splitter produced no segments");
            return Failed(StageFailure::SplitFailed);
        }

        // --- Stage 4: Embedding (offloaded) ---
        progress.phase("Embedding segments");
        let batch = match self.bridge.embed(&segments, embed_timeout).await {
            Ok(batch) => batch,
            // Not retried here: a retry would recompute vectors for the same
            // segments on an external service. Re-invocation belongs to the
            // caller.
            Err(failure) => return Failed(StageFailure::EmbeddingFailed(failure)),
        };

        // --- Stage 5: Retrieving ---
        progress.phase("Retrieving relevant segments");
        let relevant = match self.retriever.retrieve(&batch, question).await {
            Ok(relevant) => relevant,
            Err(e) => {
                warn!(error = %e, "retriever failed");
                return Failed(StageFailure::NoRelevantContent);
            }
        };
        if relevant.is_empty() {
            return Failed(StageFailure::NoRelevantContent);
        }

        // --- Stage 6: Answering ---
        progress.phase("Generating answer");
        match self.answerer.answer(&relevant, question).await {
            Ok(text) => PipelineOutcome::Answered(text),
            Err(e) => Failed(StageFailure::AnswerFailed {
                reason: e.to_string(),
            }),
        }
    }
}
