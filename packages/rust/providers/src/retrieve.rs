//! Similarity retrieval over a completed knowledge batch.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use askdocs_shared::{AskDocsError, KnowledgeBatch, Result, TextSegment};

use crate::embed::EmbeddingBackend;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Selects the segments most relevant to a question.
///
/// An empty result is legal and means nothing in the batch is relevant
/// enough; the pipeline turns that into its own failure.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, batch: &KnowledgeBatch, question: &str) -> Result<Vec<TextSegment>>;
}

// ---------------------------------------------------------------------------
// Cosine similarity
// ---------------------------------------------------------------------------

/// Cosine similarity between two vectors. Zero for mismatched dimensions or
/// zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ---------------------------------------------------------------------------
// CosineRetriever
// ---------------------------------------------------------------------------

/// Ranks batch entries by cosine similarity against the embedded question.
pub struct CosineRetriever {
    backend: Arc<dyn EmbeddingBackend>,
    top_k: usize,
    min_score: f32,
}

impl CosineRetriever {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, top_k: usize, min_score: f32) -> Self {
        Self {
            backend,
            top_k: top_k.max(1),
            min_score,
        }
    }
}

#[async_trait]
impl Retriever for CosineRetriever {
    async fn retrieve(&self, batch: &KnowledgeBatch, question: &str) -> Result<Vec<TextSegment>> {
        let question_vectors = self.backend.embed(&[question.to_string()]).await?;
        let question_vector = question_vectors
            .first()
            .ok_or_else(|| AskDocsError::Embedding("backend returned no question vector".into()))?;

        let mut scored: Vec<(f32, &TextSegment)> = batch
            .entries()
            .iter()
            .map(|entry| {
                (
                    cosine_similarity(question_vector, &entry.vector),
                    &entry.segment,
                )
            })
            .filter(|(score, _)| *score >= self.min_score)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.top_k);

        debug!(
            candidates = batch.len(),
            selected = scored.len(),
            "retrieval complete"
        );

        Ok(scored.into_iter().map(|(_, s)| s.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use askdocs_shared::SegmentEmbedding;

    async fn batch_from(texts: &[&str], backend: &HashEmbedder) -> KnowledgeBatch {
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let vectors = backend.embed(&owned).await.unwrap();
        let entries = owned
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, vector))| SegmentEmbedding {
                segment: TextSegment::new(index, text),
                vector,
            })
            .collect();
        KnowledgeBatch::assemble(texts.len(), entries).expect("complete batch")
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn retriever_ranks_matching_segment_first() {
        let backend = Arc::new(HashEmbedder::new(64));
        let batch = batch_from(
            &[
                "the mitochondria is the powerhouse of the cell",
                "stock markets closed higher on tuesday",
                "the cell membrane controls what enters the cell",
            ],
            &backend,
        )
        .await;

        let retriever = CosineRetriever::new(backend, 2, 0.0);
        let results = retriever
            .retrieve(&batch, "what is the powerhouse of the cell")
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].index, 0);
        assert!(results.len() <= 2);
    }

    #[tokio::test]
    async fn retriever_min_score_can_empty_the_result() {
        // Backend embedding every text onto the first axis, while the batch
        // vectors live on the second: similarity is exactly zero.
        struct FirstAxisBackend;

        #[async_trait]
        impl EmbeddingBackend for FirstAxisBackend {
            fn dimension(&self) -> usize {
                2
            }
            async fn embed(&self, texts: &[String]) -> askdocs_shared::Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            }
        }

        let entries = vec![
            SegmentEmbedding {
                segment: TextSegment::new(0, "first"),
                vector: vec![0.0, 1.0],
            },
            SegmentEmbedding {
                segment: TextSegment::new(1, "second"),
                vector: vec![0.0, 1.0],
            },
        ];
        let batch = KnowledgeBatch::assemble(2, entries).expect("complete batch");

        let retriever = CosineRetriever::new(Arc::new(FirstAxisBackend), 4, 0.1);
        let results = retriever
            .retrieve(&batch, "any question")
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
