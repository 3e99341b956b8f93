//! Wire payloads exchanged with the embedding workers.
//!
//! Outbound messages carry a sub-batch of segments under one correlation id;
//! inbound messages carry one vector each. Workers may respond out of order
//! and results for different sub-batches may interleave.

use serde::{Deserialize, Serialize};

use askdocs_shared::{AskDocsError, CorrelationId, Result};

/// One segment of an outbound sub-batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedUnit {
    /// Sequence index in the originating split.
    pub index: usize,
    /// Segment text to embed.
    pub text: String,
}

/// Outbound message: one size-bounded sub-batch of an embedding call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedRequest {
    /// Identifier shared by every sub-batch of the originating call.
    pub correlation_id: CorrelationId,
    /// Units in this sub-batch.
    pub units: Vec<EmbedUnit>,
}

/// Inbound message: one embedded unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedResult {
    /// Correlation id of the request this result answers.
    pub correlation_id: CorrelationId,
    /// Sequence index of the embedded segment.
    pub index: usize,
    /// Vector representation.
    pub vector: Vec<f32>,
}

impl EmbedRequest {
    /// Serialize for publishing.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AskDocsError::Channel(format!("encode request: {e}")))
    }

    /// Deserialize a published payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| AskDocsError::Channel(format!("decode request: {e}")))
    }
}

impl EmbedResult {
    /// Serialize for publishing.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AskDocsError::Channel(format!("encode result: {e}")))
    }

    /// Deserialize a published payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| AskDocsError::Channel(format!("decode result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let request = EmbedRequest {
            correlation_id: CorrelationId::new(),
            units: vec![
                EmbedUnit {
                    index: 0,
                    text: "first".into(),
                },
                EmbedUnit {
                    index: 1,
                    text: "second".into(),
                },
            ],
        };

        let payload = request.encode().expect("encode");
        let decoded = EmbedRequest::decode(&payload).expect("decode");
        assert_eq!(decoded, request);
    }

    #[test]
    fn result_roundtrip() {
        let result = EmbedResult {
            correlation_id: CorrelationId::new(),
            index: 7,
            vector: vec![0.25, -0.5, 1.0],
        };

        let payload = result.encode().expect("encode");
        let decoded = EmbedResult::decode(&payload).expect("decode");
        assert_eq!(decoded, result);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(EmbedRequest::decode(b"not json").is_err());
        assert!(EmbedResult::decode(b"{\"index\":1}").is_err());
    }
}
