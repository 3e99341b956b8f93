//! Embedding worker pool.
//!
//! Consumes [`EmbedRequest`] sub-batches from the request topic, computes
//! vectors through an [`EmbeddingBackend`], and publishes one [`EmbedResult`]
//! per unit. The pool stands in for an external worker fleet; nothing in the
//! pipeline core assumes the workers run in this process.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use askdocs_providers::EmbeddingBackend;
use askdocs_shared::Result;

use crate::protocol::{EmbedRequest, EmbedResult};
use crate::MessageChannel;

/// Handle to the spawned worker pool. Aborts the listener on drop.
pub struct EmbedWorkerPool {
    listener: JoinHandle<()>,
}

impl EmbedWorkerPool {
    /// Subscribe to `request_topic` and start serving embed requests.
    ///
    /// At most `worker_count` sub-batches are processed concurrently; each
    /// unit's result is published on `result_topic` as it completes, so
    /// results may interleave across sub-batches and arrive out of order.
    pub async fn spawn(
        channel: Arc<dyn MessageChannel>,
        backend: Arc<dyn EmbeddingBackend>,
        request_topic: &str,
        result_topic: &str,
        worker_count: usize,
    ) -> Result<Self> {
        let mut subscription = channel.subscribe(request_topic).await?;
        let result_topic = result_topic.to_string();
        let workers = Arc::new(Semaphore::new(worker_count.max(1)));

        info!(request_topic, worker_count, "embed worker pool started");

        let listener = tokio::spawn(async move {
            loop {
                let payload = match subscription.recv().await {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "request subscription ended, stopping worker pool");
                        break;
                    }
                };

                let request = match EmbedRequest::decode(&payload) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable embed request");
                        continue;
                    }
                };

                let permit = Arc::clone(&workers)
                    .acquire_owned()
                    .await
                    .expect("worker semaphore closed");
                let channel = Arc::clone(&channel);
                let backend = Arc::clone(&backend);
                let result_topic = result_topic.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let correlation_id = request.correlation_id;
                    if let Err(e) =
                        serve_request(channel.as_ref(), backend.as_ref(), &result_topic, request)
                            .await
                    {
                        warn!(%correlation_id, error = %e, "embed request failed");
                    }
                });
            }
        });

        Ok(Self { listener })
    }

    /// Stop consuming requests. In-flight sub-batches may still publish
    /// results; stale consumers must drop them by correlation id.
    pub fn shutdown(&self) {
        self.listener.abort();
    }
}

impl Drop for EmbedWorkerPool {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Embed one sub-batch and publish a result per unit.
async fn serve_request(
    channel: &dyn MessageChannel,
    backend: &dyn EmbeddingBackend,
    result_topic: &str,
    request: EmbedRequest,
) -> Result<()> {
    let texts: Vec<String> = request.units.iter().map(|u| u.text.clone()).collect();
    let vectors = backend.embed(&texts).await?;

    if vectors.len() != request.units.len() {
        return Err(askdocs_shared::AskDocsError::Embedding(format!(
            "backend returned {} vectors for {} units",
            vectors.len(),
            request.units.len()
        )));
    }

    debug!(
        correlation_id = %request.correlation_id,
        units = request.units.len(),
        "sub-batch embedded"
    );

    for (unit, vector) in request.units.iter().zip(vectors) {
        let result = EmbedResult {
            correlation_id: request.correlation_id,
            index: unit.index,
            vector,
        };
        channel.publish(result_topic, result.encode()?).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EmbedUnit;
    use crate::InProcessChannel;
    use askdocs_providers::HashEmbedder;
    use askdocs_shared::CorrelationId;

    const REQUESTS: &str = "test.requests";
    const RESULTS: &str = "test.results";

    async fn pool_fixture() -> (Arc<InProcessChannel>, EmbedWorkerPool) {
        let channel = Arc::new(InProcessChannel::new(64));
        let backend = Arc::new(HashEmbedder::new(8));
        let pool = EmbedWorkerPool::spawn(
            Arc::clone(&channel) as Arc<dyn MessageChannel>,
            backend,
            REQUESTS,
            RESULTS,
            2,
        )
        .await
        .expect("spawn pool");
        (channel, pool)
    }

    #[tokio::test]
    async fn pool_answers_each_unit() {
        let (channel, _pool) = pool_fixture().await;
        let mut results = channel.subscribe(RESULTS).await.unwrap();

        let correlation_id = CorrelationId::new();
        let request = EmbedRequest {
            correlation_id,
            units: vec![
                EmbedUnit {
                    index: 0,
                    text: "alpha".into(),
                },
                EmbedUnit {
                    index: 1,
                    text: "beta".into(),
                },
                EmbedUnit {
                    index: 2,
                    text: "gamma".into(),
                },
            ],
        };
        channel
            .publish(REQUESTS, request.encode().unwrap())
            .await
            .unwrap();

        let mut indices = Vec::new();
        for _ in 0..3 {
            let payload = results.recv().await.expect("result");
            let result = EmbedResult::decode(&payload).expect("decode");
            assert_eq!(result.correlation_id, correlation_id);
            assert_eq!(result.vector.len(), 8);
            indices.push(result.index);
        }
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn pool_survives_undecodable_payload() {
        let (channel, _pool) = pool_fixture().await;
        let mut results = channel.subscribe(RESULTS).await.unwrap();

        channel
            .publish(REQUESTS, b"definitely not json".to_vec())
            .await
            .unwrap();

        // A well-formed request published afterwards is still served.
        let request = EmbedRequest {
            correlation_id: CorrelationId::new(),
            units: vec![EmbedUnit {
                index: 0,
                text: "still alive".into(),
            }],
        };
        channel
            .publish(REQUESTS, request.encode().unwrap())
            .await
            .unwrap();

        let payload = results.recv().await.expect("result after bad payload");
        let result = EmbedResult::decode(&payload).expect("decode");
        assert_eq!(result.index, 0);
    }

    #[tokio::test]
    async fn concurrent_requests_interleave() {
        let (channel, _pool) = pool_fixture().await;
        let mut results = channel.subscribe(RESULTS).await.unwrap();

        let first = CorrelationId::new();
        let second = CorrelationId::new();
        for (id, text) in [(first, "one"), (second, "two")] {
            let request = EmbedRequest {
                correlation_id: id,
                units: vec![EmbedUnit {
                    index: 0,
                    text: text.into(),
                }],
            };
            channel
                .publish(REQUESTS, request.encode().unwrap())
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..2 {
            let payload = results.recv().await.expect("result");
            seen.push(EmbedResult::decode(&payload).unwrap().correlation_id);
        }
        assert!(seen.contains(&first));
        assert!(seen.contains(&second));
    }
}
