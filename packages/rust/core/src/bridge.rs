//! Offload bridge: a synchronous, timeout-bounded embedding call over the
//! asynchronous message channel.
//!
//! One [`ResultDispatcher`] per process owns the single results subscription
//! and routes each inbound result to the pending call registered under its
//! correlation id. Results bearing an unknown id (late arrivals for calls
//! that completed or timed out) are dropped — expected steady-state behavior
//! under concurrent runs, not an error.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use askdocs_channel::{EmbedRequest, EmbedResult, EmbedUnit, MessageChannel};
use askdocs_shared::{CorrelationId, KnowledgeBatch, SegmentEmbedding, TextSegment};

// ---------------------------------------------------------------------------
// EmbedFailure
// ---------------------------------------------------------------------------

/// Why an embedding call failed. Terminal for the call — the bridge never
/// retries; re-invocation is the caller's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedFailure {
    /// The deadline elapsed before every expected result arrived.
    Timeout,
    /// Publishing failed or the results subscription is gone.
    ChannelUnavailable(String),
}

impl std::fmt::Display for EmbedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out waiting for embedding results"),
            Self::ChannelUnavailable(reason) => {
                write!(f, "embedding channel unavailable: {reason}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ResultDispatcher
// ---------------------------------------------------------------------------

type PendingTable = Arc<Mutex<HashMap<CorrelationId, mpsc::UnboundedSender<EmbedResult>>>>;

/// Demultiplexes the shared inbound results stream by correlation id.
///
/// Created once at startup alongside the channel; any number of concurrent
/// embedding calls register collectors against it.
pub struct ResultDispatcher {
    pending: PendingTable,
    listener: JoinHandle<()>,
}

impl ResultDispatcher {
    /// Subscribe to `result_topic` and start routing inbound results.
    pub async fn spawn(
        channel: &dyn MessageChannel,
        result_topic: &str,
    ) -> askdocs_shared::Result<Self> {
        let mut subscription = channel.subscribe(result_topic).await?;
        let pending: PendingTable = Arc::default();
        let table = Arc::clone(&pending);

        let listener = tokio::spawn(async move {
            loop {
                let payload = match subscription.recv().await {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "results subscription ended, dispatcher stopping");
                        break;
                    }
                };

                let result = match EmbedResult::decode(&payload) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable embed result");
                        continue;
                    }
                };

                let sender = {
                    let table = table.lock().expect("pending table poisoned");
                    table.get(&result.correlation_id).cloned()
                };

                match sender {
                    Some(tx) => {
                        if tx.send(result).is_err() {
                            debug!("pending call went away, dropping result");
                        }
                    }
                    None => {
                        debug!(
                            correlation_id = %result.correlation_id,
                            index = result.index,
                            "dropping result for unknown correlation id"
                        );
                    }
                }
            }
        });

        Ok(Self { pending, listener })
    }

    /// Register a collector for `id`. The registration is released when the
    /// returned guard drops, whether the call completed, timed out, or was
    /// cancelled mid-flight.
    fn register(&self, id: CorrelationId) -> (mpsc::UnboundedReceiver<EmbedResult>, PendingGuard) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending
            .lock()
            .expect("pending table poisoned")
            .insert(id, tx);
        (
            rx,
            PendingGuard {
                id,
                table: Arc::clone(&self.pending),
            },
        )
    }
}

impl Drop for ResultDispatcher {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Removes the correlation-id registration on drop.
struct PendingGuard {
    id: CorrelationId,
    table: PendingTable,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table
            .lock()
            .expect("pending table poisoned")
            .remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// OffloadBridge
// ---------------------------------------------------------------------------

/// Converts a batch of text segments into embeddings by round-tripping them
/// through the message channel, presenting a synchronous, deadline-bounded
/// call to the pipeline.
pub struct OffloadBridge {
    channel: Arc<dyn MessageChannel>,
    dispatcher: Arc<ResultDispatcher>,
    request_topic: String,
    max_batch_size: usize,
}

impl OffloadBridge {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        dispatcher: Arc<ResultDispatcher>,
        request_topic: impl Into<String>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            channel,
            dispatcher,
            request_topic: request_topic.into(),
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Embed `segments`, waiting at most `timeout` for the full result set.
    ///
    /// The whole call shares one fresh correlation id; segments are published
    /// in sub-batches of at most the configured size, and results are
    /// collected until every sequence index has a vector. Arrival order is
    /// irrelevant — the returned batch is sorted by the original index.
    #[instrument(skip_all, fields(segments = segments.len()))]
    pub async fn embed(
        &self,
        segments: &[TextSegment],
        timeout: Duration,
    ) -> Result<KnowledgeBatch, EmbedFailure> {
        let correlation_id = CorrelationId::new();
        let expected = segments.len();
        let by_index: HashMap<usize, &TextSegment> =
            segments.iter().map(|s| (s.index, s)).collect();

        // Register before publishing so no result can arrive unrouted.
        let (mut rx, _guard) = self.dispatcher.register(correlation_id);

        for chunk in segments.chunks(self.max_batch_size) {
            let request = EmbedRequest {
                correlation_id,
                units: chunk
                    .iter()
                    .map(|s| EmbedUnit {
                        index: s.index,
                        text: s.text.clone(),
                    })
                    .collect(),
            };
            let payload = request
                .encode()
                .map_err(|e| EmbedFailure::ChannelUnavailable(e.to_string()))?;
            self.channel
                .publish(&self.request_topic, payload)
                .await
                .map_err(|e| EmbedFailure::ChannelUnavailable(e.to_string()))?;
        }

        debug!(
            %correlation_id,
            expected,
            sub_batches = segments.len().div_ceil(self.max_batch_size),
            "embedding request published"
        );

        let deadline = tokio::time::Instant::now() + timeout;
        let mut seen: HashSet<usize> = HashSet::with_capacity(expected);
        let mut entries: Vec<SegmentEmbedding> = Vec::with_capacity(expected);

        while seen.len() < expected {
            let result = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(result)) => result,
                Ok(None) => {
                    return Err(EmbedFailure::ChannelUnavailable(
                        "result dispatcher stopped".into(),
                    ));
                }
                Err(_) => {
                    warn!(
                        %correlation_id,
                        received = seen.len(),
                        expected,
                        "embedding deadline elapsed"
                    );
                    return Err(EmbedFailure::Timeout);
                }
            };

            let Some(segment) = by_index.get(&result.index) else {
                warn!(index = result.index, "result for unknown sequence index");
                continue;
            };
            if !seen.insert(result.index) {
                debug!(index = result.index, "duplicate result, ignoring");
                continue;
            }
            entries.push(SegmentEmbedding {
                segment: (*segment).clone(),
                vector: result.vector,
            });
        }

        match KnowledgeBatch::assemble(expected, entries) {
            Some(batch) => Ok(batch),
            // The collector admits exactly one result per known index
            None => unreachable!("collector completed without a full batch"),
        }
    }
}
