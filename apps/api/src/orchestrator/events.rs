//! Result aggregation and stream publishing.
//!
//! Outcomes arrive out of order from the dispatcher's tasks; the aggregator
//! emits a causally-ordered event stream — one `progress` event up front,
//! exactly one terminal event (`result` or `error`) per request index, and
//! exactly one `complete` event after everything has settled. Total ordering
//! across results is NOT guaranteed; consumers place results by `index`.
//!
//! A closed sink (client disconnected) stops further writes but never aborts
//! the batch: outcomes keep draining into the summary so the non-streaming
//! path and in-flight bookkeeping still finish cleanly.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// One event on the wire, serialized as `data: <JSON>\n\n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    Progress { completed: usize, total: usize },
    #[serde(rename_all = "camelCase")]
    Result {
        index: usize,
        /// Stable category key — identical across submissions.
        category: String,
        /// Display heading (may vary across submissions).
        heading: String,
        content: String,
        completed: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        index: usize,
        category: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        total: usize,
        missing_indices: Vec<usize>,
    },
    /// Fatal pre-dispatch failure (bad input, unreadable prompt). Emitted as
    /// the only event on the stream, untagged to match the client's bare
    /// `{"error": …}` contract. Must stay the last variant so the tagged
    /// shapes are tried first on deserialization.
    #[serde(untagged)]
    SetupError { error: String },
}

/// How one request finally settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Success { content: String },
    /// Substituted placeholder text — counted present, not missing.
    Placeholder { content: String },
    Failed { message: String },
}

/// Exactly one of these per request index reaches the aggregator.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub index: usize,
    pub category: String,
    pub heading: String,
    pub disposition: Disposition,
}

#[derive(Debug, Error)]
#[error("event sink closed")]
pub struct SinkClosed;

/// Transport seam for the publisher. The SSE path writes to an mpsc channel;
/// the batched path discards events and reads the summary instead.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: StreamEvent) -> Result<(), SinkClosed>;
}

/// Serializes events into SSE `data:` payloads on an mpsc channel.
/// A dropped receiver (client gone) reports `SinkClosed`.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: StreamEvent) -> Result<(), SinkClosed> {
        // StreamEvent serialization cannot fail: plain strings and integers.
        let payload = serde_json::to_string(&event).unwrap();
        self.tx.send(payload).await.map_err(|_| SinkClosed)
    }
}

/// Discards every event; used by the non-streaming endpoint.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: StreamEvent) -> Result<(), SinkClosed> {
        Ok(())
    }
}

/// Everything the batch produced, keyed by stable index.
#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    pub outcomes: BTreeMap<usize, RequestOutcome>,
    /// Indices that produced no usable content (placeholders count as usable).
    pub missing_indices: Vec<usize>,
}

impl BatchSummary {
    pub fn content(&self, index: usize) -> Option<&str> {
        match self.outcomes.get(&index).map(|o| &o.disposition) {
            Some(Disposition::Success { content }) | Some(Disposition::Placeholder { content }) => {
                Some(content)
            }
            _ => None,
        }
    }
}

/// Consumes outcomes until every sender is gone, publishing events as they
/// arrive. Returns once the batch has fully settled.
pub async fn publish_outcomes(
    total: usize,
    mut rx: mpsc::Receiver<RequestOutcome>,
    sink: &dyn EventSink,
) -> BatchSummary {
    let mut outcomes = BTreeMap::new();
    let mut results_emitted = 0;
    let mut sink_open = sink
        .emit(StreamEvent::Progress {
            completed: 0,
            total,
        })
        .await
        .is_ok();

    while let Some(outcome) = rx.recv().await {
        let event = match &outcome.disposition {
            Disposition::Success { content } | Disposition::Placeholder { content } => {
                results_emitted += 1;
                StreamEvent::Result {
                    index: outcome.index,
                    category: outcome.category.clone(),
                    heading: outcome.heading.clone(),
                    content: content.clone(),
                    completed: results_emitted,
                    total,
                }
            }
            Disposition::Failed { message } => StreamEvent::Error {
                index: outcome.index,
                category: outcome.category.clone(),
                message: message.clone(),
            },
        };

        if sink_open && sink.emit(event).await.is_err() {
            sink_open = false;
            warn!("Event sink closed mid-batch; finishing without a consumer");
        }

        outcomes.insert(outcome.index, outcome);
    }

    // Derived from the full index range, not from the outcomes that arrived:
    // a task whose sender was dropped without delivering (panic, abort) must
    // still surface as missing rather than vanish from the report.
    let missing_indices: Vec<usize> = (0..total)
        .filter(|index| {
            !matches!(
                outcomes.get(index).map(|o| &o.disposition),
                Some(Disposition::Success { .. }) | Some(Disposition::Placeholder { .. })
            )
        })
        .collect();

    if sink_open {
        let _ = sink
            .emit(StreamEvent::Complete {
                total: outcomes.len(),
                missing_indices: missing_indices.clone(),
            })
            .await;
    }

    BatchSummary {
        total,
        outcomes,
        missing_indices,
    }
}
