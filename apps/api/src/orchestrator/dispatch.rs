//! Dispatch scheduler — staggered, tiered, concurrent execution of one
//! submission's evaluation requests.
//!
//! Firing every request simultaneously bursts the remote API into 529s;
//! serializing them wastes the latency budget. The middle path: launch the
//! fast tier with tight staggers, the slow tier behind it with wide ones,
//! and let everything run concurrently once launched. Each request debits
//! the shared token bucket before executing and runs through the retry
//! executor. One request exhausting its retries never aborts its siblings —
//! the batch always settles with a terminal outcome for every index.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::evaluation::EvaluationRequest;
use crate::llm_client::LlmError;
use crate::orchestrator::events::{
    publish_outcomes, BatchSummary, Disposition, EventSink, RequestOutcome,
};
use crate::orchestrator::retry::{self, RetryPolicy};
use crate::orchestrator::token_bucket::TokenBucket;

/// How long a request waits for token-bucket budget before proceeding
/// without it. Strict budget adherence loses to responsiveness here.
const BUDGET_WAIT_CEILING: Duration = Duration::from_secs(10);

const EXECUTOR_MAX_ATTEMPTS: u32 = 5;
const EXECUTOR_BASE_DELAY: Duration = Duration::from_secs(1);

/// The one remote capability the scheduler needs: turn a request into
/// content, or a classifiable error. Production is the Anthropic client;
/// tests script outcomes.
#[async_trait]
pub trait EvaluationBackend: Send + Sync {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<String, LlmError>;
}

/// Runs one submission to completion and publishes events along the way.
///
/// Every request produces exactly one outcome — the returned summary maps
/// each original index to it. Completion order is unconstrained; the caller
/// reconstructs ordering by index.
pub async fn run_batch(
    requests: Vec<EvaluationRequest>,
    backend: Arc<dyn EvaluationBackend>,
    bucket: Arc<TokenBucket>,
    sink: &dyn EventSink,
) -> BatchSummary {
    let total = requests.len();
    let (tx, rx) = mpsc::channel::<RequestOutcome>(total.max(1));

    for request in requests {
        let backend = backend.clone();
        let bucket = bucket.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = execute_request(request, backend.as_ref(), &bucket).await;
            // A dropped receiver means the batch was abandoned; nothing to do.
            let _ = tx.send(outcome).await;
        });
    }
    drop(tx);

    publish_outcomes(total, rx, sink).await
}

/// Drives one request: stagger, budget admission, retry executor, and the
/// category-level override round if the first full run still failed.
async fn execute_request(
    request: EvaluationRequest,
    backend: &dyn EvaluationBackend,
    bucket: &TokenBucket,
) -> RequestOutcome {
    tokio::time::sleep(request.stagger).await;

    if tokio::time::timeout(BUDGET_WAIT_CEILING, bucket.acquire(request.output_budget))
        .await
        .is_err()
    {
        warn!(
            "Request {}: no token budget after {}s, proceeding without it",
            request.index,
            BUDGET_WAIT_CEILING.as_secs()
        );
    }

    let policy = RetryPolicy {
        max_attempts: EXECUTOR_MAX_ATTEMPTS,
        base_delay: EXECUTOR_BASE_DELAY,
        high_cost: !request.low_latency,
    };

    let mut result = retry::execute(&policy, request.index, || backend.evaluate(&request)).await;

    if result.is_err() {
        if let Some(bonus) = &request.retry_override {
            for round in 1..=bonus.extra_attempts {
                info!(
                    "Request {} ({}): category-level retry {round} after {}ms",
                    request.index,
                    request.key,
                    bonus.extra_delay.as_millis()
                );
                tokio::time::sleep(bonus.extra_delay).await;
                result =
                    retry::execute(&policy, request.index, || backend.evaluate(&request)).await;
                if result.is_ok() {
                    break;
                }
            }

            if result.is_err() {
                if let Some(placeholder) = &bonus.placeholder_on_failure {
                    warn!(
                        "Request {} ({}): substituting placeholder after final failure",
                        request.index, request.key
                    );
                    return RequestOutcome {
                        index: request.index,
                        category: request.key.to_string(),
                        heading: request.heading,
                        disposition: Disposition::Placeholder {
                            content: placeholder.clone(),
                        },
                    };
                }
            }
        }
    }

    let disposition = match result {
        Ok(content) => Disposition::Success { content },
        Err(err) => {
            warn!("Request {} ({}): {err}", request.index, request.key);
            Disposition::Failed {
                message: err.to_string(),
            }
        }
    };

    RequestOutcome {
        index: request.index,
        category: request.key.to_string(),
        heading: request.heading,
        disposition,
    }
}
