//! Axum route handlers for the Evaluation API.
//!
//! Two delivery modes over one orchestration path: the streaming endpoint
//! publishes results over server-sent events as they complete; the batched
//! endpoint runs the same budget/retry/stagger contract and returns the full
//! result set in one JSON object.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info};

use crate::errors::AppError;
use crate::evaluation::build_requests;
use crate::orchestrator::dispatch::run_batch;
use crate::orchestrator::events::{ChannelSink, EventSink, NullSink, StreamEvent};
use crate::state::AppState;

/// Transcripts below this length carry too little signal to evaluate.
const MIN_TRANSCRIPT_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub transcript: String,
}

/// The full result set, keyed by category. Failed categories stay empty.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResults {
    pub title: String,
    pub impactful_statement: String,
    pub scorecard: String,
    pub talk_listen_ratio: String,
    pub application_invitation: String,
    pub growth_plan: String,
    pub coaching_notes: String,
    pub email_blast: String,
}

impl EvaluationResults {
    fn set(&mut self, key: &str, content: String) {
        match key {
            "title" => self.title = content,
            "impactfulStatement" => self.impactful_statement = content,
            "scorecard" => self.scorecard = content,
            "talkListenRatio" => self.talk_listen_ratio = content,
            "applicationInvitation" => self.application_invitation = content,
            "growthPlan" => self.growth_plan = content,
            "coachingNotes" => self.coaching_notes = content,
            "emailBlast" => self.email_blast = content,
            other => error!("Unknown category key '{other}' in batch summary"),
        }
    }
}

fn validate_transcript(transcript: &str) -> Result<&str, String> {
    let trimmed = transcript.trim();
    if trimmed.chars().count() < MIN_TRANSCRIPT_CHARS {
        return Err(format!(
            "Transcript must be at least {MIN_TRANSCRIPT_CHARS} characters"
        ));
    }
    Ok(trimmed)
}

// ────────────────────────────────────────────────────────────────────────────
// Streaming endpoint
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/evaluate/stream
///
/// Server-sent events: `data: <JSON>\n\n` per event. Validation and setup
/// failures are delivered in-stream as a single `{ "error": … }` event.
/// A disconnected client stops event writes; in-flight remote calls finish
/// on their own per-attempt budget.
pub async fn handle_evaluate_stream(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::spawn(run_stream(state, request, tx));

    let stream = ReceiverStream::new(rx).map(|payload| Ok(Event::default().data(payload)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn run_stream(state: AppState, request: EvaluateRequest, tx: mpsc::Sender<String>) {
    let sink = ChannelSink::new(tx);

    let transcript = match validate_transcript(&request.transcript) {
        Ok(t) => t,
        Err(error) => {
            // A closed sink here means the client already went away.
            let _ = sink.emit(StreamEvent::SetupError { error }).await;
            return;
        }
    };

    let requests = match build_requests(&state.config.prompts_dir, transcript) {
        Ok(r) => r,
        Err(e) => {
            error!("Evaluation setup failed: {e}");
            let _ = sink
                .emit(StreamEvent::SetupError {
                    error: e.to_string(),
                })
                .await;
            return;
        }
    };

    info!(
        "Evaluation stream started: transcript_chars={}, categories={}",
        transcript.chars().count(),
        requests.len()
    );

    let summary = run_batch(requests, state.backend.clone(), state.bucket.clone(), &sink).await;

    info!(
        "Evaluation stream settled: {}/{} categories produced content",
        summary.total - summary.missing_indices.len(),
        summary.total
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Batched fallback endpoint
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/evaluate
///
/// Same orchestration contract as the stream — budget, retry, stagger — with
/// delivery batched into one response instead of incremental.
pub async fn handle_evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluationResults>, AppError> {
    let transcript =
        validate_transcript(&request.transcript).map_err(AppError::Validation)?;

    let requests = build_requests(&state.config.prompts_dir, transcript)
        .map_err(|e| AppError::Internal(e.into()))?;

    info!(
        "Batched evaluation started: transcript_chars={}, categories={}",
        transcript.chars().count(),
        requests.len()
    );

    let summary = run_batch(
        requests,
        state.backend.clone(),
        state.bucket.clone(),
        &NullSink,
    )
    .await;

    let mut results = EvaluationResults::default();
    for outcome in summary.outcomes.values() {
        if let Some(content) = summary.content(outcome.index) {
            results.set(&outcome.category, content.to_string());
        }
    }

    if !summary.missing_indices.is_empty() {
        info!(
            "Batched evaluation settled with missing indices: {:?}",
            summary.missing_indices
        );
    }

    Ok(Json(results))
}
