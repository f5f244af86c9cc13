//! Evaluation catalog — the eight categories every transcript is scored
//! against, and the per-submission requests built from them.
//!
//! Prompt texts are external content: one opaque file per category under the
//! configured prompts directory, loaded fresh for each submission so edits
//! take effect without a restart.

pub mod cleanup;
pub mod handlers;
mod phrases;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Output budget for the low-latency tier.
pub const FAST_OUTPUT_BUDGET: u32 = 4096;
/// Output budget for the slow tier.
pub const SLOW_OUTPUT_BUDGET: u32 = 8192;

// Launch staggering. Fast-tier requests complete quickly and pose low
// collision risk; slow-tier requests consume disproportionate token budget,
// so two of them firing together is the expensive collision to avoid.
const FAST_STAGGER: Duration = Duration::from_millis(50);
const SLOW_BASE_DELAY: Duration = Duration::from_millis(250);
const SLOW_STAGGER: Duration = Duration::from_millis(500);

/// Extra end-to-end retry round for the email category: one more full
/// executor run after a 3s pause, and a placeholder if that fails too.
const EMAIL_EXTRA_DELAY: Duration = Duration::from_secs(3);
const EMAIL_PLACEHOLDER: &str = "We couldn't generate the follow-up email for this interview. \
     The rest of the evaluation completed normally — rerun the evaluation to produce the email.";

/// One entry in the fixed category catalog.
pub struct CategorySpec {
    /// Stable key, used in stream events and the batched response.
    pub key: &'static str,
    pub display_name: &'static str,
    pub prompt_file: &'static str,
    /// Fast/cheap tier: small output budget, haiku-class model, tight stagger.
    pub low_latency: bool,
}

pub const CATALOG: [CategorySpec; 8] = [
    CategorySpec {
        key: "title",
        display_name: "Title",
        prompt_file: "title.txt",
        low_latency: true,
    },
    CategorySpec {
        key: "impactfulStatement",
        display_name: "Most Impactful Statement",
        prompt_file: "impactful_statement.txt",
        low_latency: true,
    },
    CategorySpec {
        key: "scorecard",
        display_name: "Interview Scorecard",
        prompt_file: "scorecard.txt",
        low_latency: true,
    },
    CategorySpec {
        key: "talkListenRatio",
        display_name: "Talk/Listen Ratio Analysis",
        prompt_file: "talk_listen_ratio.txt",
        low_latency: true,
    },
    CategorySpec {
        key: "applicationInvitation",
        display_name: "Application Invitation Assessment",
        prompt_file: "application_invitation.txt",
        low_latency: true,
    },
    CategorySpec {
        key: "growthPlan",
        display_name: "Weekly Growth Plan",
        prompt_file: "growth_plan.txt",
        low_latency: false,
    },
    CategorySpec {
        key: "coachingNotes",
        display_name: "Coaching Notes",
        prompt_file: "coaching_notes.txt",
        low_latency: false,
    },
    CategorySpec {
        key: "emailBlast",
        display_name: "Email After Interview, Same Day",
        prompt_file: "email_blast.txt",
        low_latency: false,
    },
];

/// Category-level retry policy beyond the executor's own attempts.
#[derive(Debug, Clone)]
pub struct RetryOverride {
    pub extra_attempts: u32,
    pub extra_delay: Duration,
    /// Substituted as a result if every attempt fails, so the slot is never
    /// left empty. `None` means the failure surfaces as an error event.
    pub placeholder_on_failure: Option<String>,
}

/// One logical request against the remote API. Immutable after creation;
/// owned by the dispatcher for the lifetime of one submission.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    /// Stable 0-based position; clients place results by this.
    pub index: usize,
    pub key: &'static str,
    /// Display heading carried through to the client. Randomized for the
    /// impactful-statement category; the `key` stays stable regardless.
    pub heading: String,
    pub low_latency: bool,
    /// Prompt text plus transcript, ready to send.
    pub prompt_body: String,
    /// Max output units; also the token-bucket debit.
    pub output_budget: u32,
    /// Delay before launch, spreading concurrent load over time.
    pub stagger: Duration,
    pub retry_override: Option<RetryOverride>,
    /// Content must start at this anchor; leading text before it is trimmed.
    pub content_anchor: Option<&'static str>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to load prompt file '{file}': {source}")]
    Prompt {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

/// Builds the full request batch for one transcript, in catalog order.
///
/// The orchestration shape — count, indices, keys, budgets — is identical
/// for every submission of the same catalog; only the impactful-statement
/// heading varies.
pub fn build_requests(
    prompts_dir: &Path,
    transcript: &str,
) -> Result<Vec<EvaluationRequest>, CatalogError> {
    let mut requests = Vec::with_capacity(CATALOG.len());
    let mut fast_position = 0u32;
    let mut slow_position = 0u32;

    for (index, spec) in CATALOG.iter().enumerate() {
        let prompt = load_prompt(prompts_dir, spec.prompt_file)?;

        let stagger = if spec.low_latency {
            let s = FAST_STAGGER * fast_position;
            fast_position += 1;
            s
        } else {
            let s = SLOW_BASE_DELAY + SLOW_STAGGER * slow_position;
            slow_position += 1;
            s
        };

        let heading = if spec.key == "impactfulStatement" {
            phrases::random_impactful_heading().to_string()
        } else {
            spec.display_name.to_string()
        };

        let retry_override = (spec.key == "emailBlast").then(|| RetryOverride {
            extra_attempts: 1,
            extra_delay: EMAIL_EXTRA_DELAY,
            placeholder_on_failure: Some(EMAIL_PLACEHOLDER.to_string()),
        });

        requests.push(EvaluationRequest {
            index,
            key: spec.key,
            heading,
            low_latency: spec.low_latency,
            prompt_body: format!("{prompt}\n\nTranscript:\n{transcript}"),
            output_budget: if spec.low_latency {
                FAST_OUTPUT_BUDGET
            } else {
                SLOW_OUTPUT_BUDGET
            },
            stagger,
            retry_override,
            content_anchor: (spec.key == "emailBlast").then_some("Subject:"),
        });
    }

    Ok(requests)
}

fn load_prompt(dir: &Path, file: &str) -> Result<String, CatalogError> {
    std::fs::read_to_string(dir.join(file)).map_err(|source| CatalogError::Prompt {
        file: file.to_string(),
        source,
    })
}
