//! The parallel-request orchestration layer.
//!
//! One submission fans out into N remote calls. Admission goes through a
//! process-wide token bucket, execution through the retry/backoff executor,
//! launch order through the tiered dispatch scheduler, and outcomes through
//! the aggregator, which publishes the client-facing event stream.

pub mod dispatch;
pub mod events;
pub mod retry;
pub mod token_bucket;
