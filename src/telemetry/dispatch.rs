//! Dispatch span helpers.
//!
//! One span per dequeued work item, covering construction and execution.

use crate::model::{JobTag, WorkId};
use tracing::Span;

/// Start a span for a dispatched job.
///
/// The `job.outcome` field is declared empty and filled by [`record_outcome`].
pub fn start_job_span(tag: &JobTag, id: WorkId, display_name: &str) -> Span {
    tracing::info_span!(
        "dispatch.job",
        "job.tag" = %tag,
        "work.id" = %id,
        "work.display_name" = display_name,
        "job.outcome" = tracing::field::Empty,
    )
}

/// Record how the job ended on its span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("job.outcome", outcome);
}
