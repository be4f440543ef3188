//! Job execution span helpers.

use tracing::Span;

use crate::model::JobId;

/// Start a span covering one claimed job, from fetch to release.
///
/// `job.name` is declared empty because the name is only known after the
/// envelope has been fetched; fill it with [`record_job_name`].
pub fn start_job_span(queue: &str, id: &JobId) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.queue" = queue,
        "job.id" = %id,
        "job.name" = tracing::field::Empty,
        "job.outcome" = tracing::field::Empty,
    )
}

pub fn record_job_name(span: &Span, name: &str) {
    span.record("job.name", name);
}

/// Record a state transition event on the span.
///
/// Emits a tracing `info` event scoped to the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}

pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("job.outcome", outcome);
}
