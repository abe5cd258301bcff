//! Job lifecycle span helpers.

use tracing::Span;

use crate::model::JobState;

/// Start a span covering one job invocation's lock handling.
///
/// `job.state` starts empty and follows [`record_state_transition`].
pub fn start_job_span(job_type: &str, lock_key: &str) -> Span {
    tracing::info_span!(
        "job.lock",
        "job.type" = job_type,
        "job.lock_key" = lock_key,
        "job.state" = tracing::field::Empty,
    )
}

/// Record a lifecycle transition on `span` and update its `job.state`.
pub fn record_state_transition(span: &Span, from: JobState, to: JobState) {
    span.record("job.state", tracing::field::display(to));
    span.in_scope(|| {
        tracing::debug!(%from, %to, "state_transition");
        if to.is_terminal() {
            tracing::debug!(state = %to, "job lock handling settled");
        }
    });
}
