//! Structured observability hooks for campaign and minimization lifecycle events.
//!
//! Events are emitted at `info!` level (warnings for refuted or failed work);
//! filtering follows `RUST_LOG`.

use std::path::Path;

use tracing::{info, warn};

use crate::oracle::PartialOrder;

/// Span carrying `campaign = <index>`, attached to a campaign's async work.
///
/// ```ignore
/// oracle.check_campaign(&finished, 3).instrument(campaign_span(3)).await;
/// ```
pub fn campaign_span(campaign_index: usize) -> tracing::Span {
    tracing::info_span!("ecstatic.campaign", campaign = campaign_index)
}

/// Emit event: campaign dispatched to the worker pool.
pub fn emit_campaign_started(campaign_index: usize, jobs: usize, workers: usize) {
    info!(
        event = "campaign.started",
        campaign = campaign_index,
        jobs = jobs,
        workers = workers,
    );
}

/// Emit event: every job of a campaign finished or failed.
pub fn emit_campaign_finished(campaign_index: usize, finished: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "campaign.finished",
        campaign = campaign_index,
        finished = finished,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: a first-pass check flagged a pair.
pub fn emit_violation_detected(order: &PartialOrder, target: &Path) {
    info!(
        event = "violation.detected",
        relation = %order.relation,
        partial_order = %order,
        target = %target.display(),
    );
}

/// Emit event: re-running the pair made a suspected violation disappear.
pub fn emit_violation_refuted(order: &PartialOrder, target: &Path) {
    warn!(
        event = "violation.refuted",
        relation = %order.relation,
        partial_order = %order,
        target = %target.display(),
    );
}

/// Emit event: evidence artifact persisted.
pub fn emit_evidence_written(path: &Path, violated: bool) {
    info!(event = "evidence.written", path = %path.display(), violated = violated);
}

/// Emit event: one delta-debugging predicate run reached a terminal state.
pub fn emit_delta_debug_finished(target: &Path, predicate_index: usize, outcome: &str) {
    info!(
        event = "delta_debug.finished",
        target = %target.display(),
        predicate = predicate_index,
        outcome = %outcome,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_span_enters() {
        let span = campaign_span(1);
        let _guard = span.enter();
        emit_campaign_started(1, 4, 2);
    }
}
