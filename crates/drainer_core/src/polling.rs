//! Per-tick decision rule for the polling phase of a drain.

use crate::contract::DrainOutcome;

/// What happened with the lifecycle-hook finalize call during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeAttempt {
    /// Tasks were still present (or unknown), so nothing was sent.
    NotAttempted,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Continue,
    Finish(DrainOutcome),
}

/// Collapses one tick into a single decision.
///
/// A successful finalize wins over a crossed deadline. A failed finalize
/// aborts regardless of the deadline.
pub fn resolve_tick(deadline_passed: bool, finalize: FinalizeAttempt) -> TickDecision {
    match (finalize, deadline_passed) {
        (FinalizeAttempt::Succeeded, _) => TickDecision::Finish(DrainOutcome::Completed),
        (FinalizeAttempt::Failed, _) => TickDecision::Finish(DrainOutcome::Aborted),
        (FinalizeAttempt::NotAttempted, true) => TickDecision::Finish(DrainOutcome::TimedOut),
        (FinalizeAttempt::NotAttempted, false) => TickDecision::Continue,
    }
}
