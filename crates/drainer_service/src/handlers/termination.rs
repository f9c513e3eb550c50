//! The per-instance drain state machine.
//!
//! One execution takes one termination event from `Idle` to exactly one of
//! `Completed`, `TimedOut` or `Aborted`:
//!
//! ```text
//! Idle -> Draining -> Polling -> Completed | TimedOut | Aborted
//!           \----------------------------------------> Aborted
//! ```
//!
//! Polling evaluates one decision per tick. The deadline is only compared
//! against tick timestamps; it never interrupts an in-flight call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::adapters::autoscaling::AutoscalingApi;
use crate::handlers::drain::DrainControl;
use crate::runtime::config::DrainSettings;
use crate::runtime::contract::{DrainOutcome, DrainReport, TerminationEvent};
use crate::runtime::polling::{resolve_tick, FinalizeAttempt, TickDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    Idle,
    Draining,
    Polling,
    Completed,
    TimedOut,
    Aborted,
}

impl TerminationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TerminationState::Completed | TerminationState::TimedOut | TerminationState::Aborted
        )
    }
}

impl From<DrainOutcome> for TerminationState {
    fn from(outcome: DrainOutcome) -> Self {
        match outcome {
            DrainOutcome::Completed => TerminationState::Completed,
            DrainOutcome::TimedOut => TerminationState::TimedOut,
            DrainOutcome::Aborted => TerminationState::Aborted,
        }
    }
}

pub struct TerminationStateMachine<D, A> {
    drain: D,
    autoscaling: Arc<A>,
    grace_period: Duration,
    poll_interval: Duration,
    state: TerminationState,
    ticks: u32,
}

impl<D: DrainControl, A: AutoscalingApi> TerminationStateMachine<D, A> {
    pub fn new(drain: D, autoscaling: Arc<A>, settings: &DrainSettings) -> Self {
        Self {
            drain,
            autoscaling,
            grace_period: settings.grace_period,
            poll_interval: settings.poll_interval,
            state: TerminationState::Idle,
            ticks: 0,
        }
    }

    pub fn state(&self) -> TerminationState {
        self.state
    }

    /// Drives one event to a terminal state.
    pub async fn run(mut self, event: &TerminationEvent) -> DrainReport {
        if !event.has_instance() {
            warn!(
                component = "termination",
                event = "missing_instance",
                request_id = %event.request_id,
                "Event has no EC2 instance id, nothing to drain"
            );
            return self.finish(DrainOutcome::Aborted);
        }

        info!(
            component = "termination",
            event = "drain_started",
            ec2_instance_id = %event.ec2_instance_id,
            auto_scaling_group = %event.auto_scaling_group_name,
            lifecycle_transition = %event.lifecycle_transition,
            notification_age_secs = event
                .notified_at()
                .map(|notified_at| (Utc::now() - notified_at).num_seconds()),
            "Starting drain"
        );

        self.transition(TerminationState::Draining);
        if let Err(error) = self.drain.start_draining().await {
            warn!(
                component = "termination",
                event = "drain_failed",
                ec2_instance_id = %event.ec2_instance_id,
                instance_missing = error.is_not_found(),
                error = %error,
                "Could not set instance to draining, abandoning"
            );
            return self.finish(DrainOutcome::Aborted);
        }

        self.transition(TerminationState::Polling);
        let outcome = self.poll(event).await;
        self.finish(outcome)
    }

    async fn poll(&mut self, event: &TerminationEvent) -> DrainOutcome {
        let started = Instant::now();
        // An unrepresentable deadline never passes.
        let deadline = started.checked_add(self.grace_period);
        let mut ticker = time::interval_at(started + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let completion = event.completion();

        loop {
            let tick = ticker.tick().await;
            self.ticks += 1;

            let deadline_passed = deadline.is_some_and(|deadline| tick >= deadline);
            let finalize = if self.drain.has_no_running_tasks().await {
                match self.autoscaling.complete_lifecycle_action(&completion).await {
                    Ok(()) => FinalizeAttempt::Succeeded,
                    Err(error) => {
                        error!(
                            component = "termination",
                            event = "finalize_failed",
                            ec2_instance_id = %event.ec2_instance_id,
                            lifecycle_hook = %event.lifecycle_hook_name,
                            error = %error,
                            "Could not complete lifecycle action"
                        );
                        FinalizeAttempt::Failed
                    }
                }
            } else {
                FinalizeAttempt::NotAttempted
            };

            match resolve_tick(deadline_passed, finalize) {
                TickDecision::Continue => continue,
                TickDecision::Finish(outcome) => {
                    if outcome == DrainOutcome::TimedOut {
                        warn!(
                            component = "termination",
                            event = "deadline_passed",
                            ec2_instance_id = %event.ec2_instance_id,
                            grace_secs = self.grace_period.as_secs(),
                            "Instance did not drain within the grace period"
                        );
                    }
                    return outcome;
                }
            }
        }
    }

    fn transition(&mut self, next: TerminationState) {
        info!(
            component = "termination",
            event = "state_transition",
            ec2_instance_id = %self.drain.target().ec2_instance_id(),
            from = ?self.state,
            to = ?next,
            "State transition"
        );
        self.state = next;
    }

    fn finish(mut self, outcome: DrainOutcome) -> DrainReport {
        self.transition(outcome.into());
        let target = self.drain.target();
        DrainReport {
            ec2_instance_id: target.ec2_instance_id().to_string(),
            container_instance_id: target.container_instance_id().map(str::to_string),
            outcome,
            ticks: self.ticks,
        }
    }
}
