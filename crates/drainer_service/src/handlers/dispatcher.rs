use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::autoscaling::AutoscalingApi;
use crate::adapters::orchestration::OrchestrationApi;
use crate::adapters::queue::CleanupApi;
use crate::handlers::drain::{DrainTarget, Drainer};
use crate::handlers::termination::TerminationStateMachine;
use crate::runtime::config::DrainSettings;
use crate::runtime::contract::{DrainReport, TerminationEvent};

/// Fans termination events out to independent drain executions.
pub struct Dispatcher<O, A, C> {
    orchestration: Arc<O>,
    autoscaling: Arc<A>,
    cleanup: Arc<C>,
    settings: Arc<DrainSettings>,
    limiter: Option<Arc<Semaphore>>,
}

impl<O, A, C> Dispatcher<O, A, C>
where
    O: OrchestrationApi,
    A: AutoscalingApi,
    C: CleanupApi,
{
    pub fn new(
        orchestration: Arc<O>,
        autoscaling: Arc<A>,
        cleanup: Arc<C>,
        settings: DrainSettings,
    ) -> Self {
        Self {
            orchestration,
            autoscaling,
            cleanup,
            settings: Arc::new(settings),
            limiter: None,
        }
    }

    /// Caps how many executions drain at once. Waiting happens inside the
    /// spawned execution, never in the accept loop.
    pub fn with_concurrency_limit(mut self, limit: Option<usize>) -> Self {
        self.limiter = limit.map(|permits| Arc::new(Semaphore::new(permits)));
        self
    }

    /// Accepts events until `shutdown` fires or the channel closes.
    ///
    /// Executions still running at that point are returned, not cancelled.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<TerminationEvent>,
        shutdown: CancellationToken,
    ) -> JoinSet<DrainReport> {
        let mut executions = JoinSet::new();

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(
                        component = "dispatcher",
                        event = "shutdown",
                        "Stopped accepting events"
                    );
                    break;
                }
                received = events.recv() => match received {
                    Some(event) => event,
                    None => {
                        info!(
                            component = "dispatcher",
                            event = "channel_closed",
                            "Event channel closed"
                        );
                        break;
                    }
                },
            };

            reap_finished(&mut executions);

            if !event.has_instance() {
                debug!(
                    component = "dispatcher",
                    event = "discarded",
                    request_id = %event.request_id,
                    lifecycle_transition = %event.lifecycle_transition,
                    "Discarding event without EC2 instance id"
                );
                continue;
            }

            info!(
                component = "dispatcher",
                event = "dispatched",
                ec2_instance_id = %event.ec2_instance_id,
                in_flight = executions.len() + 1,
                "Dispatching drain execution"
            );
            executions.spawn(execute(
                event,
                self.orchestration.clone(),
                self.autoscaling.clone(),
                self.cleanup.clone(),
                self.settings.clone(),
                self.limiter.clone(),
            ));
        }

        executions
    }
}

fn reap_finished(executions: &mut JoinSet<DrainReport>) {
    while let Some(joined) = executions.try_join_next() {
        if let Err(join_error) = joined {
            error!(
                component = "dispatcher",
                event = "execution_panicked",
                error = %join_error,
                "Drain execution did not finish"
            );
        }
    }
}

async fn execute<O, A, C>(
    event: TerminationEvent,
    orchestration: Arc<O>,
    autoscaling: Arc<A>,
    cleanup: Arc<C>,
    settings: Arc<DrainSettings>,
    limiter: Option<Arc<Semaphore>>,
) -> DrainReport
where
    O: OrchestrationApi,
    A: AutoscalingApi,
    C: CleanupApi,
{
    // The semaphore is never closed, so acquisition only fails if it were.
    let _permit = match limiter {
        Some(semaphore) => semaphore.acquire_owned().await.ok(),
        None => None,
    };

    let drainer = Drainer::new(
        orchestration,
        DrainTarget::new(settings.cluster.clone(), event.ec2_instance_id.clone()),
    );
    let report = TerminationStateMachine::new(drainer, autoscaling, &settings)
        .run(&event)
        .await;

    let acknowledged = match cleanup.acknowledge(&event.acknowledgment_handle).await {
        Ok(()) => true,
        Err(error) => {
            warn!(
                component = "dispatcher",
                event = "acknowledge_failed",
                ec2_instance_id = %report.ec2_instance_id,
                error = %error,
                "Could not acknowledge termination event"
            );
            false
        }
    };

    info!(
        component = "dispatcher",
        event = "execution_finished",
        ec2_instance_id = %report.ec2_instance_id,
        container_instance_id = report.container_instance_id.as_deref(),
        outcome = %report.outcome,
        ticks = report.ticks,
        acknowledged,
        "Drain execution finished"
    );
    report
}
