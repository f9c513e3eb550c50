use std::sync::Arc;

use anyhow::{Context, Result};
// All three SDK crates re-export the same smithy error formatter.
use aws_sdk_ecs::error::DisplayErrorContext as SdkErrorContext;
use aws_sdk_ecs::types::ContainerInstanceStatus;
use clap::Parser;
use drainer_service::adapters::autoscaling::AutoscalingApi;
use drainer_service::adapters::orchestration::{ContainerInstanceDescription, OrchestrationApi};
use drainer_service::adapters::queue::{CleanupApi, QueueApi, ReceivedMessage};
use drainer_service::handlers::dispatcher::Dispatcher;
use drainer_service::handlers::intake::run_intake;
use drainer_service::logging::{init_logging, LogFormat};
use drainer_service::runtime::config::{DrainerConfig, GraceSource, QueueSettings, RawConfig};
use drainer_service::runtime::contract::{AcknowledgmentHandle, LifecycleActionCompletion};
use drainer_service::runtime::error::TransportError;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "drainer",
    about = "Drains ECS container instances before Auto Scaling terminates them"
)]
struct Args {
    /// ECS cluster the container instances are registered in
    #[arg(long, env = "CLUSTER")]
    cluster: Option<String>,

    /// How long to wait for tasks to drain (e.g. "45m", "1h 30m"); defaults to 1h
    #[arg(long, env = "DRAINER_TIMEOUT")]
    drain_timeout: Option<String>,

    /// URL of the SQS queue receiving lifecycle notifications
    #[arg(long, env = "LIFECYCLE_QUEUE")]
    lifecycle_queue: Option<String>,

    /// Maximum number of instances drained at once; unbounded when unset
    #[arg(long, env = "DRAINER_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Log output format
    #[arg(value_enum, long, env = "DRAINER_LOG_FORMAT", default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

fn sdk_failure<E>(operation: &'static str, error: E) -> TransportError
where
    E: std::error::Error + 'static,
{
    TransportError::new(operation, SdkErrorContext(&error).to_string())
}

struct EcsOrchestration {
    client: aws_sdk_ecs::Client,
}

impl OrchestrationApi for EcsOrchestration {
    async fn list_container_instances(&self, cluster: &str) -> Result<Vec<String>, TransportError> {
        let mut container_instances = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_container_instances()
                .cluster(cluster)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|error| sdk_failure("ecs:ListContainerInstances", error))?;

            container_instances.extend(output.container_instance_arns().iter().cloned());
            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(container_instances)
    }

    async fn describe_container_instance(
        &self,
        cluster: &str,
        container_instance_id: &str,
    ) -> Result<Vec<ContainerInstanceDescription>, TransportError> {
        let output = self
            .client
            .describe_container_instances()
            .cluster(cluster)
            .container_instances(container_instance_id)
            .send()
            .await
            .map_err(|error| sdk_failure("ecs:DescribeContainerInstances", error))?;

        Ok(output
            .container_instances()
            .iter()
            .map(|instance| ContainerInstanceDescription {
                container_instance_id: instance
                    .container_instance_arn()
                    .unwrap_or(container_instance_id)
                    .to_string(),
                ec2_instance_id: instance.ec2_instance_id().map(str::to_string),
            })
            .collect())
    }

    async fn set_draining(
        &self,
        cluster: &str,
        container_instance_id: &str,
    ) -> Result<(), TransportError> {
        let output = self
            .client
            .update_container_instances_state()
            .cluster(cluster)
            .container_instances(container_instance_id)
            .status(ContainerInstanceStatus::Draining)
            .send()
            .await
            .map_err(|error| sdk_failure("ecs:UpdateContainerInstancesState", error))?;

        // ECS reports per-instance rejections in the body, not as an error.
        if let Some(failure) = output.failures().first() {
            return Err(TransportError::new(
                "ecs:UpdateContainerInstancesState",
                format!(
                    "{} rejected: {}",
                    failure.arn().unwrap_or(container_instance_id),
                    failure.reason().unwrap_or("unknown reason")
                ),
            ));
        }
        Ok(())
    }

    async fn list_running_tasks(
        &self,
        cluster: &str,
        container_instance_id: &str,
    ) -> Result<Vec<String>, TransportError> {
        let output = self
            .client
            .list_tasks()
            .cluster(cluster)
            .container_instance(container_instance_id)
            .send()
            .await
            .map_err(|error| sdk_failure("ecs:ListTasks", error))?;

        Ok(output.task_arns().to_vec())
    }
}

struct AsgLifecycle {
    client: aws_sdk_autoscaling::Client,
}

impl AutoscalingApi for AsgLifecycle {
    async fn complete_lifecycle_action(
        &self,
        completion: &LifecycleActionCompletion,
    ) -> Result<(), TransportError> {
        self.client
            .complete_lifecycle_action()
            .auto_scaling_group_name(&completion.auto_scaling_group_name)
            .instance_id(&completion.instance_id)
            .lifecycle_action_result(&completion.lifecycle_action_result)
            .lifecycle_action_token(&completion.lifecycle_action_token)
            .lifecycle_hook_name(&completion.lifecycle_hook_name)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| sdk_failure("autoscaling:CompleteLifecycleAction", error))
    }
}

struct SqsLifecycleQueue {
    client: aws_sdk_sqs::Client,
    settings: QueueSettings,
}

impl QueueApi for SqsLifecycleQueue {
    async fn receive_messages(&self) -> Result<Vec<ReceivedMessage>, TransportError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.settings.queue_url)
            .wait_time_seconds(self.settings.wait_time_seconds)
            .visibility_timeout(self.settings.visibility_timeout_seconds)
            .max_number_of_messages(self.settings.max_messages)
            .send()
            .await
            .map_err(|error| sdk_failure("sqs:ReceiveMessage", error))?;

        Ok(output
            .messages()
            .iter()
            .map(|message| ReceivedMessage {
                body: message.body().unwrap_or_default().to_string(),
                receipt_handle: message.receipt_handle().unwrap_or_default().to_string(),
            })
            .collect())
    }
}

impl CleanupApi for SqsLifecycleQueue {
    async fn acknowledge(&self, handle: &AcknowledgmentHandle) -> Result<(), TransportError> {
        if handle.is_empty() {
            return Err(TransportError::new(
                "sqs:DeleteMessage",
                "event carries no receipt handle",
            ));
        }

        self.client
            .delete_message()
            .queue_url(&self.settings.queue_url)
            .receipt_handle(handle.as_str())
            .send()
            .await
            .map(|_| ())
            .map_err(|error| sdk_failure("sqs:DeleteMessage", error))
    }
}

async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for SIGINT")?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format)?;

    let config = DrainerConfig::from_raw(RawConfig {
        cluster: args.cluster,
        drain_timeout: args.drain_timeout,
        queue_url: args.lifecycle_queue,
        max_concurrency: args.max_concurrency,
    })
    .context("invalid drainer configuration")?;

    if let GraceSource::Rejected(raw) = &config.grace_source {
        warn!(
            drain_timeout = %raw,
            grace_secs = config.drain.grace_period.as_secs(),
            "Could not parse DRAINER_TIMEOUT, defaulting to 1 hour"
        );
    }

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    info!(
        cluster = %config.drain.cluster,
        grace_secs = config.drain.grace_period.as_secs(),
        poll_interval_secs = config.drain.poll_interval.as_secs(),
        queue_url = %config.queue.queue_url,
        max_concurrency = config.max_concurrency,
        region = aws_config.region().map(|region| region.as_ref()),
        "Starting drainer"
    );

    let orchestration = Arc::new(EcsOrchestration {
        client: aws_sdk_ecs::Client::new(&aws_config),
    });
    let autoscaling = Arc::new(AsgLifecycle {
        client: aws_sdk_autoscaling::Client::new(&aws_config),
    });
    let queue = Arc::new(SqsLifecycleQueue {
        client: aws_sdk_sqs::Client::new(&aws_config),
        settings: config.queue.clone(),
    });

    let shutdown = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);

    let intake = tokio::spawn({
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        async move { run_intake(queue.as_ref(), events_tx, shutdown).await }
    });

    let dispatcher = Dispatcher::new(orchestration, autoscaling, queue, config.drain.clone())
        .with_concurrency_limit(config.max_concurrency);
    let dispatch = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { dispatcher.run(events_rx, shutdown).await }
    });

    let received = wait_for_shutdown_signal().await?;
    info!(signal = received, "Stopping drainer");
    shutdown.cancel();

    if let Err(join_error) = intake.await {
        warn!(error = %join_error, "Intake task did not stop cleanly");
    }
    let in_flight = dispatch.await.context("dispatcher task failed")?;
    if !in_flight.is_empty() {
        // Abandoned hooks fall back to the lifecycle hook's own timeout.
        warn!(
            in_flight = in_flight.len(),
            "Exiting with drain executions still in flight"
        );
    }

    info!("Done");
    Ok(())
}
