#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use drainer_service::adapters::autoscaling::AutoscalingApi;
use drainer_service::adapters::orchestration::{ContainerInstanceDescription, OrchestrationApi};
use drainer_service::adapters::queue::{CleanupApi, QueueApi, ReceivedMessage};
use drainer_service::runtime::config::DrainSettings;
use drainer_service::runtime::contract::{
    AcknowledgmentHandle, LifecycleActionCompletion, TerminationEvent,
};
use drainer_service::runtime::error::TransportError;

pub const CLUSTER: &str = "test-cluster";

/// A terminating-hook notification body as Auto Scaling delivers it.
pub fn hook_body(ec2_instance_id: &str) -> String {
    format!(
        r#"{{"LifecycleHookName":"drain-hook","AccountId":"609519224176","RequestId":"req-{ec2_instance_id}","LifecycleTransition":"autoscaling:EC2_INSTANCE_TERMINATING","AutoScalingGroupName":"asg-1","Service":"AWS Auto Scaling","Time":"2026-10-18T09:00:00.000Z","EC2InstanceId":"{ec2_instance_id}","LifecycleActionToken":"token-{ec2_instance_id}"}}"#
    )
}

pub fn termination_event(ec2_instance_id: &str, receipt: &str) -> TerminationEvent {
    let (event, error) =
        TerminationEvent::decode(&hook_body(ec2_instance_id), AcknowledgmentHandle::new(receipt));
    assert!(error.is_none(), "fixture body should decode");
    event
}

/// Thirty-second ticks, with the grace period chosen per test.
pub fn settings(grace_period: Duration) -> DrainSettings {
    DrainSettings {
        grace_period,
        ..DrainSettings::new(CLUSTER)
    }
}

/// How a fake container instance answers task queries.
#[derive(Clone, Copy, Debug)]
pub enum Tasks {
    /// Tasks are reported for this many queries, then none.
    DrainAfter(u32),
    Never,
}

#[derive(Debug)]
struct FakeInstance {
    container_instance_id: String,
    ec2_instance_id: String,
    tasks: Tasks,
    queries: u32,
}

/// An ECS cluster held in memory that records every mutating call.
#[derive(Default)]
pub struct FakeCluster {
    instances: Mutex<Vec<FakeInstance>>,
    draining: Mutex<Vec<String>>,
    task_queries: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn with_instance(
        self,
        container_instance_id: &str,
        ec2_instance_id: &str,
        tasks: Tasks,
    ) -> Self {
        self.instances.lock().expect("poisoned mutex").push(FakeInstance {
            container_instance_id: container_instance_id.to_string(),
            ec2_instance_id: ec2_instance_id.to_string(),
            tasks,
            queries: 0,
        });
        self
    }

    pub fn draining(&self) -> Vec<String> {
        self.draining.lock().expect("poisoned mutex").clone()
    }

    pub fn task_queries(&self) -> Vec<String> {
        self.task_queries.lock().expect("poisoned mutex").clone()
    }
}

impl OrchestrationApi for FakeCluster {
    async fn list_container_instances(
        &self,
        _cluster: &str,
    ) -> Result<Vec<String>, TransportError> {
        Ok(self
            .instances
            .lock()
            .expect("poisoned mutex")
            .iter()
            .map(|instance| instance.container_instance_id.clone())
            .collect())
    }

    async fn describe_container_instance(
        &self,
        _cluster: &str,
        container_instance_id: &str,
    ) -> Result<Vec<ContainerInstanceDescription>, TransportError> {
        Ok(self
            .instances
            .lock()
            .expect("poisoned mutex")
            .iter()
            .filter(|instance| instance.container_instance_id == container_instance_id)
            .map(|instance| ContainerInstanceDescription {
                container_instance_id: instance.container_instance_id.clone(),
                ec2_instance_id: Some(instance.ec2_instance_id.clone()),
            })
            .collect())
    }

    async fn set_draining(
        &self,
        _cluster: &str,
        container_instance_id: &str,
    ) -> Result<(), TransportError> {
        self.draining
            .lock()
            .expect("poisoned mutex")
            .push(container_instance_id.to_string());
        Ok(())
    }

    async fn list_running_tasks(
        &self,
        _cluster: &str,
        container_instance_id: &str,
    ) -> Result<Vec<String>, TransportError> {
        self.task_queries
            .lock()
            .expect("poisoned mutex")
            .push(container_instance_id.to_string());

        let mut instances = self.instances.lock().expect("poisoned mutex");
        let Some(instance) = instances
            .iter_mut()
            .find(|instance| instance.container_instance_id == container_instance_id)
        else {
            return Err(TransportError::new("ecs:ListTasks", "container instance not found"));
        };

        instance.queries += 1;
        let drained = match instance.tasks {
            Tasks::DrainAfter(busy) => instance.queries > busy,
            Tasks::Never => false,
        };
        Ok(if drained {
            Vec::new()
        } else {
            vec![format!("{container_instance_id}/task-1")]
        })
    }
}

/// Records every completion attempt, successful or not.
#[derive(Default)]
pub struct FakeAutoscaling {
    fail: bool,
    attempts: Mutex<Vec<LifecycleActionCompletion>>,
}

impl FakeAutoscaling {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<LifecycleActionCompletion> {
        self.attempts.lock().expect("poisoned mutex").clone()
    }
}

impl AutoscalingApi for FakeAutoscaling {
    async fn complete_lifecycle_action(
        &self,
        completion: &LifecycleActionCompletion,
    ) -> Result<(), TransportError> {
        self.attempts
            .lock()
            .expect("poisoned mutex")
            .push(completion.clone());
        if self.fail {
            return Err(TransportError::new(
                "autoscaling:CompleteLifecycleAction",
                "No active Lifecycle Action found",
            ));
        }
        Ok(())
    }
}

/// Serves one batch of messages, then idles like an empty long poll.
#[derive(Default)]
pub struct FakeQueue {
    pending: Mutex<Option<Vec<ReceivedMessage>>>,
    acknowledged: Mutex<Vec<String>>,
}

impl FakeQueue {
    pub fn with_batch(messages: Vec<ReceivedMessage>) -> Self {
        Self {
            pending: Mutex::new(Some(messages)),
            ..Self::default()
        }
    }

    pub fn acknowledged(&self) -> Vec<String> {
        let mut handles = self.acknowledged.lock().expect("poisoned mutex").clone();
        handles.sort();
        handles
    }
}

impl QueueApi for FakeQueue {
    async fn receive_messages(&self) -> Result<Vec<ReceivedMessage>, TransportError> {
        let batch = self.pending.lock().expect("poisoned mutex").take();
        match batch {
            Some(messages) => Ok(messages),
            None => {
                tokio::time::sleep(Duration::from_secs(20)).await;
                Ok(Vec::new())
            }
        }
    }
}

impl CleanupApi for FakeQueue {
    async fn acknowledge(&self, handle: &AcknowledgmentHandle) -> Result<(), TransportError> {
        self.acknowledged
            .lock()
            .expect("poisoned mutex")
            .push(handle.as_str().to_string());
        Ok(())
    }
}
