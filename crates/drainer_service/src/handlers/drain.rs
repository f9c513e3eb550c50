//! Container-instance resolution, draining and task presence checks.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapters::orchestration::OrchestrationApi;
use crate::runtime::error::DrainError;

/// Finds the container instance running on `ec2_instance_id`.
///
/// Members are described one at a time and the scan stops at the first match.
/// A failed listing or describe call ends the scan. Nothing is retried.
pub async fn resolve_container_instance<O: OrchestrationApi>(
    api: &O,
    cluster: &str,
    ec2_instance_id: &str,
) -> Result<String, DrainError> {
    let members = api.list_container_instances(cluster).await?;
    debug!(
        component = "drain",
        event = "cluster_listed",
        cluster,
        members = members.len(),
        "Listed container instances"
    );

    for member in &members {
        let described = api.describe_container_instance(cluster, member).await?;

        let matched = described.into_iter().find(|description| {
            description.ec2_instance_id.as_deref() == Some(ec2_instance_id)
        });
        if let Some(description) = matched {
            return Ok(description.container_instance_id);
        }
    }

    Err(DrainError::NotFound {
        cluster: cluster.to_string(),
        ec2_instance_id: ec2_instance_id.to_string(),
    })
}

/// `true` only when the task query succeeds and is empty.
///
/// A failed query counts as tasks still running.
pub async fn has_no_running_tasks<O: OrchestrationApi>(
    api: &O,
    cluster: &str,
    container_instance_id: &str,
) -> bool {
    match api.list_running_tasks(cluster, container_instance_id).await {
        Ok(tasks) => {
            debug!(
                component = "drain",
                event = "tasks_listed",
                container_instance_id,
                running_tasks = tasks.len(),
                "Listed running tasks"
            );
            tasks.is_empty()
        }
        Err(error) => {
            warn!(
                component = "drain",
                event = "task_query_failed",
                container_instance_id,
                error = %error,
                "Task query failed, assuming tasks are still running"
            );
            false
        }
    }
}

/// Identity of one drain attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainTarget {
    cluster: String,
    ec2_instance_id: String,
    container_instance_id: Option<String>,
}

impl DrainTarget {
    pub fn new(cluster: impl Into<String>, ec2_instance_id: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            ec2_instance_id: ec2_instance_id.into(),
            container_instance_id: None,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn ec2_instance_id(&self) -> &str {
        &self.ec2_instance_id
    }

    pub fn container_instance_id(&self) -> Option<&str> {
        self.container_instance_id.as_deref()
    }
}

/// The capability surface the termination state machine drives.
pub trait DrainControl: Send {
    fn target(&self) -> &DrainTarget;

    /// Resolves the container instance (once) and marks it draining.
    fn start_draining(&mut self) -> impl Future<Output = Result<(), DrainError>> + Send;

    fn has_no_running_tasks(&self) -> impl Future<Output = bool> + Send;
}

pub struct Drainer<O> {
    api: Arc<O>,
    target: DrainTarget,
}

impl<O: OrchestrationApi> Drainer<O> {
    pub fn new(api: Arc<O>, target: DrainTarget) -> Self {
        Self { api, target }
    }

    async fn resolved_container_instance(&mut self) -> Result<String, DrainError> {
        if let Some(existing) = &self.target.container_instance_id {
            return Ok(existing.clone());
        }

        let resolved = resolve_container_instance(
            self.api.as_ref(),
            &self.target.cluster,
            &self.target.ec2_instance_id,
        )
        .await?;
        self.target.container_instance_id = Some(resolved.clone());
        Ok(resolved)
    }
}

impl<O: OrchestrationApi> DrainControl for Drainer<O> {
    fn target(&self) -> &DrainTarget {
        &self.target
    }

    async fn start_draining(&mut self) -> Result<(), DrainError> {
        let container_instance_id = self.resolved_container_instance().await?;
        self.api
            .set_draining(&self.target.cluster, &container_instance_id)
            .await?;
        info!(
            component = "drain",
            event = "draining_set",
            cluster = %self.target.cluster,
            ec2_instance_id = %self.target.ec2_instance_id,
            container_instance_id = %container_instance_id,
            "Container instance set to draining"
        );
        Ok(())
    }

    async fn has_no_running_tasks(&self) -> bool {
        let Some(container_instance_id) = self.target.container_instance_id.as_deref() else {
            return false;
        };
        has_no_running_tasks(self.api.as_ref(), &self.target.cluster, container_instance_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::adapters::orchestration::ContainerInstanceDescription;
    use crate::runtime::error::TransportError;

    #[derive(Default)]
    struct ScriptedCluster {
        members: Vec<String>,
        ec2_by_member: HashMap<String, String>,
        fail_listing: bool,
        fail_describe_for: Option<String>,
        fail_set_draining: bool,
        tasks: Option<Vec<String>>,
        described: Mutex<Vec<String>>,
        drained: Mutex<Vec<String>>,
        listings: Mutex<usize>,
    }

    impl ScriptedCluster {
        fn with_members(members: &[(&str, &str)]) -> Self {
            Self {
                members: members.iter().map(|(ci, _)| ci.to_string()).collect(),
                ec2_by_member: members
                    .iter()
                    .map(|(ci, ec2)| (ci.to_string(), ec2.to_string()))
                    .collect(),
                tasks: Some(Vec::new()),
                ..Self::default()
            }
        }

        fn described(&self) -> Vec<String> {
            self.described.lock().expect("poisoned mutex").clone()
        }

        fn drained(&self) -> Vec<String> {
            self.drained.lock().expect("poisoned mutex").clone()
        }

        fn listings(&self) -> usize {
            *self.listings.lock().expect("poisoned mutex")
        }
    }

    impl OrchestrationApi for ScriptedCluster {
        async fn list_container_instances(
            &self,
            _cluster: &str,
        ) -> Result<Vec<String>, TransportError> {
            *self.listings.lock().expect("poisoned mutex") += 1;
            if self.fail_listing {
                return Err(TransportError::new(
                    "ecs:ListContainerInstances",
                    "cluster not found",
                ));
            }
            Ok(self.members.clone())
        }

        async fn describe_container_instance(
            &self,
            _cluster: &str,
            container_instance_id: &str,
        ) -> Result<Vec<ContainerInstanceDescription>, TransportError> {
            self.described
                .lock()
                .expect("poisoned mutex")
                .push(container_instance_id.to_string());
            if self.fail_describe_for.as_deref() == Some(container_instance_id) {
                return Err(TransportError::new(
                    "ecs:DescribeContainerInstances",
                    "throttled",
                ));
            }
            Ok(vec![ContainerInstanceDescription {
                container_instance_id: container_instance_id.to_string(),
                ec2_instance_id: self.ec2_by_member.get(container_instance_id).cloned(),
            }])
        }

        async fn set_draining(
            &self,
            _cluster: &str,
            container_instance_id: &str,
        ) -> Result<(), TransportError> {
            if self.fail_set_draining {
                return Err(TransportError::new(
                    "ecs:UpdateContainerInstancesState",
                    "access denied",
                ));
            }
            self.drained
                .lock()
                .expect("poisoned mutex")
                .push(container_instance_id.to_string());
            Ok(())
        }

        async fn list_running_tasks(
            &self,
            _cluster: &str,
            _container_instance_id: &str,
        ) -> Result<Vec<String>, TransportError> {
            self.tasks
                .clone()
                .ok_or_else(|| TransportError::new("ecs:ListTasks", "timed out"))
        }
    }

    #[tokio::test]
    async fn resolves_matching_member_and_stops_scanning() {
        let cluster =
            ScriptedCluster::with_members(&[("ci-a", "i-a"), ("ci-b", "i-b"), ("ci-c", "i-c")]);

        let resolved = resolve_container_instance(&cluster, "test-cluster", "i-b")
            .await
            .expect("member should resolve");

        assert_eq!(resolved, "ci-b");
        assert_eq!(cluster.described(), vec!["ci-a", "ci-b"]);
    }

    #[tokio::test]
    async fn exhausted_scan_is_not_found() {
        let cluster = ScriptedCluster::with_members(&[("ci-a", "i-a"), ("ci-b", "i-b")]);

        let error = resolve_container_instance(&cluster, "test-cluster", "i-gone")
            .await
            .expect_err("unknown instance should fail");

        assert!(error.is_not_found());
        assert_eq!(cluster.described().len(), 2);
    }

    #[tokio::test]
    async fn listing_failure_is_transport_error() {
        let cluster = ScriptedCluster {
            fail_listing: true,
            ..ScriptedCluster::default()
        };

        let error = resolve_container_instance(&cluster, "invalid-cluster", "i-a")
            .await
            .expect_err("listing failure should surface");

        assert!(matches!(error, DrainError::Transport(_)));
        assert!(cluster.described().is_empty());
    }

    #[tokio::test]
    async fn describe_failure_ends_the_scan() {
        let mut cluster = ScriptedCluster::with_members(&[("ci-a", "i-a"), ("ci-b", "i-b")]);
        cluster.fail_describe_for = Some("ci-a".to_string());

        let error = resolve_container_instance(&cluster, "test-cluster", "i-b")
            .await
            .expect_err("describe failure should surface");

        assert!(matches!(
            error,
            DrainError::Transport(ref transport)
                if transport.operation == "ecs:DescribeContainerInstances"
        ));
        assert_eq!(cluster.described(), vec!["ci-a"]);
    }

    #[tokio::test]
    async fn task_presence_is_fail_closed() {
        let empty = ScriptedCluster::with_members(&[]);
        assert!(has_no_running_tasks(&empty, "test-cluster", "ci-a").await);

        let mut busy = ScriptedCluster::with_members(&[]);
        busy.tasks = Some(vec!["task-1".to_string()]);
        assert!(!has_no_running_tasks(&busy, "test-cluster", "ci-a").await);

        let mut broken = ScriptedCluster::with_members(&[]);
        broken.tasks = None;
        assert!(!has_no_running_tasks(&broken, "test-cluster", "ci-a").await);
    }

    #[tokio::test]
    async fn start_draining_records_resolved_id() {
        let cluster = Arc::new(ScriptedCluster::with_members(&[("ci-1", "i-1")]));
        let mut drainer = Drainer::new(cluster.clone(), DrainTarget::new("test-cluster", "i-1"));

        drainer
            .start_draining()
            .await
            .expect("draining should start");

        assert_eq!(drainer.target().container_instance_id(), Some("ci-1"));
        assert_eq!(cluster.drained(), vec!["ci-1"]);
    }

    #[tokio::test]
    async fn resolution_happens_once_per_target() {
        let cluster = Arc::new(ScriptedCluster::with_members(&[("ci-1", "i-1")]));
        let mut drainer = Drainer::new(cluster.clone(), DrainTarget::new("test-cluster", "i-1"));

        drainer.start_draining().await.expect("first drain");
        drainer.start_draining().await.expect("second drain");
        assert!(drainer.has_no_running_tasks().await);

        assert_eq!(cluster.listings(), 1);
        assert_eq!(cluster.drained().len(), 2);
    }

    #[tokio::test]
    async fn set_draining_failure_keeps_resolution() {
        let mut scripted = ScriptedCluster::with_members(&[("ci-1", "i-1")]);
        scripted.fail_set_draining = true;
        let mut drainer =
            Drainer::new(Arc::new(scripted), DrainTarget::new("test-cluster", "i-1"));

        let error = drainer
            .start_draining()
            .await
            .expect_err("update failure should surface");

        assert!(matches!(error, DrainError::Transport(_)));
        assert_eq!(drainer.target().container_instance_id(), Some("ci-1"));
    }

    #[tokio::test]
    async fn unresolved_target_reports_tasks_present() {
        let cluster = Arc::new(ScriptedCluster::with_members(&[("ci-1", "i-1")]));
        let drainer = Drainer::new(cluster, DrainTarget::new("test-cluster", "i-1"));

        assert!(!drainer.has_no_running_tasks().await);
    }
}
