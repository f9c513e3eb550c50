use std::future::Future;

use crate::runtime::error::TransportError;

/// A container instance as returned by a describe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInstanceDescription {
    pub container_instance_id: String,
    pub ec2_instance_id: Option<String>,
}

/// Container-orchestration calls the drain controller depends on.
pub trait OrchestrationApi: Send + Sync + 'static {
    /// All container-instance identifiers registered in the cluster.
    fn list_container_instances(
        &self,
        cluster: &str,
    ) -> impl Future<Output = Result<Vec<String>, TransportError>> + Send;

    fn describe_container_instance(
        &self,
        cluster: &str,
        container_instance_id: &str,
    ) -> impl Future<Output = Result<Vec<ContainerInstanceDescription>, TransportError>> + Send;

    fn set_draining(
        &self,
        cluster: &str,
        container_instance_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Identifiers of tasks currently running on the container instance.
    fn list_running_tasks(
        &self,
        cluster: &str,
        container_instance_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, TransportError>> + Send;
}
