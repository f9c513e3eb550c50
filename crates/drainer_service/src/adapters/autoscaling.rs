use std::future::Future;

use crate::runtime::contract::LifecycleActionCompletion;
use crate::runtime::error::TransportError;

pub trait AutoscalingApi: Send + Sync + 'static {
    fn complete_lifecycle_action(
        &self,
        completion: &LifecycleActionCompletion,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
