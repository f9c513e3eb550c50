use std::future::Future;

use crate::runtime::contract::AcknowledgmentHandle;
use crate::runtime::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub body: String,
    pub receipt_handle: String,
}

/// Long-polling receive side of the lifecycle queue.
pub trait QueueApi: Send + Sync + 'static {
    fn receive_messages(
        &self,
    ) -> impl Future<Output = Result<Vec<ReceivedMessage>, TransportError>> + Send;
}

/// Removes a handled event from the lifecycle queue so it is not redelivered.
pub trait CleanupApi: Send + Sync + 'static {
    fn acknowledge(
        &self,
        handle: &AcknowledgmentHandle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
