//! Lifecycle queue intake: receive, decode, forward.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::queue::{QueueApi, ReceivedMessage};
use crate::runtime::contract::{AcknowledgmentHandle, TerminationEvent};
use crate::runtime::error::TransportError;

pub const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

pub fn decode_message(message: ReceivedMessage) -> TerminationEvent {
    let (event, error) = TerminationEvent::decode(
        &message.body,
        AcknowledgmentHandle::new(message.receipt_handle),
    );
    if let Some(error) = error {
        warn!(
            component = "intake",
            event = "decode_failed",
            error = %error,
            "Could not decode lifecycle message, forwarding defaults"
        );
    }
    event
}

/// Receives one batch and forwards every message.
///
/// Returns `Ok(None)` when the downstream channel has closed.
pub async fn retrieve_once<Q: QueueApi>(
    queue: &Q,
    events: &mpsc::Sender<TerminationEvent>,
) -> Result<Option<usize>, TransportError> {
    let messages = queue.receive_messages().await?;
    let received = messages.len();

    for message in messages {
        let event = decode_message(message);
        debug!(
            component = "intake",
            event = "received",
            ec2_instance_id = %event.ec2_instance_id,
            lifecycle_transition = %event.lifecycle_transition,
            "Received lifecycle message"
        );
        if events.send(event).await.is_err() {
            return Ok(None);
        }
    }

    Ok(Some(received))
}

/// Long-polls the queue until `shutdown` fires or the dispatcher goes away.
///
/// A batch interrupted by shutdown is not deleted, so the queue redelivers it
/// after its visibility timeout.
pub async fn run_intake<Q: QueueApi>(
    queue: &Q,
    events: mpsc::Sender<TerminationEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = retrieve_once(queue, &events) => result,
        };

        match result {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!(
                    component = "intake",
                    event = "channel_closed",
                    "Dispatcher is gone, stopping intake"
                );
                return;
            }
            Err(error) => {
                warn!(
                    component = "intake",
                    event = "receive_failed",
                    error = %error,
                    retry_in_secs = RECEIVE_RETRY_DELAY.as_secs(),
                    "Could not receive lifecycle messages"
                );
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                }
            }
        }
    }

    info!(component = "intake", event = "shutdown", "Stopped receiving");
}
