use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const LIFECYCLE_ACTION_CONTINUE: &str = "CONTINUE";
pub const TERMINATING_TRANSITION: &str = "autoscaling:EC2_INSTANCE_TERMINATING";

/// Opaque queue receipt used to remove a delivered event. Never interpreted.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct AcknowledgmentHandle(String);

impl AcknowledgmentHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AcknowledgmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Receipt handles are long and carry no diagnostic value.
        write!(f, "AcknowledgmentHandle({} bytes)", self.0.len())
    }
}

/// One ASG lifecycle notification, as delivered on the lifecycle queue.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TerminationEvent {
    #[serde(rename = "AccountId")]
    pub account_id: String,
    #[serde(rename = "RequestId")]
    pub request_id: String,
    #[serde(rename = "AutoScalingGroupName")]
    pub auto_scaling_group_name: String,
    #[serde(rename = "LifecycleTransition")]
    pub lifecycle_transition: String,
    #[serde(rename = "LifecycleHookName")]
    pub lifecycle_hook_name: String,
    #[serde(rename = "EC2InstanceId")]
    pub ec2_instance_id: String,
    #[serde(rename = "LifecycleActionToken")]
    pub lifecycle_action_token: String,
    #[serde(rename = "Time")]
    pub time: Option<String>,
    #[serde(skip)]
    pub acknowledgment_handle: AcknowledgmentHandle,
}

impl TerminationEvent {
    /// Decodes a queue message body.
    ///
    /// A body that is not a JSON object of the expected shape yields an
    /// all-default event that still carries its handle, so it can be discarded
    /// downstream instead of failing the intake.
    pub fn decode(body: &str, handle: AcknowledgmentHandle) -> (Self, Option<serde_json::Error>) {
        let (mut event, error) = match serde_json::from_str::<TerminationEvent>(body) {
            Ok(event) => (event, None),
            Err(error) => (TerminationEvent::default(), Some(error)),
        };
        event.acknowledgment_handle = handle;
        (event, error)
    }

    pub fn has_instance(&self) -> bool {
        !self.ec2_instance_id.trim().is_empty()
    }

    pub fn notified_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.time.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|value| value.with_timezone(&Utc))
    }

    pub fn completion(&self) -> LifecycleActionCompletion {
        LifecycleActionCompletion {
            auto_scaling_group_name: self.auto_scaling_group_name.clone(),
            instance_id: self.ec2_instance_id.clone(),
            lifecycle_action_token: self.lifecycle_action_token.clone(),
            lifecycle_hook_name: self.lifecycle_hook_name.clone(),
            lifecycle_action_result: LIFECYCLE_ACTION_CONTINUE.to_string(),
        }
    }
}

/// Arguments of a CompleteLifecycleAction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleActionCompletion {
    pub auto_scaling_group_name: String,
    pub instance_id: String,
    pub lifecycle_action_token: String,
    pub lifecycle_hook_name: String,
    pub lifecycle_action_result: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrainOutcome {
    /// Tasks drained and the lifecycle hook was finalized.
    Completed,
    /// Deadline passed without finalization.
    TimedOut,
    /// Draining could not begin, or finalization failed.
    Aborted,
}

impl DrainOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DrainOutcome::Completed => "completed",
            DrainOutcome::TimedOut => "timed_out",
            DrainOutcome::Aborted => "aborted",
        }
    }
}

impl fmt::Display for DrainOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub ec2_instance_id: String,
    pub container_instance_id: Option<String>,
    pub outcome: DrainOutcome,
    pub ticks: u32,
}
