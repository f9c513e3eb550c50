//! Error taxonomy for drain executions and startup configuration.

use thiserror::Error;

/// A failed call against one of the AWS-facing ports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct TransportError {
    pub operation: &'static str,
    pub message: String,
}

impl TransportError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Why draining could not begin for an instance. None of these are retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DrainError {
    #[error("no container instance in cluster '{cluster}' runs on {ec2_instance_id}")]
    NotFound {
        cluster: String,
        ec2_instance_id: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DrainError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DrainError::NotFound { .. })
    }
}

/// Startup configuration errors. Fatal: the process does not start.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CLUSTER must be configured")]
    MissingCluster,

    #[error("LIFECYCLE_QUEUE must be configured")]
    MissingQueue,

    #[error("DRAINER_MAX_CONCURRENCY must be at least 1")]
    InvalidConcurrency,
}
