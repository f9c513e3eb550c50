//! Shared drain-orchestration domain primitives.
//!
//! This crate owns deterministic behavior (event decoding, tick resolution,
//! configuration defaults) and the error taxonomy. It intentionally excludes
//! AWS SDK and Tokio runtime concerns.

pub mod config;
pub mod contract;
pub mod error;
pub mod polling;
