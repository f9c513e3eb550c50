//! AWS-oriented ports, handlers and runtime wiring for instance draining.
//!
//! This crate owns the drain state machine, the event dispatcher and the queue
//! intake loop, all written against the traits in `adapters`. The AWS SDK
//! implementations of those traits live in the `drainer` binary. Domain
//! primitives are reached through the single `runtime` module boundary.

pub mod adapters;
pub mod handlers;
pub mod logging;
pub mod runtime;
