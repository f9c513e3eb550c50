pub mod autoscaling;
pub mod orchestration;
pub mod queue;
