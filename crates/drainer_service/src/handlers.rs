pub mod dispatcher;
pub mod drain;
pub mod intake;
pub mod termination;
