pub use drainer_core::{config, contract, error, polling};
