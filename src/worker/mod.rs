//! Worker: the claim / execute / retry state machine, plus a polling pool.

mod machine;
pub mod runner;

pub use machine::{RunOutcome, UnroutablePolicy, Worker};
pub use runner::{Runner, RunnerConfig};
