//! Workers for Ludus.
//!
//! [run_game] drives one claimed game to completion: tick, append under
//! lease, repeat until the rules engine declares the game over. [Worker] keeps
//! claiming games from the controller and runs each one on its own task.

mod config;
mod error;
mod pool;
mod runner;

#[cfg(test)]
mod test_support;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use pool::Worker;
pub use runner::{run_game, RunnerState};
