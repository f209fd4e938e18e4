//! Ludus: turn-based game orchestration.
//!
//! A controller owns the game records and frame logs and guards every
//! mutation with a rotating lease token. Workers claim games, tick them
//! through a [RulesEngine](kernel::RulesEngine) and append frames under lease.
//! A gateway exposes games over HTTP and mirrors running games to WebSocket
//! observers.
//!
//! This crate re-exports the member crates under one roof:
//!
//! - [kernel]: data model, error taxonomy, rules engine contract
//! - [store]: lease and queue store backends
//! - [controller]: controller service, RPC server and clients
//! - [worker]: game runner and worker pool
//! - [gateway]: public HTTP routes and live tail

pub mod telemetry;

pub use ludus_controller as controller;
pub use ludus_gateway as gateway;
pub use ludus_kernel as kernel;
pub use ludus_store as store;
pub use ludus_worker as worker;

pub use ludus_controller::{Controller, ControllerClient, ControllerServer, HttpControllerClient};
pub use ludus_kernel::{Frame, Game, GameId, GameStatus, LeaseToken, LudusError, RulesEngine};
pub use ludus_store::{GameStore, MemoryGameStore};
pub use ludus_worker::{run_game, Worker, WorkerConfig};
