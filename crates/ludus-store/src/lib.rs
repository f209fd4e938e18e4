//! Storage for games, their frame logs and per-game leases.
//!
//! [GameStore] is the contract; [MemoryGameStore] and (behind the
//! `store-postgres` feature) `PostgresGameStore` implement it. All mutual
//! exclusion between workers is enforced by [GameStore::lock].

pub mod lease;
pub mod memory;
#[cfg(feature = "store-postgres")]
pub mod postgres;
pub mod store;

pub use lease::{HeldLease, LeaseConfig};
pub use memory::MemoryGameStore;
#[cfg(feature = "store-postgres")]
pub use postgres::PostgresGameStore;
pub use store::{frame_window, validate_seed_frames, GameStore};
