//! Shared model for the Ludus game coordination services.
//!
//! Games, turn-numbered frames and lease tokens live here together with the
//! error taxonomy every other crate speaks and the [RulesEngine] contract the
//! workers drive. Nothing in this crate performs I/O.

pub mod error;
pub mod frame;
pub mod game;
pub mod identity;
pub mod rules;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ErrorKind, LudusError};
pub use frame::{Frame, ParticipantState};
pub use game::{CreateSpec, Game, GameStatus, ParticipantSpec};
pub use identity::{GameId, LeaseToken, Turn};
pub use rules::{RulesEngine, RulesError};
