//! Error taxonomy shared by the store, controller, worker and gateway.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::GameStatus;
use crate::identity::{GameId, Turn};

/// Coarse error category. Survives transport boundaries, so callers match on
/// this rather than on concrete variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    LockConflict,
    InvalidArgument,
    Internal,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::LockConflict => "lock_conflict",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Internal => "internal",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LudusError {
    #[error("game not found: {0}")]
    GameNotFound(GameId),

    #[error("no game available to claim")]
    QueueEmpty,

    #[error("lease conflict on game {0}")]
    LockConflict(GameId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: GameStatus, to: GameStatus },

    #[error("frame out of order: expected turn {expected}, got {got}")]
    FrameOutOfOrder { expected: Turn, got: Turn },

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },
}

impl LudusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LudusError::GameNotFound(_) | LudusError::QueueEmpty => ErrorKind::NotFound,
            LudusError::LockConflict(_) => ErrorKind::LockConflict,
            LudusError::InvalidArgument(_)
            | LudusError::InvalidTransition { .. }
            | LudusError::FrameOutOfOrder { .. } => ErrorKind::InvalidArgument,
            LudusError::Timeout(_) => ErrorKind::Timeout,
            LudusError::Driver(_) => ErrorKind::Internal,
            LudusError::Remote { kind, .. } => *kind,
        }
    }

    pub fn is_lock_conflict(&self) -> bool {
        self.kind() == ErrorKind::LockConflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
