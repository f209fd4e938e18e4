//! Game records and their status lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::GameId;

/// Lifecycle of a game. Only ever moves forward:
/// `Created -> Running -> Complete`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Created,
    Running,
    Complete,
}

impl GameStatus {
    /// The single status this one may advance to, if any.
    pub fn next(self) -> Option<GameStatus> {
        match self {
            GameStatus::Created => Some(GameStatus::Running),
            GameStatus::Running => Some(GameStatus::Complete),
            GameStatus::Complete => None,
        }
    }

    pub fn can_transition_to(self, to: GameStatus) -> bool {
        self.next() == Some(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Created => "created",
            GameStatus::Running => "running",
            GameStatus::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<GameStatus> {
        match value {
            "created" => Some(GameStatus::Created),
            "running" => Some(GameStatus::Running),
            "complete" => Some(GameStatus::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A game as stored by the coordination layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    /// Rules variant, interpreted only by the rules engine.
    pub mode: String,
    pub width: u32,
    pub height: u32,
    pub participants: Vec<String>,
    pub status: GameStatus,
    pub created_at: DateTime<Utc>,
}

/// One participant in a create request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Request body for creating a new game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateSpec {
    #[serde(default = "default_mode")]
    pub mode: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub participants: Vec<ParticipantSpec>,
}

fn default_mode() -> String {
    "standard".to_string()
}
