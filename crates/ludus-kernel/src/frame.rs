//! Turn-numbered snapshots of full game state.

use serde::{Deserialize, Serialize};

use crate::identity::Turn;

/// State of one participant at a given turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantState {
    pub id: String,
    pub name: String,
    pub alive: bool,
    /// Rules-specific state (body, health, score, ...).
    #[serde(default)]
    pub state: serde_json::Value,
}

/// Immutable snapshot of a game at one turn. Frames of a game form a
/// gap-free sequence starting at turn 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub turn: Turn,
    pub participants: Vec<ParticipantState>,
    /// Rules-specific environment state (food, hazards, ...).
    #[serde(default)]
    pub environment: serde_json::Value,
}

impl Frame {
    pub fn alive_count(&self) -> usize {
        self.participants.iter().filter(|p| p.alive).count()
    }
}
