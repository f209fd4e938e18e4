//! Contract for the game-rule computation the coordination layer drives.
//!
//! The rules themselves (movement, collisions, scoring) are out of this
//! workspace's hands; the controller and workers only need to build an
//! initial game, advance it one frame at a time and ask whether it is over.

use async_trait::async_trait;

use crate::frame::Frame;
use crate::game::{CreateSpec, Game};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RulesError {
    /// The create request cannot produce a game.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A tick failed and the game cannot continue.
    #[error("simulation failed at turn {turn}: {reason}")]
    Simulation { turn: u32, reason: String },
}

#[async_trait]
pub trait RulesEngine: Send + Sync {
    /// Build a game (status `Created`) and its seed frames.
    fn create_initial_game(&self, spec: &CreateSpec) -> Result<(Game, Vec<Frame>), RulesError>;

    /// Compute the frame following `last`. `None` means no frame exists yet.
    async fn tick(&self, game: &Game, last: Option<&Frame>) -> Result<Frame, RulesError>;

    fn check_game_over(&self, mode: &str, frame: &Frame) -> bool;

    /// Called once when a worker picks up a game sitting at turn 0.
    async fn notify_start(&self, game: &Game, frame: &Frame);

    /// Called once after the final frame has been persisted.
    async fn notify_end(&self, game: &Game, frame: &Frame);
}
