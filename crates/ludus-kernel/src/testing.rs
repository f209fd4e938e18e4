//! Deterministic rules engine for tests and local demos.
//!
//! [ScriptedRules] seeds a turn-0 frame with every participant alive, then on
//! each tick applies whatever eliminations were scheduled for the new turn.
//! A game is over once at most one participant is alive. Ticks can be made to
//! fail on a chosen turn.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::frame::{Frame, ParticipantState};
use crate::game::{CreateSpec, Game, GameStatus};
use crate::identity::{GameId, Turn};
use crate::rules::{RulesEngine, RulesError};

#[derive(Default)]
pub struct ScriptedRules {
    eliminations: HashMap<Turn, Vec<usize>>,
    fail_at: Option<Turn>,
    tick_delay: Option<std::time::Duration>,
    starts: AtomicUsize,
    ends: AtomicUsize,
    ticks: AtomicUsize,
    ended_games: Mutex<Vec<GameId>>,
}

impl ScriptedRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Eliminate participant `index` when turn `turn` is computed.
    pub fn eliminate_at(mut self, turn: Turn, index: usize) -> Self {
        self.eliminations.entry(turn).or_default().push(index);
        self
    }

    /// Fail the tick that would produce `turn`.
    pub fn fail_tick_at(mut self, turn: Turn) -> Self {
        self.fail_at = Some(turn);
        self
    }

    /// Sleep inside every tick; lets tests observe a game mid-run.
    pub fn with_tick_delay(mut self, delay: std::time::Duration) -> Self {
        self.tick_delay = Some(delay);
        self
    }

    pub fn start_notifications(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn end_notifications(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }

    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn ended_games(&self) -> Vec<GameId> {
        match self.ended_games.lock() {
            Ok(games) => games.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl RulesEngine for ScriptedRules {
    fn create_initial_game(&self, spec: &CreateSpec) -> Result<(Game, Vec<Frame>), RulesError> {
        if spec.width == 0 || spec.height == 0 {
            return Err(RulesError::Validation(
                "board dimensions must be positive".into(),
            ));
        }
        if spec.participants.is_empty() {
            return Err(RulesError::Validation(
                "at least one participant is required".into(),
            ));
        }

        let participants: Vec<ParticipantState> = spec
            .participants
            .iter()
            .enumerate()
            .map(|(i, p)| ParticipantState {
                id: format!("p{i}"),
                name: p.name.clone(),
                alive: true,
                state: serde_json::json!({ "url": p.url }),
            })
            .collect();

        let game = Game {
            id: GameId::generate(),
            mode: spec.mode.clone(),
            width: spec.width,
            height: spec.height,
            participants: participants.iter().map(|p| p.id.clone()).collect(),
            status: GameStatus::Created,
            created_at: Utc::now(),
        };
        let seed = Frame {
            turn: 0,
            participants,
            environment: serde_json::Value::Null,
        };
        Ok((game, vec![seed]))
    }

    async fn tick(&self, game: &Game, last: Option<&Frame>) -> Result<Frame, RulesError> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.tick_delay {
            tokio::time::sleep(delay).await;
        }

        let (turn, mut participants) = match last {
            Some(frame) => (frame.turn + 1, frame.participants.clone()),
            None => (
                0,
                game.participants
                    .iter()
                    .map(|id| ParticipantState {
                        id: id.clone(),
                        name: id.clone(),
                        alive: true,
                        state: serde_json::Value::Null,
                    })
                    .collect(),
            ),
        };

        if self.fail_at == Some(turn) {
            return Err(RulesError::Simulation {
                turn,
                reason: "scripted failure".into(),
            });
        }

        if let Some(indices) = self.eliminations.get(&turn) {
            for &index in indices {
                if let Some(p) = participants.get_mut(index) {
                    p.alive = false;
                }
            }
        }

        Ok(Frame {
            turn,
            participants,
            environment: serde_json::Value::Null,
        })
    }

    fn check_game_over(&self, _mode: &str, frame: &Frame) -> bool {
        frame.alive_count() <= 1
    }

    async fn notify_start(&self, _game: &Game, _frame: &Frame) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    async fn notify_end(&self, game: &Game, _frame: &Frame) {
        self.ends.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut games) = self.ended_games.lock() {
            games.push(game.id.clone());
        }
    }
}
