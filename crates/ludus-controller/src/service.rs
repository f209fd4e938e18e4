//! Controller orchestration over a [GameStore] and a [RulesEngine].

use std::sync::Arc;

use ludus_kernel::{
    CreateSpec, GameId, GameStatus, LeaseToken, LudusError, RulesEngine, RulesError,
};
use ludus_store::GameStore;

use crate::wire::{
    AddGameFrameRequest, AddGameFrameResponse, CreateResponse, ListGameFramesRequest,
    ListGameFramesResponse, PingResponse, PopResponse, StatusResponse,
};

/// Upper bound (and default) for frames returned by one list call.
pub const MAX_FRAMES_PER_PAGE: u32 = 100;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Stateless request handling; all state lives in the store.
pub struct Controller {
    store: Arc<dyn GameStore>,
    rules: Arc<dyn RulesEngine>,
}

impl Controller {
    pub fn new(store: Arc<dyn GameStore>, rules: Arc<dyn RulesEngine>) -> Self {
        Self { store, rules }
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Claim an unlocked, unfinished game.
    ///
    /// A lost lock race surfaces as a lock conflict; the game stays eligible
    /// and the caller polls again.
    pub async fn pop(&self) -> Result<PopResponse, LudusError> {
        let id = self.store.pop_game_id().await?;
        let token = match self.store.lock(&id, None).await {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(game = %id, error = %e, "lost claim race");
                return Err(e);
            }
        };
        tracing::info!(game = %id, "game claimed");
        Ok(PopResponse { id, token })
    }

    /// Game record joined with its latest frame.
    pub async fn status(&self, id: &GameId) -> Result<StatusResponse, LudusError> {
        let game = self.store.get_game(id).await?;
        let last_frame = self.store.list_game_frames(id, 1, -1).await?.pop();
        Ok(StatusResponse { game, last_frame })
    }

    /// Mark a game running so workers pick it up. Repeating it is harmless.
    pub async fn start(&self, id: &GameId) -> Result<(), LudusError> {
        match self.store.set_game_status(id, GameStatus::Running).await {
            Ok(()) => {
                tracing::info!(game = %id, "game started");
                Ok(())
            }
            Err(LudusError::InvalidTransition {
                from: GameStatus::Running,
                ..
            }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn create(&self, spec: &CreateSpec) -> Result<CreateResponse, LudusError> {
        let (game, frames) = self
            .rules
            .create_initial_game(spec)
            .map_err(|e| match e {
                RulesError::Validation(reason) => LudusError::InvalidArgument(reason),
                other => LudusError::InvalidArgument(other.to_string()),
            })?;
        let id = game.id.clone();
        self.store.create_game(game, frames).await?;
        tracing::info!(game = %id, mode = %spec.mode, "game created");
        Ok(CreateResponse { id })
    }

    /// Append a frame under lease.
    ///
    /// The lease is re-validated and rotated before the append, so a worker
    /// whose lease was taken over cannot write to the log.
    pub async fn add_game_frame(
        &self,
        token: &LeaseToken,
        req: AddGameFrameRequest,
    ) -> Result<AddGameFrameResponse, LudusError> {
        let Some(frame) = req.frame else {
            return Err(LudusError::InvalidArgument(
                "controller: game frame must not be nil".into(),
            ));
        };

        let token = self.store.lock(&req.id, Some(token)).await?;
        let turn = frame.turn;
        self.store.push_game_frame(&req.id, frame).await?;
        let game = self.store.get_game(&req.id).await?;
        tracing::debug!(game = %req.id, turn, "frame appended");
        Ok(AddGameFrameResponse { game, token })
    }

    pub async fn list_game_frames(
        &self,
        req: &ListGameFramesRequest,
    ) -> Result<ListGameFramesResponse, LudusError> {
        let limit = clamp_limit(req.limit);
        let frames = self
            .store
            .list_game_frames(&req.id, limit as usize, req.offset)
            .await?;
        let count = u32::try_from(frames.len()).unwrap_or(u32::MAX);
        Ok(ListGameFramesResponse { frames, count })
    }

    /// Complete a game and release its lease, in that order, so the game is
    /// never claimable while still unfinished.
    pub async fn end_game(&self, id: &GameId, token: &LeaseToken) -> Result<(), LudusError> {
        let token = self.store.lock(id, Some(token)).await?;
        self.store.set_game_status(id, GameStatus::Complete).await?;
        self.store.unlock(id, &token).await?;
        tracing::info!(game = %id, "game ended");
        Ok(())
    }

    pub fn ping(&self) -> PingResponse {
        PingResponse {
            version: VERSION.to_string(),
        }
    }
}

fn clamp_limit(limit: u32) -> u32 {
    if limit == 0 || limit >= MAX_FRAMES_PER_PAGE {
        MAX_FRAMES_PER_PAGE
    } else {
        limit
    }
}
