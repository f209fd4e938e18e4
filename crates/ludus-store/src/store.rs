//! Storage façade for games, frame logs and leases.

use std::ops::Range;

use async_trait::async_trait;
use ludus_kernel::{Frame, Game, GameId, GameStatus, LeaseToken, LudusError};

/// Game store contract used by the controller.
///
/// Implementations must be linearizable per game id: lock, unlock, append and
/// status operations on one id are totally ordered, and operations on
/// different ids do not contend.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Some game that is not complete and has no live lease.
    ///
    /// Does not claim the game; two callers may see the same id. Only
    /// [GameStore::lock] decides who gets it.
    async fn pop_game_id(&self) -> Result<GameId, LudusError>;

    /// Validate `previous` against the stored lease and rotate it.
    ///
    /// Succeeds when `previous` equals the stored token, or when no token is
    /// presented and the lease is vacant or expired. On success a brand-new
    /// token with a refreshed expiry replaces the stored one and is returned.
    async fn lock(
        &self,
        id: &GameId,
        previous: Option<&LeaseToken>,
    ) -> Result<LeaseToken, LudusError>;

    /// Clear the lease if `token` is the current one.
    async fn unlock(&self, id: &GameId, token: &LeaseToken) -> Result<(), LudusError>;

    /// Persist a new game with its seed frames (turns `0..n`).
    async fn create_game(&self, game: Game, frames: Vec<Frame>) -> Result<(), LudusError>;

    async fn get_game(&self, id: &GameId) -> Result<Game, LudusError>;

    /// Advance the status by exactly one step of `Created -> Running -> Complete`.
    async fn set_game_status(&self, id: &GameId, status: GameStatus) -> Result<(), LudusError>;

    /// Append a frame; its turn must equal the current frame count.
    async fn push_game_frame(&self, id: &GameId, frame: Frame) -> Result<(), LudusError>;

    /// Frames in turn order starting at `offset`. A negative offset counts back
    /// from the end, so `(1, -1)` is the latest frame.
    async fn list_game_frames(
        &self,
        id: &GameId,
        limit: usize,
        offset: i64,
    ) -> Result<Vec<Frame>, LudusError>;
}

/// Index range selected by `limit`/`offset` over a log of `len` frames.
pub fn frame_window(len: usize, limit: usize, offset: i64) -> Range<usize> {
    let start = if offset >= 0 {
        usize::try_from(offset).unwrap_or(usize::MAX).min(len)
    } else {
        let back = usize::try_from(offset.unsigned_abs()).unwrap_or(usize::MAX);
        len.saturating_sub(back)
    };
    let end = start.saturating_add(limit).min(len);
    start..end
}

/// Seed frames must be numbered `0..n` in order.
pub fn validate_seed_frames(frames: &[Frame]) -> Result<(), LudusError> {
    for (index, frame) in frames.iter().enumerate() {
        let expected = u32::try_from(index)
            .map_err(|_| LudusError::InvalidArgument("too many seed frames".into()))?;
        if frame.turn != expected {
            return Err(LudusError::FrameOutOfOrder {
                expected,
                got: frame.turn,
            });
        }
    }
    Ok(())
}

pub(crate) fn check_transition(from: GameStatus, to: GameStatus) -> Result<(), LudusError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(LudusError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_from_positive_offset() {
        assert_eq!(frame_window(10, 3, 0), 0..3);
        assert_eq!(frame_window(10, 3, 8), 8..10);
        assert_eq!(frame_window(10, 3, 12), 10..10);
    }

    #[test]
    fn window_from_negative_offset_counts_back() {
        assert_eq!(frame_window(10, 1, -1), 9..10);
        assert_eq!(frame_window(10, 100, -3), 7..10);
        assert_eq!(frame_window(2, 100, -5), 0..2);
        assert_eq!(frame_window(0, 1, -1), 0..0);
    }

    #[test]
    fn seed_frames_must_start_at_zero() {
        let frame = |turn| Frame {
            turn,
            participants: vec![],
            environment: serde_json::Value::Null,
        };
        assert!(validate_seed_frames(&[]).is_ok());
        assert!(validate_seed_frames(&[frame(0), frame(1)]).is_ok());
        assert!(matches!(
            validate_seed_frames(&[frame(1)]),
            Err(LudusError::FrameOutOfOrder {
                expected: 0,
                got: 1
            })
        ));
    }
}
