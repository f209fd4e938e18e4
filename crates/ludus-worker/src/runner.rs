//! Drives a single game from its last persisted frame to the end.

use std::fmt;
use std::time::Duration;

use ludus_controller::{with_deadline, AddGameFrameRequest, ControllerClient, PopResponse};
use ludus_kernel::RulesEngine;

use crate::error::WorkerError;

/// Phases of one game run, for logging.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunnerState {
    Initializing,
    Ticking,
    EndedNormal,
    EndedFatal,
    EndedLockLost,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunnerState::Initializing => "initializing",
            RunnerState::Ticking => "ticking",
            RunnerState::EndedNormal => "ended_normal",
            RunnerState::EndedFatal => "ended_fatal",
            RunnerState::EndedLockLost => "ended_lock_lost",
        };
        f.write_str(s)
    }
}

/// Run the claimed game until it is over, the rules engine fails, or the lease
/// is lost.
///
/// A failed tick is fatal: the game is ended on a best-effort basis and the
/// tick error is returned. A failed append means another worker now owns the
/// game, so the run stops without ending it.
pub async fn run_game(
    client: &dyn ControllerClient,
    rules: &dyn RulesEngine,
    claim: PopResponse,
    rpc_timeout: Duration,
) -> Result<(), WorkerError> {
    let PopResponse { id, mut token } = claim;
    tracing::debug!(game = %id, state = %RunnerState::Initializing, "runner starting");

    let status = with_deadline(rpc_timeout, "status", client.status(&id)).await?;
    let game = status.game;
    let mut last_frame = status.last_frame;

    if let Some(frame) = last_frame.as_ref().filter(|f| f.turn == 0) {
        rules.notify_start(&game, frame).await;
    }

    loop {
        let next = match rules.tick(&game, last_frame.as_ref()).await {
            Ok(frame) => frame,
            Err(tick_err) => {
                tracing::error!(
                    game = %id,
                    error = %tick_err,
                    state = %RunnerState::EndedFatal,
                    "ending game due to fatal error"
                );
                let ended =
                    with_deadline(rpc_timeout, "end_game", client.end_game(&id, &token)).await;
                if let Err(end_err) = ended {
                    tracing::error!(
                        game = %id,
                        error = %end_err,
                        "failed to end game after fatal error"
                    );
                }
                return Err(WorkerError::Tick(tick_err));
            }
        };

        tracing::info!(
            game = %id,
            turn = next.turn,
            state = %RunnerState::Ticking,
            "adding game frame"
        );
        let added = with_deadline(
            rpc_timeout,
            "add_game_frame",
            client.add_game_frame(
                &token,
                AddGameFrameRequest {
                    id: id.clone(),
                    frame: Some(next.clone()),
                },
            ),
        )
        .await;
        match added {
            Ok(resp) => token = resp.token,
            Err(e) => {
                tracing::warn!(
                    game = %id,
                    turn = next.turn,
                    error = %e,
                    state = %RunnerState::EndedLockLost,
                    "stopping without ending game"
                );
                return Err(WorkerError::Controller(e));
            }
        }

        if rules.check_game_over(&game.mode, &next) {
            tracing::info!(
                game = %id,
                turn = next.turn,
                state = %RunnerState::EndedNormal,
                "ending game"
            );
            rules.notify_end(&game, &next).await;
            with_deadline(rpc_timeout, "end_game", client.end_game(&id, &token)).await?;
            return Ok(());
        }

        last_frame = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ludus_kernel::testing::ScriptedRules;
    use ludus_kernel::{ErrorKind, GameStatus, RulesError};
    use ludus_store::GameStore;

    use super::*;
    use crate::test_support::{create_running_game, Harness, TTL};

    const RPC: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn solo_game_appends_once_and_ends() {
        let rules = Arc::new(ScriptedRules::new());
        let h = Harness::new(rules.clone());
        let id = create_running_game(&h.controller, "solo", 1).await;

        let claim = h.controller.pop().await.unwrap();
        run_game(&h.client, rules.as_ref(), claim, RPC).await.unwrap();

        assert_eq!(h.client.add_calls(), 1);
        assert_eq!(h.client.end_calls(), 1);
        assert_eq!(rules.start_notifications(), 1);
        assert_eq!(rules.end_notifications(), 1);
        let status = h.controller.status(&id).await.unwrap();
        assert_eq!(status.game.status, GameStatus::Complete);
        assert_eq!(status.last_frame.map(|f| f.turn), Some(1));
    }

    #[tokio::test]
    async fn frames_are_appended_in_turn_order() {
        let rules = Arc::new(ScriptedRules::new().eliminate_at(4, 0));
        let h = Harness::new(rules.clone());
        let id = create_running_game(&h.controller, "standard", 2).await;

        let claim = h.controller.pop().await.unwrap();
        run_game(&h.client, rules.as_ref(), claim, RPC).await.unwrap();

        assert_eq!(h.client.add_calls(), 4);
        assert_eq!(h.client.end_calls(), 1);
        let frames = h
            .controller
            .list_game_frames(&ludus_controller::ListGameFramesRequest::new(id))
            .await
            .unwrap();
        let turns: Vec<u32> = frames.frames.iter().map(|f| f.turn).collect();
        assert_eq!(turns, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn fatal_tick_ends_game_and_returns_tick_error() {
        let rules = Arc::new(ScriptedRules::new().fail_tick_at(1));
        let h = Harness::new(rules.clone());
        let id = create_running_game(&h.controller, "standard", 2).await;

        let claim = h.controller.pop().await.unwrap();
        let err = run_game(&h.client, rules.as_ref(), claim, RPC)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WorkerError::Tick(RulesError::Simulation { turn: 1, .. })
        ));
        assert_eq!(h.client.add_calls(), 0);
        assert_eq!(h.client.end_calls(), 1);
        assert_eq!(rules.end_notifications(), 0);
        let status = h.controller.status(&id).await.unwrap();
        assert_eq!(status.game.status, GameStatus::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_lease_stops_without_ending() {
        let rules = Arc::new(ScriptedRules::new());
        let h = Harness::new(rules.clone());
        let id = create_running_game(&h.controller, "standard", 2).await;

        let a = h.controller.pop().await.unwrap();
        tokio::time::advance(TTL * 2).await;
        let b_token = h.store.lock(&id, None).await.unwrap();

        let err = run_game(&h.client, rules.as_ref(), a, RPC)
            .await
            .unwrap_err();
        let controller_err = err.as_controller().expect("controller error");
        assert_eq!(controller_err.kind(), ErrorKind::LockConflict);
        assert_eq!(h.client.add_calls(), 1);
        assert_eq!(h.client.end_calls(), 0);

        let status = h.controller.status(&id).await.unwrap();
        assert_eq!(status.game.status, GameStatus::Running);
        assert_eq!(status.last_frame.map(|f| f.turn), Some(0));
        h.controller.end_game(&id, &b_token).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_tick_after_takeover_leaves_game_running() {
        let rules = Arc::new(ScriptedRules::new().fail_tick_at(1));
        let h = Harness::new(rules.clone());
        let id = create_running_game(&h.controller, "standard", 2).await;

        let a = h.controller.pop().await.unwrap();
        tokio::time::advance(TTL * 2).await;
        h.store.lock(&id, None).await.unwrap();

        let err = run_game(&h.client, rules.as_ref(), a, RPC)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Tick(_)));
        assert_eq!(h.client.end_calls(), 1);
        let status = h.controller.status(&id).await.unwrap();
        assert_eq!(status.game.status, GameStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_but_untouched_lease_is_still_renewable() {
        let rules = Arc::new(ScriptedRules::new());
        let h = Harness::new(rules.clone());
        let id = create_running_game(&h.controller, "solo", 1).await;

        let claim = h.controller.pop().await.unwrap();
        tokio::time::advance(TTL * 2).await;
        run_game(&h.client, rules.as_ref(), claim, RPC).await.unwrap();

        let status = h.controller.status(&id).await.unwrap();
        assert_eq!(status.game.status, GameStatus::Complete);
    }
}
