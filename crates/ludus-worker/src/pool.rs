use std::future::Future;
use std::sync::Arc;

use ludus_controller::{with_deadline, ControllerClient, PopResponse};
use ludus_kernel::{ErrorKind, RulesEngine};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::runner::run_game;

/// Claims games from the controller and runs them, up to
/// [WorkerConfig::max_concurrent_games] at a time.
pub struct Worker {
    client: Arc<dyn ControllerClient>,
    rules: Arc<dyn RulesEngine>,
    config: WorkerConfig,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(
        client: Arc<dyn ControllerClient>,
        rules: Arc<dyn RulesEngine>,
        config: WorkerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_games.max(1)));
        Self {
            client,
            rules,
            config,
            permits,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Try to claim one game. `None` when the queue is empty or another worker
    /// won the claim.
    pub async fn claim(&self) -> Result<Option<PopResponse>, WorkerError> {
        match with_deadline(self.config.rpc_timeout, "pop", self.client.pop()).await {
            Ok(claim) => Ok(Some(claim)),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::LockConflict) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Claim one game and run it to the end on the current task.
    ///
    /// Returns `false` when there was nothing to claim.
    pub async fn run_once(&self) -> Result<bool, WorkerError> {
        let Some(claim) = self.claim().await? else {
            return Ok(false);
        };
        run_game(
            self.client.as_ref(),
            self.rules.as_ref(),
            claim,
            self.config.rpc_timeout,
        )
        .await?;
        Ok(true)
    }

    /// Poll for games until `shutdown` resolves, then wait for in-flight games.
    ///
    /// Game failures are logged, never propagated; a worker keeps polling
    /// through controller outages.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut games = JoinSet::new();
        tracing::info!(
            concurrency = self.config.max_concurrent_games,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "worker started"
        );

        loop {
            while let Some(joined) = games.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "game task panicked");
                }
            }

            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let claimed = tokio::select! {
                _ = &mut shutdown => break,
                claimed = self.claim() => claimed,
            };

            match claimed {
                Ok(Some(claim)) => {
                    let client = self.client.clone();
                    let rules = self.rules.clone();
                    let rpc_timeout = self.config.rpc_timeout;
                    games.spawn(async move {
                        let id = claim.id.clone();
                        match run_game(client.as_ref(), rules.as_ref(), claim, rpc_timeout).await {
                            Ok(()) => tracing::info!(game = %id, "game finished"),
                            Err(e) => tracing::warn!(game = %id, error = %e, "game run aborted"),
                        }
                        drop(permit);
                    });
                    continue;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "failed to claim game"),
            }

            drop(permit);
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(in_flight = games.len(), "worker stopping");
        while let Some(joined) = games.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "game task panicked");
            }
        }
    }
}
