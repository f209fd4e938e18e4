use std::time::Duration;

/// Worker tuning knobs.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Pause between claim attempts when no game is available.
    pub poll_interval: Duration,
    /// Games run concurrently by one worker.
    pub max_concurrent_games: usize,
    /// Deadline attached to each controller call.
    pub rpc_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_concurrent_games: 16,
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            tracing::warn!(variable = name, value = %raw, "ignoring invalid value");
            None
        }
    }
}

impl WorkerConfig {
    /// Reads `LUDUS_WORKER_POLL_MS`, `LUDUS_WORKER_CONCURRENCY` and
    /// `LUDUS_WORKER_RPC_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_u64("LUDUS_WORKER_POLL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("LUDUS_WORKER_CONCURRENCY") {
            config.max_concurrent_games = usize::try_from(n).unwrap_or(usize::MAX);
        }
        if let Some(ms) = env_u64("LUDUS_WORKER_RPC_TIMEOUT_MS") {
            config.rpc_timeout = Duration::from_millis(ms);
        }
        config
    }
}
