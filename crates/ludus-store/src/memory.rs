//! In-memory game store.
//!
//! Each game sits behind its own mutex, so operations on one id are serialized
//! while different ids proceed independently. The outer map lock is only held
//! to look entries up or insert new ones. Unfinished games are also indexed by
//! insertion order so claiming never visits completed games. Lease expiry uses
//! the tokio clock, which tests can pause and advance.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ludus_kernel::{Frame, Game, GameId, GameStatus, LeaseToken, LudusError};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::lease::{HeldLease, LeaseConfig};
use crate::store::{check_transition, frame_window, validate_seed_frames, GameStore};

struct Lease {
    token: LeaseToken,
    expires_at: Instant,
}

struct GameEntry {
    /// Insertion order; older games are offered first.
    seq: u64,
    game: Game,
    frames: Vec<Frame>,
    lease: Option<Lease>,
}

impl GameEntry {
    fn held_lease(&self, now: Instant) -> HeldLease<'_> {
        match &self.lease {
            None => HeldLease::Vacant,
            Some(lease) if lease.expires_at > now => HeldLease::Live(&lease.token),
            Some(lease) => HeldLease::Expired(&lease.token),
        }
    }
}

pub struct MemoryGameStore {
    config: LeaseConfig,
    games: RwLock<HashMap<GameId, Arc<Mutex<GameEntry>>>>,
    /// Games not yet Complete, keyed by insertion order.
    open: RwLock<BTreeMap<u64, GameId>>,
    next_seq: AtomicU64,
}

impl MemoryGameStore {
    pub fn new(config: LeaseConfig) -> Self {
        Self {
            config,
            games: RwLock::new(HashMap::new()),
            open: RwLock::new(BTreeMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    async fn entry(&self, id: &GameId) -> Result<Arc<Mutex<GameEntry>>, LudusError> {
        self.games
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| LudusError::GameNotFound(id.clone()))
    }
}

impl Default for MemoryGameStore {
    fn default() -> Self {
        Self::new(LeaseConfig::default())
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn pop_game_id(&self) -> Result<GameId, LudusError> {
        let candidates: Vec<GameId> = self.open.read().await.values().cloned().collect();
        let entries: Vec<Arc<Mutex<GameEntry>>> = {
            let games = self.games.read().await;
            candidates.iter().filter_map(|id| games.get(id).cloned()).collect()
        };

        let now = Instant::now();
        for entry in entries {
            let entry = entry.lock().await;
            if entry.game.status != GameStatus::Complete && !entry.held_lease(now).is_live() {
                return Ok(entry.game.id.clone());
            }
        }
        Err(LudusError::QueueEmpty)
    }

    async fn lock(
        &self,
        id: &GameId,
        previous: Option<&LeaseToken>,
    ) -> Result<LeaseToken, LudusError> {
        let entry = self.entry(id).await?;
        let mut entry = entry.lock().await;
        let now = Instant::now();
        if !entry.held_lease(now).admits(previous) {
            return Err(LudusError::LockConflict(id.clone()));
        }
        let token = LeaseToken::generate();
        entry.lease = Some(Lease {
            token: token.clone(),
            expires_at: now + self.config.lease_ttl,
        });
        Ok(token)
    }

    async fn unlock(&self, id: &GameId, token: &LeaseToken) -> Result<(), LudusError> {
        let entry = self.entry(id).await?;
        let mut entry = entry.lock().await;
        match &entry.lease {
            Some(lease) if &lease.token == token => {
                entry.lease = None;
                Ok(())
            }
            _ => Err(LudusError::LockConflict(id.clone())),
        }
    }

    async fn create_game(&self, game: Game, frames: Vec<Frame>) -> Result<(), LudusError> {
        validate_seed_frames(&frames)?;
        let mut games = self.games.write().await;
        if games.contains_key(&game.id) {
            return Err(LudusError::InvalidArgument(format!(
                "game {} already exists",
                game.id
            )));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        if game.status != GameStatus::Complete {
            self.open.write().await.insert(seq, game.id.clone());
        }
        games.insert(
            game.id.clone(),
            Arc::new(Mutex::new(GameEntry {
                seq,
                game,
                frames,
                lease: None,
            })),
        );
        Ok(())
    }

    async fn get_game(&self, id: &GameId) -> Result<Game, LudusError> {
        let entry = self.entry(id).await?;
        let entry = entry.lock().await;
        Ok(entry.game.clone())
    }

    async fn set_game_status(&self, id: &GameId, status: GameStatus) -> Result<(), LudusError> {
        let entry = self.entry(id).await?;
        let seq = {
            let mut entry = entry.lock().await;
            check_transition(entry.game.status, status)?;
            entry.game.status = status;
            entry.seq
        };
        if status == GameStatus::Complete {
            self.open.write().await.remove(&seq);
        }
        Ok(())
    }

    async fn push_game_frame(&self, id: &GameId, frame: Frame) -> Result<(), LudusError> {
        let entry = self.entry(id).await?;
        let mut entry = entry.lock().await;
        let expected = u32::try_from(entry.frames.len())
            .map_err(|_| LudusError::InvalidArgument("frame log is full".into()))?;
        if frame.turn != expected {
            return Err(LudusError::FrameOutOfOrder {
                expected,
                got: frame.turn,
            });
        }
        entry.frames.push(frame);
        Ok(())
    }

    async fn list_game_frames(
        &self,
        id: &GameId,
        limit: usize,
        offset: i64,
    ) -> Result<Vec<Frame>, LudusError> {
        let entry = self.entry(id).await?;
        let entry = entry.lock().await;
        let window = frame_window(entry.frames.len(), limit, offset);
        Ok(entry.frames[window].to_vec())
    }
}
