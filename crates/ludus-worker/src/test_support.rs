use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ludus_controller::{
    AddGameFrameRequest, AddGameFrameResponse, Controller, ControllerClient, CreateResponse,
    ListGameFramesRequest, ListGameFramesResponse, PingResponse, PopResponse, StatusResponse,
};
use ludus_kernel::{
    CreateSpec, Frame, Game, GameId, GameStatus, LeaseToken, LudusError, ParticipantSpec,
    RulesEngine,
};
use ludus_store::{GameStore, LeaseConfig, MemoryGameStore};

pub const TTL: Duration = Duration::from_secs(5);

/// In-process client that counts the lease-guarded calls it forwards.
#[derive(Clone)]
pub struct CountingClient {
    inner: Arc<Controller>,
    adds: Arc<AtomicUsize>,
    ends: Arc<AtomicUsize>,
}

impl CountingClient {
    pub fn add_calls(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn end_calls(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControllerClient for CountingClient {
    async fn pop(&self) -> Result<PopResponse, LudusError> {
        self.inner.pop().await
    }

    async fn status(&self, id: &GameId) -> Result<StatusResponse, LudusError> {
        self.inner.status(id).await
    }

    async fn start(&self, id: &GameId) -> Result<(), LudusError> {
        self.inner.start(id).await
    }

    async fn create(&self, spec: &CreateSpec) -> Result<CreateResponse, LudusError> {
        self.inner.create(spec).await
    }

    async fn add_game_frame(
        &self,
        token: &LeaseToken,
        req: AddGameFrameRequest,
    ) -> Result<AddGameFrameResponse, LudusError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.inner.add_game_frame(token, req).await
    }

    async fn list_game_frames(
        &self,
        req: &ListGameFramesRequest,
    ) -> Result<ListGameFramesResponse, LudusError> {
        self.inner.list_game_frames(req).await
    }

    async fn end_game(&self, id: &GameId, token: &LeaseToken) -> Result<(), LudusError> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        self.inner.end_game(id, token).await
    }

    async fn ping(&self) -> Result<PingResponse, LudusError> {
        Ok(self.inner.ping())
    }
}

pub struct Harness {
    pub store: Arc<dyn GameStore>,
    pub controller: Arc<Controller>,
    pub client: CountingClient,
}

impl Harness {
    pub fn new(rules: Arc<dyn RulesEngine>) -> Self {
        Self::with_store(
            Arc::new(MemoryGameStore::new(LeaseConfig::with_ttl(TTL))),
            rules,
        )
    }

    pub fn with_store(store: Arc<dyn GameStore>, rules: Arc<dyn RulesEngine>) -> Self {
        let controller = Arc::new(Controller::new(store.clone(), rules));
        let client = CountingClient {
            inner: controller.clone(),
            adds: Arc::default(),
            ends: Arc::default(),
        };
        Self {
            store,
            controller,
            client,
        }
    }
}

/// Store where some other worker always wins the claim: fresh claims are
/// refused even though the game stays eligible.
pub struct ContestedStore {
    inner: MemoryGameStore,
}

impl Default for ContestedStore {
    fn default() -> Self {
        Self {
            inner: MemoryGameStore::new(LeaseConfig::with_ttl(TTL)),
        }
    }
}

#[async_trait]
impl GameStore for ContestedStore {
    async fn pop_game_id(&self) -> Result<GameId, LudusError> {
        self.inner.pop_game_id().await
    }

    async fn lock(
        &self,
        id: &GameId,
        previous: Option<&LeaseToken>,
    ) -> Result<LeaseToken, LudusError> {
        match previous {
            None => Err(LudusError::LockConflict(id.clone())),
            Some(_) => self.inner.lock(id, previous).await,
        }
    }

    async fn unlock(&self, id: &GameId, token: &LeaseToken) -> Result<(), LudusError> {
        self.inner.unlock(id, token).await
    }

    async fn create_game(&self, game: Game, frames: Vec<Frame>) -> Result<(), LudusError> {
        self.inner.create_game(game, frames).await
    }

    async fn get_game(&self, id: &GameId) -> Result<Game, LudusError> {
        self.inner.get_game(id).await
    }

    async fn set_game_status(&self, id: &GameId, status: GameStatus) -> Result<(), LudusError> {
        self.inner.set_game_status(id, status).await
    }

    async fn push_game_frame(&self, id: &GameId, frame: Frame) -> Result<(), LudusError> {
        self.inner.push_game_frame(id, frame).await
    }

    async fn list_game_frames(
        &self,
        id: &GameId,
        limit: usize,
        offset: i64,
    ) -> Result<Vec<Frame>, LudusError> {
        self.inner.list_game_frames(id, limit, offset).await
    }
}

pub async fn create_running_game(controller: &Controller, mode: &str, players: usize) -> GameId {
    let spec = CreateSpec {
        mode: mode.to_string(),
        width: 11,
        height: 11,
        participants: (0..players)
            .map(|i| ParticipantSpec {
                name: format!("p{i}"),
                url: None,
            })
            .collect(),
    };
    let id = controller.create(&spec).await.unwrap().id;
    controller.start(&id).await.unwrap();
    id
}
