//! Caller-side view of the controller.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ludus_kernel::{CreateSpec, GameId, LeaseToken, LudusError};

use crate::service::Controller;
use crate::wire::{
    AddGameFrameRequest, AddGameFrameResponse, CreateResponse, ListGameFramesRequest,
    ListGameFramesResponse, PingResponse, PopResponse, StatusResponse,
};

/// The controller RPC surface as seen by workers and the gateway.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    async fn pop(&self) -> Result<PopResponse, LudusError>;

    async fn status(&self, id: &GameId) -> Result<StatusResponse, LudusError>;

    async fn start(&self, id: &GameId) -> Result<(), LudusError>;

    async fn create(&self, spec: &CreateSpec) -> Result<CreateResponse, LudusError>;

    async fn add_game_frame(
        &self,
        token: &LeaseToken,
        req: AddGameFrameRequest,
    ) -> Result<AddGameFrameResponse, LudusError>;

    async fn list_game_frames(
        &self,
        req: &ListGameFramesRequest,
    ) -> Result<ListGameFramesResponse, LudusError>;

    async fn end_game(&self, id: &GameId, token: &LeaseToken) -> Result<(), LudusError>;

    async fn ping(&self) -> Result<PingResponse, LudusError>;
}

#[async_trait]
impl ControllerClient for Controller {
    async fn pop(&self) -> Result<PopResponse, LudusError> {
        Controller::pop(self).await
    }

    async fn status(&self, id: &GameId) -> Result<StatusResponse, LudusError> {
        Controller::status(self, id).await
    }

    async fn start(&self, id: &GameId) -> Result<(), LudusError> {
        Controller::start(self, id).await
    }

    async fn create(&self, spec: &CreateSpec) -> Result<CreateResponse, LudusError> {
        Controller::create(self, spec).await
    }

    async fn add_game_frame(
        &self,
        token: &LeaseToken,
        req: AddGameFrameRequest,
    ) -> Result<AddGameFrameResponse, LudusError> {
        Controller::add_game_frame(self, token, req).await
    }

    async fn list_game_frames(
        &self,
        req: &ListGameFramesRequest,
    ) -> Result<ListGameFramesResponse, LudusError> {
        Controller::list_game_frames(self, req).await
    }

    async fn end_game(&self, id: &GameId, token: &LeaseToken) -> Result<(), LudusError> {
        Controller::end_game(self, id, token).await
    }

    async fn ping(&self) -> Result<PingResponse, LudusError> {
        Ok(Controller::ping(self))
    }
}

/// Run `call` under a deadline; expiry becomes a [LudusError::Timeout].
pub async fn with_deadline<T, F>(deadline: Duration, op: &str, call: F) -> Result<T, LudusError>
where
    F: Future<Output = Result<T, LudusError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(LudusError::Timeout(format!(
            "{op} exceeded {}ms",
            deadline.as_millis()
        ))),
    }
}
