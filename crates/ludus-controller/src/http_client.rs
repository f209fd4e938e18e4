//! [ControllerClient] over HTTP, talking to a [crate::ControllerServer].

use async_trait::async_trait;
use ludus_kernel::{CreateSpec, ErrorKind, GameId, LeaseToken, LudusError};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::ControllerClient;
use crate::server::LOCK_TOKEN_HEADER;
use crate::wire::{
    AddGameFrameRequest, AddGameFrameResponse, CreateResponse, ErrorBody, GameRequest,
    ListGameFramesRequest, ListGameFramesResponse, PingResponse, PopResponse, StatusResponse,
};

#[derive(Clone, Debug)]
pub struct HttpControllerClient {
    http: reqwest::Client,
    base_url: String,
}

fn kind_for(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::LockConflict,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::InvalidArgument,
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => ErrorKind::Timeout,
        _ => ErrorKind::Internal,
    }
}

fn map_transport_err(op: &str, e: reqwest::Error) -> LudusError {
    if e.is_timeout() {
        LudusError::Timeout(format!("{op}: {e}"))
    } else {
        LudusError::Driver(format!("{op}: {e}"))
    }
}

impl HttpControllerClient {
    /// `base_url` like `http://127.0.0.1:3004`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    async fn call<Req, Resp>(
        &self,
        op: &str,
        token: Option<&LeaseToken>,
        body: &Req,
    ) -> Result<Resp, LudusError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/rpc/{op}", self.base_url);
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = token {
            request = request.header(LOCK_TOKEN_HEADER, token.as_str());
        }

        let response = request.send().await.map_err(|e| map_transport_err(op, e))?;
        let status = response.status();
        if status.is_success() {
            return response.json::<Resp>().await.map_err(|e| map_transport_err(op, e));
        }

        let text = response.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => LudusError::Remote {
                kind: body.kind,
                message: body.message,
            },
            Err(_) => LudusError::Remote {
                kind: kind_for(status),
                message: format!("{op} failed with {status}: {text}"),
            },
        };
        Err(err)
    }
}

#[async_trait]
impl ControllerClient for HttpControllerClient {
    async fn pop(&self) -> Result<PopResponse, LudusError> {
        self.call("pop", None, &serde_json::json!({})).await
    }

    async fn status(&self, id: &GameId) -> Result<StatusResponse, LudusError> {
        self.call("status", None, &GameRequest { id: id.clone() })
            .await
    }

    async fn start(&self, id: &GameId) -> Result<(), LudusError> {
        let _: serde_json::Value = self
            .call("start", None, &GameRequest { id: id.clone() })
            .await?;
        Ok(())
    }

    async fn create(&self, spec: &CreateSpec) -> Result<CreateResponse, LudusError> {
        self.call("create", None, spec).await
    }

    async fn add_game_frame(
        &self,
        token: &LeaseToken,
        req: AddGameFrameRequest,
    ) -> Result<AddGameFrameResponse, LudusError> {
        self.call("add_game_frame", Some(token), &req).await
    }

    async fn list_game_frames(
        &self,
        req: &ListGameFramesRequest,
    ) -> Result<ListGameFramesResponse, LudusError> {
        self.call("list_game_frames", None, req).await
    }

    async fn end_game(&self, id: &GameId, token: &LeaseToken) -> Result<(), LudusError> {
        let _: serde_json::Value = self
            .call("end_game", Some(token), &GameRequest { id: id.clone() })
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<PingResponse, LudusError> {
        self.call("ping", None, &serde_json::json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use ludus_kernel::testing::ScriptedRules;
    use ludus_kernel::{Frame, GameStatus, ParticipantSpec};
    use ludus_store::MemoryGameStore;

    use super::*;
    use crate::server::ControllerServer;
    use crate::service::{Controller, VERSION};

    async fn start_server() -> (HttpControllerClient, tokio::task::JoinHandle<()>) {
        let controller = Arc::new(Controller::new(
            Arc::new(MemoryGameStore::default()),
            Arc::new(ScriptedRules::new()),
        ));
        let server = ControllerServer::new(controller);
        let serving = server.clone();
        let handle = tokio::spawn(async move {
            let _ = serving.serve("127.0.0.1:0").await;
        });
        let base = tokio::time::timeout(Duration::from_secs(5), server.dial_address())
            .await
            .expect("server ready")
            .expect("dial address");
        (HttpControllerClient::new(base), handle)
    }

    #[test]
    fn statuses_map_back_to_kinds() {
        assert_eq!(kind_for(StatusCode::NOT_FOUND), ErrorKind::NotFound);
        assert_eq!(kind_for(StatusCode::CONFLICT), ErrorKind::LockConflict);
        assert_eq!(kind_for(StatusCode::BAD_GATEWAY), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn full_lease_cycle_over_http() {
        let (client, handle) = start_server().await;
        assert_eq!(client.ping().await.unwrap().version, VERSION);

        let id = client
            .create(&CreateSpec {
                mode: "standard".into(),
                width: 7,
                height: 7,
                participants: vec![
                    ParticipantSpec {
                        name: "a".into(),
                        url: None,
                    },
                    ParticipantSpec {
                        name: "b".into(),
                        url: None,
                    },
                ],
            })
            .await
            .unwrap()
            .id;
        client.start(&id).await.unwrap();
        client.start(&id).await.unwrap();

        let pop = client.pop().await.unwrap();
        assert_eq!(pop.id, id);
        assert!(client.pop().await.unwrap_err().is_not_found());

        let next = Frame {
            turn: 1,
            participants: vec![],
            environment: serde_json::Value::Null,
        };
        let added = client
            .add_game_frame(
                &pop.token,
                AddGameFrameRequest {
                    id: id.clone(),
                    frame: Some(next.clone()),
                },
            )
            .await
            .unwrap();

        let stale = client.end_game(&id, &pop.token).await.unwrap_err();
        assert!(stale.is_lock_conflict());

        let status = client.status(&id).await.unwrap();
        assert_eq!(status.last_frame, Some(next));

        client.end_game(&id, &added.token).await.unwrap();
        let status = client.status(&id).await.unwrap();
        assert_eq!(status.game.status, GameStatus::Complete);

        let frames = client
            .list_game_frames(&ListGameFramesRequest::new(id))
            .await
            .unwrap();
        assert_eq!(frames.count, 2);

        handle.abort();
    }

    #[tokio::test]
    async fn nil_frame_is_invalid_argument_over_http() {
        let (client, handle) = start_server().await;
        let token = LeaseToken::new("whatever");
        let err = client
            .add_game_frame(
                &token,
                AddGameFrameRequest {
                    id: GameId::new("g"),
                    frame: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        handle.abort();
    }
}
