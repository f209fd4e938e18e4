use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ludus_controller::{
    with_deadline, ControllerClient, CreateResponse, ListGameFramesRequest,
    ListGameFramesResponse, StatusResponse, MAX_FRAMES_PER_PAGE,
};
use ludus_kernel::{CreateSpec, GameId};
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::tail::{live_tail, WebSocketSink};

/// Shared by every gateway handler.
#[derive(Clone)]
pub struct GatewayState {
    pub client: Arc<dyn ControllerClient>,
    pub config: GatewayConfig,
}

impl GatewayState {
    pub fn new(client: Arc<dyn ControllerClient>, config: GatewayConfig) -> Self {
        Self { client, config }
    }
}

/// Plain-text error body of the form `"<message> <cause>"`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: String,
}

impl ApiError {
    fn new(status: StatusCode, message: &str, cause: impl Display) -> Self {
        tracing::error!(status = status.as_u16(), error = %cause, "{message}");
        Self {
            status,
            body: format!("{message} {cause}"),
        }
    }

    fn internal(message: &str, cause: impl Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, cause)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}

async fn create_game(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<CreateResponse>, ApiError> {
    let spec: CreateSpec = serde_json::from_slice(&body)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, "Invalid JSON:", e))?;
    let created = with_deadline(
        state.config.request_timeout,
        "create",
        state.client.create(&spec),
    )
    .await
    .map_err(|e| ApiError::internal("Error creating game", e))?;
    Ok(Json(created))
}

async fn start_game(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = GameId::new(id);
    with_deadline(
        state.config.request_timeout,
        "start",
        state.client.start(&id),
    )
    .await
    .map_err(|e| ApiError::internal("Error while calling controller start", e))?;
    Ok(StatusCode::OK)
}

async fn get_status(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = GameId::new(id);
    let status = with_deadline(
        state.config.request_timeout,
        "status",
        state.client.status(&id),
    )
    .await
    .map_err(|e| ApiError::internal("Error while calling controller status", e))?;
    Ok(Json(status))
}

/// Unparseable `offset` or `limit` values count as absent.
fn frames_request(id: GameId, query: &HashMap<String, String>) -> ListGameFramesRequest {
    let offset = query
        .get("offset")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    let limit = query
        .get("limit")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(MAX_FRAMES_PER_PAGE);
    ListGameFramesRequest::new(id)
        .with_offset(offset)
        .with_limit(limit)
}

async fn get_frames(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ListGameFramesResponse>, ApiError> {
    let req = frames_request(GameId::new(id), &query);
    let frames = state
        .client
        .list_game_frames(&req)
        .await
        .map_err(|e| ApiError::internal("Error while calling controller list frames", e))?;
    Ok(Json(frames))
}

async fn frames_socket(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let id = GameId::new(id);
    ws.on_upgrade(move |socket| async move {
        tracing::info!(game = %id, "observer connected");
        let mut sink = WebSocketSink::new(socket);
        live_tail(
            state.client.as_ref(),
            &id,
            &mut sink,
            state.config.tail_poll_timeout,
        )
        .await;
    })
}

/// Public HTTP surface of the gateway.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/:id/start", post(start_game))
        .route("/games/:id", get(get_status))
        .route("/games/:id/frames", get(get_frames))
        .route("/socket/:id", get(frames_socket))
        .with_state(state)
}

/// Serve the gateway on an already bound listener.
pub async fn serve(listener: TcpListener, state: GatewayState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "gateway listening");
    }
    axum::serve(listener, router(state)).await
}
