//! JSON-over-HTTP transport for the controller.
//!
//! Every operation is a `POST /rpc/<operation>` with a JSON body. The lease
//! token rides in the [LOCK_TOKEN_HEADER] header. Failures come back as an
//! [ErrorBody] with a status code derived from the error kind.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use ludus_kernel::{CreateSpec, ErrorKind, LeaseToken, LudusError, RulesEngine};
use ludus_store::{LeaseConfig, MemoryGameStore};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::service::Controller;
use crate::wire::{
    AddGameFrameRequest, AddGameFrameResponse, CreateResponse, ErrorBody, GameRequest,
    ListGameFramesRequest, ListGameFramesResponse, PingResponse, PopResponse, StatusResponse,
};

pub const LOCK_TOKEN_HEADER: &str = "x-ludus-lock-token";

pub const DEFAULT_CONTROLLER_ADDR: &str = "127.0.0.1:3004";

/// Controller process settings.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// `host:port` to listen on; port 0 picks a free port.
    pub listen_addr: String,
    pub lease: LeaseConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_CONTROLLER_ADDR.to_string(),
            lease: LeaseConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Reads `LUDUS_CONTROLLER_ADDR` and the lease settings.
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LUDUS_CONTROLLER_ADDR")
                .unwrap_or_else(|_| DEFAULT_CONTROLLER_ADDR.to_string()),
            lease: LeaseConfig::from_env(),
        }
    }

    /// In-process store honoring the configured lease TTL.
    pub fn memory_store(&self) -> MemoryGameStore {
        MemoryGameStore::new(self.lease.clone())
    }
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::LockConflict => StatusCode::CONFLICT,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

struct RpcError(LudusError);

impl From<LudusError> for RpcError {
    fn from(value: LudusError) -> Self {
        Self(value)
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(error = %self.0, "controller rpc failed");
        }
        let body = ErrorBody {
            kind,
            message: self.0.to_string(),
        };
        (status_for(kind), Json(body)).into_response()
    }
}

type RpcResult<T> = Result<Json<T>, RpcError>;

fn lock_token(headers: &HeaderMap) -> Result<LeaseToken, RpcError> {
    headers
        .get(LOCK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(LeaseToken::new)
        .ok_or_else(|| {
            RpcError(LudusError::InvalidArgument(format!(
                "missing {LOCK_TOKEN_HEADER} header"
            )))
        })
}

async fn pop(State(c): State<Arc<Controller>>) -> RpcResult<PopResponse> {
    Ok(Json(c.pop().await?))
}

async fn status(
    State(c): State<Arc<Controller>>,
    Json(req): Json<GameRequest>,
) -> RpcResult<StatusResponse> {
    Ok(Json(c.status(&req.id).await?))
}

async fn start(
    State(c): State<Arc<Controller>>,
    Json(req): Json<GameRequest>,
) -> RpcResult<serde_json::Value> {
    c.start(&req.id).await?;
    Ok(Json(serde_json::json!({})))
}

async fn create(
    State(c): State<Arc<Controller>>,
    Json(spec): Json<CreateSpec>,
) -> RpcResult<CreateResponse> {
    Ok(Json(c.create(&spec).await?))
}

async fn add_game_frame(
    State(c): State<Arc<Controller>>,
    headers: HeaderMap,
    Json(req): Json<AddGameFrameRequest>,
) -> RpcResult<AddGameFrameResponse> {
    let token = lock_token(&headers)?;
    Ok(Json(c.add_game_frame(&token, req).await?))
}

async fn list_game_frames(
    State(c): State<Arc<Controller>>,
    Json(req): Json<ListGameFramesRequest>,
) -> RpcResult<ListGameFramesResponse> {
    Ok(Json(c.list_game_frames(&req).await?))
}

async fn end_game(
    State(c): State<Arc<Controller>>,
    headers: HeaderMap,
    Json(req): Json<GameRequest>,
) -> RpcResult<serde_json::Value> {
    let token = lock_token(&headers)?;
    c.end_game(&req.id, &token).await?;
    Ok(Json(serde_json::json!({})))
}

async fn ping(State(c): State<Arc<Controller>>) -> Json<PingResponse> {
    Json(c.ping())
}

/// Routes of the controller RPC surface.
pub fn build_router(controller: Arc<Controller>) -> Router {
    Router::new()
        .route("/rpc/pop", post(pop))
        .route("/rpc/status", post(status))
        .route("/rpc/start", post(start))
        .route("/rpc/create", post(create))
        .route("/rpc/add_game_frame", post(add_game_frame))
        .route("/rpc/list_game_frames", post(list_game_frames))
        .route("/rpc/end_game", post(end_game))
        .route("/rpc/ping", post(ping))
        .with_state(controller)
}

/// Serves one [Controller] and publishes the address it bound.
#[derive(Clone)]
pub struct ControllerServer {
    controller: Arc<Controller>,
    bound: Arc<watch::Sender<Option<SocketAddr>>>,
}

impl ControllerServer {
    pub fn new(controller: Arc<Controller>) -> Self {
        let (bound, _) = watch::channel(None);
        Self {
            controller,
            bound: Arc::new(bound),
        }
    }

    /// Controller over a [MemoryGameStore] built from `config.lease`.
    pub fn from_config(config: &ControllerConfig, rules: Arc<dyn RulesEngine>) -> Self {
        tracing::debug!(
            lease_ttl_ms = config.lease.lease_ttl.as_millis() as u64,
            "building in-memory controller"
        );
        Self::new(Arc::new(Controller::new(
            Arc::new(config.memory_store()),
            rules,
        )))
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    pub fn router(&self) -> Router {
        build_router(self.controller.clone())
    }

    /// Bind `listen` and serve until the process stops.
    pub async fn serve(&self, listen: &str) -> Result<(), LudusError> {
        self.serve_with_shutdown(listen, std::future::pending())
            .await
    }

    /// Serve on `config.listen_addr` until the process stops.
    pub async fn serve_config(&self, config: &ControllerConfig) -> Result<(), LudusError> {
        self.serve(&config.listen_addr).await
    }

    /// Bind `listen` and serve until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(&self, listen: &str, shutdown: F) -> Result<(), LudusError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|e| LudusError::Driver(format!("bind {listen}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| LudusError::Driver(format!("resolve bound address: {e}")))?;

        self.bound.send_replace(Some(addr));
        tracing::info!(%addr, "controller listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| LudusError::Driver(format!("controller server: {e}")))
    }

    /// Wait until the server has bound its listener.
    pub async fn ready(&self) -> Result<SocketAddr, LudusError> {
        let mut rx = self.bound.subscribe();
        let addr = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|e| LudusError::Driver(format!("controller readiness: {e}")))?;
        (*addr).ok_or_else(|| LudusError::Driver("controller address unavailable".into()))
    }

    /// Local base URL for clients, useful when the port was auto-selected.
    pub async fn dial_address(&self) -> Result<String, LudusError> {
        let addr = self.ready().await?;
        Ok(format!("http://127.0.0.1:{}", addr.port()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use ludus_kernel::testing::ScriptedRules;
    use ludus_store::MemoryGameStore;
    use tower::ServiceExt;

    use super::*;

    fn controller() -> Arc<Controller> {
        Arc::new(Controller::new(
            Arc::new(MemoryGameStore::default()),
            Arc::new(ScriptedRules::new()),
        ))
    }

    fn rpc(path: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(LOCK_TOKEN_HEADER, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn empty_queue_maps_to_not_found() {
        let app = build_router(controller());
        let res = app
            .oneshot(rpc("/rpc/pop", None, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = json_body(res).await;
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn add_game_frame_requires_token_header() {
        let app = build_router(controller());
        let res = app
            .oneshot(rpc(
                "/rpc/add_game_frame",
                None,
                serde_json::json!({ "id": "g", "frame": null }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stale_token_maps_to_conflict() {
        let c = controller();
        let app = build_router(c.clone());
        let spec = serde_json::json!({
            "width": 5, "height": 5, "participants": [{ "name": "a" }, { "name": "b" }]
        });
        let res = app
            .clone()
            .oneshot(rpc("/rpc/create", None, spec))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let id = json_body(res).await["id"].as_str().unwrap().to_string();

        let res = app
            .clone()
            .oneshot(rpc("/rpc/pop", None, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(json_body(res).await["id"], id.as_str());

        let res = app
            .oneshot(rpc(
                "/rpc/end_game",
                Some("not-the-token"),
                serde_json::json!({ "id": id }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(res).await["kind"], "lock_conflict");
    }

    #[tokio::test]
    async fn server_publishes_auto_selected_port() {
        let server = ControllerServer::new(controller());
        let serving = server.clone();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            serving
                .serve_with_shutdown("127.0.0.1:0", async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let addr = tokio::time::timeout(Duration::from_secs(5), server.ready())
            .await
            .expect("server ready in time")
            .expect("bound address");
        assert_ne!(addr.port(), 0);
        let dial = server.dial_address().await.unwrap();
        assert_eq!(dial, format!("http://127.0.0.1:{}", addr.port()));

        let _ = stop_tx.send(());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn serve_config_binds_configured_address() {
        let config = ControllerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            lease: LeaseConfig::with_ttl(Duration::from_millis(250)),
        };
        let server = ControllerServer::from_config(&config, Arc::new(ScriptedRules::new()));
        let serving = server.clone();
        let handle = tokio::spawn(async move { serving.serve_config(&config).await });

        let addr = tokio::time::timeout(Duration::from_secs(5), server.ready())
            .await
            .expect("server ready in time")
            .expect("bound address");
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn configured_lease_ttl_governs_takeover() {
        let config = ControllerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            lease: LeaseConfig::with_ttl(Duration::from_millis(200)),
        };
        let server = ControllerServer::from_config(&config, Arc::new(ScriptedRules::new()));
        let c = server.controller();
        let spec = CreateSpec {
            mode: "standard".into(),
            width: 5,
            height: 5,
            participants: vec![ludus_kernel::ParticipantSpec {
                name: "a".into(),
                url: None,
            }],
        };
        let id = c.create(&spec).await.unwrap().id;
        let first = c.pop().await.unwrap();
        assert_eq!(first.id, id);

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(c.pop().await.unwrap_err().is_not_found());

        tokio::time::advance(Duration::from_millis(100)).await;
        let second = c.pop().await.unwrap();
        assert_eq!(second.id, id);
        assert_ne!(second.token, first.token);
    }

    #[test]
    fn config_reads_listen_address_and_lease_from_env() {
        std::env::set_var("LUDUS_CONTROLLER_ADDR", "0.0.0.0:4100");
        std::env::set_var("LUDUS_LEASE_TTL_MS", "1500");
        let config = ControllerConfig::from_env();
        std::env::remove_var("LUDUS_CONTROLLER_ADDR");
        std::env::remove_var("LUDUS_LEASE_TTL_MS");

        assert_eq!(config.listen_addr, "0.0.0.0:4100");
        assert_eq!(config.lease.lease_ttl, Duration::from_millis(1500));
        assert_eq!(ControllerConfig::from_env().listen_addr, DEFAULT_CONTROLLER_ADDR);
    }
}
