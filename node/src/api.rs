//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                       |
//! |--------|-----------------------------|-----------------------------------|
//! | GET    | `/health`                   | Liveness probe                    |
//! | GET    | `/status`                   | Registry summary                  |
//! | POST   | `/rpc`                      | JSON-RPC 2.0 gateway              |
//! | GET    | `/ws`                       | WebSocket stream of contract events |
//! | GET    | `/auctions?start=&count=`   | Page of engine ids                |
//! | GET    | `/auctions/:id`             | Engine snapshot                   |
//!
//! ## Caller identity
//!
//! This is a devnet host: JSON-RPC params name the calling principal
//! directly (`caller`, `bidder`). There is no signature check.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use gavel_contracts::{AuctionEvent, Classified, ErrorClass, RegistryError};
use gavel_protocol::{AssetId, EngineId, LedgerError, Principal};

use crate::host::{Clock, Host};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The contracts. One lock serializes every call.
    pub host: Arc<Mutex<Host>>,
    /// Source of `now` for contract calls.
    pub clock: Arc<dyn Clock>,
    /// Contract events, fanned out to WebSocket subscribers.
    pub event_tx: broadcast::Sender<AuctionEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/auctions", get(auctions_handler))
        .route("/auctions/:id", get(auction_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Named method parameters.
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// JSON-RPC error codes. The contract range maps one code per
/// [`ErrorClass`].
pub mod codes {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL: i32 = -32603;
    pub const NOT_FOUND: i32 = -32001;
    pub const ADMISSION: i32 = -32010;
    pub const STATE: i32 = -32020;
    pub const COLLABORATOR: i32 = -32030;
    pub const AUTHORIZATION: i32 = -32040;
}

fn class_code(class: ErrorClass) -> i32 {
    match class {
        ErrorClass::Admission => codes::ADMISSION,
        ErrorClass::State => codes::STATE,
        ErrorClass::Collaborator => codes::COLLABORATOR,
        ErrorClass::Authorization => codes::AUTHORIZATION,
    }
}

/// Why an RPC call failed, before it becomes a [`JsonRpcError`].
#[derive(Debug)]
enum RpcFailure {
    InvalidParams(String),
    MethodNotFound(String),
    UnknownLedger(AssetId),
    Ledger(LedgerError),
    Contract(RegistryError),
    Internal(String),
}

impl From<RegistryError> for RpcFailure {
    fn from(e: RegistryError) -> Self {
        RpcFailure::Contract(e)
    }
}

impl From<LedgerError> for RpcFailure {
    fn from(e: LedgerError) -> Self {
        RpcFailure::Ledger(e)
    }
}

impl RpcFailure {
    fn into_error(self) -> JsonRpcError {
        match self {
            RpcFailure::InvalidParams(msg) => JsonRpcError {
                code: codes::INVALID_PARAMS,
                message: format!("Invalid params: {msg}"),
                data: None,
            },
            RpcFailure::MethodNotFound(method) => JsonRpcError {
                code: codes::METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
                data: None,
            },
            RpcFailure::UnknownLedger(asset) => JsonRpcError {
                code: codes::NOT_FOUND,
                message: format!("No ledger for asset {asset}"),
                data: None,
            },
            RpcFailure::Ledger(e) => JsonRpcError {
                code: codes::COLLABORATOR,
                message: e.to_string(),
                data: None,
            },
            RpcFailure::Contract(e) => {
                let class = e.class();
                JsonRpcError {
                    code: class_code(class),
                    message: e.to_string(),
                    data: Some(serde_json::json!({ "code": e.code(), "class": class })),
                }
            }
            RpcFailure::Internal(msg) => JsonRpcError {
                code: codes::INTERNAL,
                message: format!("Internal error: {msg}"),
                data: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC Params
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateAuctionParams {
    caller: Principal,
    asset: AssetId,
    duration_secs: u64,
    beneficiary: Principal,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    start: usize,
    count: usize,
}

#[derive(Debug, Deserialize)]
struct AssetParams {
    caller: Principal,
    asset: AssetId,
}

#[derive(Debug, Deserialize)]
struct DurationBoundsParams {
    caller: Principal,
    min_secs: u64,
    max_secs: u64,
}

#[derive(Debug, Deserialize)]
struct PausedParams {
    caller: Principal,
    paused: bool,
}

#[derive(Debug, Deserialize)]
struct OwnershipParams {
    caller: Principal,
    new_owner: Principal,
}

#[derive(Debug, Deserialize)]
struct BidParams {
    engine: String,
    bidder: Principal,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct EngineParams {
    engine: String,
}

#[derive(Debug, Deserialize)]
struct MintParams {
    asset: AssetId,
    to: Principal,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct ApproveParams {
    asset: AssetId,
    owner: Principal,
    spender: Principal,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct BalanceParams {
    asset: AssetId,
    who: Principal,
}

#[derive(Debug, Deserialize)]
struct RewardBalanceParams {
    who: Principal,
}

fn params<T: DeserializeOwned>(raw: Option<serde_json::Value>) -> Result<T, RpcFailure> {
    let value = raw.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|e| RpcFailure::InvalidParams(e.to_string()))
}

fn engine_id(raw: &str) -> Result<EngineId, RpcFailure> {
    EngineId::parse(raw)
        .ok_or_else(|| RpcFailure::InvalidParams(format!("malformed engine id: {raw}")))
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, RpcFailure> {
    serde_json::to_value(value).map_err(|e| RpcFailure::Internal(e.to_string()))
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// The registry's principal.
    pub registry: Principal,
    /// Current governance principal.
    pub owner: Principal,
    /// Total auctions ever created.
    pub instance_count: usize,
    /// Auctions still accepting bids.
    pub open_auctions: usize,
    /// Whether auction creation is paused.
    pub paused: bool,
    /// Whitelisted assets.
    pub supported_assets: Vec<AssetId>,
    /// Inclusive duration range for new auctions.
    pub min_duration_secs: u64,
    pub max_duration_secs: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Query string for `GET /auctions`.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub start: usize,
    #[serde(default = "default_page")]
    pub count: usize,
}

fn default_page() -> usize {
    gavel_protocol::config::MAX_PAGE_SIZE
}

/// Response payload for `GET /auctions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuctionPage {
    pub start: usize,
    pub total: usize,
    pub instances: Vec<EngineId>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: registry summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.clock.now();
    let host = state.host.lock().await;
    let registry = &host.registry;
    let bounds = registry.duration_bounds();

    Json(StatusResponse {
        version: state.version.clone(),
        registry: registry.address().clone(),
        owner: registry.owner().clone(),
        instance_count: registry.instance_count(),
        open_auctions: registry.open_count(now),
        paused: registry.is_paused(),
        supported_assets: registry.supported_assets(),
        min_duration_secs: bounds.min_secs,
        max_duration_secs: bounds.max_secs,
        timestamp: now.to_rfc3339(),
    })
}

/// `POST /rpc`: JSON-RPC 2.0 gateway.
///
/// Takes the host lock for the whole call, so contract calls never
/// interleave. Unknown methods return error code -32601.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code: codes::INVALID_REQUEST,
                message: "Invalid Request: jsonrpc must be \"2.0\"".into(),
                data: None,
            }),
            id: req.id,
        });
    }

    let timer = state.metrics.rpc_latency_seconds.start_timer();
    let outcome = {
        let mut host = state.host.lock().await;
        let now = state.clock.now();
        let outcome = dispatch(&mut host, &req.method, req.params, now);
        state
            .metrics
            .open_auctions
            .set(host.registry.open_count(now) as i64);
        outcome
    };
    timer.observe_duration();

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(failure) => {
            if let RpcFailure::Contract(e) = &failure {
                state.metrics.record_rejection(e.class());
                tracing::debug!(method = %req.method, code = e.code(), "rpc call rejected");
            }
            (None, Some(failure.into_error()))
        }
    };

    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

/// Routes one JSON-RPC method to the contracts.
fn dispatch(
    host: &mut Host,
    method: &str,
    raw: Option<serde_json::Value>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<serde_json::Value, RpcFailure> {
    match method {
        "registry_createAuction" => {
            let p: CreateAuctionParams = params(raw)?;
            let id = host.registry.create_auction(
                &p.caller,
                &p.asset,
                p.duration_secs,
                p.beneficiary,
                now,
            )?;
            to_json(serde_json::json!({ "engine": id }))
        }
        "registry_getInstanceCount" => to_json(host.registry.instance_count()),
        "registry_getInstances" => {
            let p: PageParams = params(raw)?;
            to_json(host.registry.get_instances(p.start, p.count)?)
        }
        "registry_addAsset" => {
            let p: AssetParams = params(raw)?;
            host.add_asset(&p.caller, p.asset)?;
            to_json(true)
        }
        "registry_removeAsset" => {
            let p: AssetParams = params(raw)?;
            host.registry.remove_supported_asset(&p.caller, &p.asset)?;
            to_json(true)
        }
        "registry_setDurationBounds" => {
            let p: DurationBoundsParams = params(raw)?;
            host.registry
                .set_duration_bounds(&p.caller, p.min_secs, p.max_secs)?;
            to_json(host.registry.duration_bounds())
        }
        "registry_setPaused" => {
            let p: PausedParams = params(raw)?;
            host.registry.set_paused(&p.caller, p.paused)?;
            to_json(p.paused)
        }
        "registry_transferOwnership" => {
            let p: OwnershipParams = params(raw)?;
            host.registry.transfer_ownership(&p.caller, p.new_owner)?;
            to_json(host.registry.owner())
        }
        "auction_bid" => {
            let p: BidParams = params(raw)?;
            let id = engine_id(&p.engine)?;
            to_json(host.registry.bid(&id, &p.bidder, p.amount, now)?)
        }
        "auction_settle" => {
            let p: EngineParams = params(raw)?;
            let id = engine_id(&p.engine)?;
            to_json(host.registry.settle(&id, now)?)
        }
        "auction_get" => {
            let p: EngineParams = params(raw)?;
            let id = engine_id(&p.engine)?;
            to_json(host.registry.engine(&id)?.snapshot(now))
        }
        "ledger_mint" => {
            let p: MintParams = params(raw)?;
            let ledger = host
                .ledger(&p.asset)
                .ok_or(RpcFailure::UnknownLedger(p.asset))?;
            to_json(ledger.mint(&p.to, p.amount)?)
        }
        "ledger_approve" => {
            let p: ApproveParams = params(raw)?;
            let ledger = host
                .ledger(&p.asset)
                .ok_or(RpcFailure::UnknownLedger(p.asset))?;
            ledger.approve(&p.owner, &p.spender, p.amount);
            to_json(p.amount)
        }
        "ledger_balanceOf" => {
            let p: BalanceParams = params(raw)?;
            let ledger = host
                .ledger(&p.asset)
                .ok_or(RpcFailure::UnknownLedger(p.asset))?;
            to_json(ledger.balance(&p.who))
        }
        "reward_balanceOf" => {
            let p: RewardBalanceParams = params(raw)?;
            to_json(host.rewards.balance_of(&p.who))
        }
        other => Err(RpcFailure::MethodNotFound(other.to_string())),
    }
}

/// `GET /ws`: WebSocket upgrade for live contract events.
///
/// Clients receive JSON-encoded [`AuctionEvent`] messages. The connection
/// is push-only; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

fn error_body(status: StatusCode, error: String, code: Option<&str>) -> axum::response::Response {
    let body = ErrorResponse {
        error,
        code: code.map(str::to_string),
    };
    (status, Json(body)).into_response()
}

/// `GET /auctions?start=&count=`: a page of engine ids in creation order.
async fn auctions_handler(
    Query(page): Query<PageQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let host = state.host.lock().await;
    match host.registry.get_instances(page.start, page.count) {
        Ok(instances) => Json(AuctionPage {
            start: page.start,
            total: host.registry.instance_count(),
            instances,
        })
        .into_response(),
        Err(e) => error_body(StatusCode::BAD_REQUEST, e.to_string(), Some(e.code())),
    }
}

/// `GET /auctions/:id`: snapshot of one engine.
async fn auction_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let Some(id) = EngineId::parse(&id) else {
        return error_body(
            StatusCode::BAD_REQUEST,
            format!("malformed engine id: {id}"),
            None,
        );
    };

    let now = state.clock.now();
    let host = state.host.lock().await;
    match host.registry.engine(&id) {
        Ok(engine) => Json(engine.snapshot(now)).into_response(),
        Err(e) => error_body(StatusCode::NOT_FOUND, e.to_string(), Some(e.code())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
