//! HTTP and WebSocket surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use perpline_core::{AccountId, AssetKey, OrderRequest, PriceQuote};
use perpline_risk::{RiskEngine, RiskError};
use perpline_telemetry::Metrics;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::error::GatewayResult;
use crate::gateway::Gateway;
use crate::registry::Outbound;

/// Caps concurrent WebSocket sessions.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionPermit> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionPermit {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

/// Held for the lifetime of one socket.
pub struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct ApiState {
    gateway: Arc<Gateway>,
    risk: Arc<RiskEngine>,
    limiter: Arc<ConnectionLimiter>,
}

impl ApiState {
    pub fn new(gateway: Arc<Gateway>, risk: Arc<RiskEngine>) -> Self {
        let limiter = Arc::new(ConnectionLimiter::new(gateway.config().max_connections));
        Self {
            gateway,
            risk,
            limiter,
        }
    }
}

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/prices", get(get_prices))
        .route("/api/prices/{asset}", get(get_price))
        .route("/api/orders/validate", post(validate_order))
        .route("/api/orders/confirm", post(confirm_order))
        .route("/api/cooldown/{account}", get(get_cooldown))
        .route("/api/positions/{address}", get(get_positions))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> GatewayResult<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Gateway server stopped");
    Ok(())
}

// ----------------------------------------------------------------------
// WebSocket
// ----------------------------------------------------------------------

async fn ws_handler(State(state): State<ApiState>, ws: WebSocketUpgrade) -> Response {
    let Some(permit) = state.limiter.try_acquire() else {
        warn!(
            current = state.limiter.current_count(),
            max = state.gateway.config().max_connections,
            "WebSocket connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };
    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, gateway, permit))
}

async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>, _permit: ConnectionPermit) {
    let (id, mut outbound) = gateway.connect();
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let message = match frame {
                Outbound::Text(text) => Message::Text(text.into()),
                Outbound::Ping => Message::Ping(Bytes::new()),
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let reason = loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => gateway.handle_message(id, text.as_str()).await,
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => gateway.touch(id),
                Some(Ok(Message::Binary(_))) => debug!(conn_id = %id, "Ignoring binary frame"),
                Some(Ok(Message::Close(_))) | None => break "closed",
                Some(Err(e)) => {
                    debug!(conn_id = %id, error = %e, "WebSocket receive error");
                    break "error";
                }
            },
            _ = &mut writer => break "writer_closed",
        }
    };

    writer.abort();
    gateway.disconnect(id, reason);
}

// ----------------------------------------------------------------------
// HTTP
// ----------------------------------------------------------------------

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

async fn health(State(state): State<ApiState>) -> Response {
    Json(json!({
        "status": "ok",
        "connections": state.gateway.connection_count(),
        "timestamp": state.gateway.now_ms(),
    }))
    .into_response()
}

async fn metrics() -> Response {
    match Metrics::render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Debug, Deserialize)]
struct PricesQuery {
    assets: Option<String>,
}

async fn get_prices(State(state): State<ApiState>, Query(query): Query<PricesQuery>) -> Response {
    let keys: Vec<AssetKey> = match query.assets.as_deref() {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(AssetKey::new)
            .collect(),
        None => state.gateway.watch_list().to_vec(),
    };
    let mut quotes: Vec<PriceQuote> = state
        .gateway
        .prices()
        .resolve(&keys)
        .await
        .into_values()
        .collect();
    quotes.sort_by(|a, b| a.asset_key.cmp(&b.asset_key));
    Json(json!({ "data": quotes })).into_response()
}

async fn get_price(State(state): State<ApiState>, Path(asset): Path<String>) -> Response {
    match state.gateway.prices().get_single(&AssetKey::new(asset.as_str())).await {
        Some(quote) => Json(quote).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("No price for {asset}")),
    }
}

#[derive(Debug, Deserialize)]
struct ValidateOrderBody {
    #[serde(default)]
    account: Option<String>,
    order: OrderRequest,
}

/// Constraint check, or full order preparation when an account is given.
async fn validate_order(
    State(state): State<ApiState>,
    Json(body): Json<ValidateOrderBody>,
) -> Response {
    let order = body.order;
    let Some(raw_account) = body.account else {
        let errors = state.risk.validate_order(&order);
        let status = if errors.is_empty() {
            StatusCode::OK
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        };
        return (status, Json(json!({ "valid": errors.is_empty(), "errors": errors })))
            .into_response();
    };

    let account = match AccountId::parse(&raw_account) {
        Ok(account) => account,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let reference = state
        .gateway
        .prices()
        .get_single(&pair_base(&order.pair))
        .await
        .map(|q| q.usd_price);

    match state.risk.prepare_order(&account, &order, reference) {
        Ok(params) => {
            let fee = state.risk.trading_fee(order.size_delta).ok();
            let estimate = reference.and_then(|price| {
                state
                    .risk
                    .entry_estimate(price, order.size_delta, order.is_long)
                    .ok()
            });
            Json(json!({
                "valid": true,
                "errors": Vec::<String>::new(),
                "params": params,
                "tradingFee": fee,
                "entryEstimate": estimate,
            }))
            .into_response()
        }
        Err(RiskError::Cooldown { remaining_ms }) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "valid": false,
                "errors": [RiskError::Cooldown { remaining_ms }.to_string()],
                "cooldownRemainingMs": remaining_ms,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "valid": false, "errors": e.messages() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ConfirmOrderBody {
    account: String,
}

/// Called once the transaction was accepted; starts the cooldown.
async fn confirm_order(
    State(state): State<ApiState>,
    Json(body): Json<ConfirmOrderBody>,
) -> Response {
    let account = match AccountId::parse(&body.account) {
        Ok(account) => account,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    state.risk.confirm_order(&account);
    Json(json!({
        "account": account,
        "cooldownMs": state.risk.cooldown().cooldown_ms(),
    }))
    .into_response()
}

async fn get_cooldown(State(state): State<ApiState>, Path(account): Path<String>) -> Response {
    let account = match AccountId::parse(&account) {
        Ok(account) => account,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let cooldown = state.risk.cooldown();
    Json(json!({
        "account": account,
        "canTrade": cooldown.can_trade(&account),
        "remainingMs": cooldown.time_remaining_ms(&account),
    }))
    .into_response()
}

async fn get_positions(State(state): State<ApiState>, Path(address): Path<String>) -> Response {
    let account = match AccountId::parse(&address) {
        Ok(account) => account,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    match state.gateway.portfolio().refresh(&account).await {
        Ok(positions) => {
            let health: Vec<_> = positions
                .iter()
                .map(|p| {
                    json!({
                        "positionId": p.position_id,
                        "health": state.risk.position_health(p).ok(),
                    })
                })
                .collect();
            Json(json!({ "address": account, "positions": positions, "health": health }))
                .into_response()
        }
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
            warn!(address = %account, error = %e, status = status.as_u16(), "Position lookup failed");
            error_response(status, e)
        }
    }
}

/// Base asset of a pair: `BTC_USD` -> `BTC`.
fn pair_base(pair: &str) -> AssetKey {
    let base = pair
        .split(['_', '/', '-'])
        .next()
        .unwrap_or(pair);
    AssetKey::new(base)
}
