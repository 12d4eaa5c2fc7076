//! API request handlers.

use super::{DEFAULT_BOOK_DEPTH, MAX_BOOK_DEPTH};
use crate::auth::AuthContext;
use crate::config::MarketKind;
use crate::entities::markets::symbol_of;
use crate::error::ApiError;
use crate::models::{
    ApiKeyInfo, CreateApiKeyRequest, CreateApiKeyResponse, HealthResponse, MarketSummary,
    MessageResponse, OhlcInterval, OhlcQuery, OhlcResponse, Order, OrderBookSnapshot, OrderPage,
    OrderQuery, Permission, PlaceOrderRequest, PlaceOrderResponse, Position, StatsResponse, Ticker,
    Trade,
};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Default number of recent trades returned.
const DEFAULT_TRADES_LIMIT: usize = 50;

/// Default number of chart bars returned.
const DEFAULT_BARS_LIMIT: usize = 500;

/// Depth / size query for book and trade endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    /// Maximum number of levels or rows.
    #[serde(default)]
    pub limit: Option<usize>,
}

fn market_symbol(currency: &str, pair: &str) -> String {
    symbol_of(&currency.trim().to_uppercase(), &pair.trim().to_uppercase())
}

// ============================================================================
// Service
// ============================================================================

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Platform-wide counters.
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    responses(
        (status = 200, description = "Platform statistics", body = StatsResponse)
    ),
    tag = "Statistics"
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        users: state.store.users.len(),
        wallets: state.store.wallets.len(),
        ecosystem_markets: state.store.ecosystem_markets.len(),
        futures_markets: state.store.futures_markets.len(),
        open_orders: state.exchange.open_order_count(),
        tracked_orders: state.exchange.tracked_order_count(),
        websocket_clients: state.broker.client_count(),
    })
}

// ============================================================================
// API keys
// ============================================================================

/// Creates an API key. The raw key is only returned here.
#[utoipa::path(
    post,
    path = "/api/v1/auth/keys",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "Key created", body = CreateApiKeyResponse),
        (status = 401, description = "Missing or invalid API key"),
        (status = 403, description = "Admin permission required")
    ),
    tag = "Auth"
)]
pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), ApiError> {
    auth.require(Permission::Admin)?;
    if req.name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("key name cannot be empty".to_string()));
    }
    if req.permissions.is_empty() {
        return Err(ApiError::InvalidRequest("permissions cannot be empty".to_string()));
    }
    if let Some(user_id) = req.user_id {
        state.store.require_user(user_id)?;
    }

    let rate_limit = req
        .rate_limit
        .unwrap_or(state.config.auth.default_rate_limit)
        .max(1);
    let (key, api_key) = state
        .api_keys
        .create_key(req.name, req.permissions, rate_limit, req.user_id);
    info!("Created API key {}", key.key_id);
    Ok((StatusCode::CREATED, Json(CreateApiKeyResponse { api_key, key })))
}

/// Lists API keys.
#[utoipa::path(
    get,
    path = "/api/v1/auth/keys",
    responses(
        (status = 200, description = "Keys", body = Vec<ApiKeyInfo>),
        (status = 403, description = "Admin permission required")
    ),
    tag = "Auth"
)]
pub async fn list_api_keys(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
) -> Result<Json<Vec<ApiKeyInfo>>, ApiError> {
    auth.require(Permission::Admin)?;
    Ok(Json(state.api_keys.list_keys()))
}

/// Revokes an API key.
#[utoipa::path(
    delete,
    path = "/api/v1/auth/keys/{key_id}",
    params(
        ("key_id" = String, Path, description = "Key identifier")
    ),
    responses(
        (status = 200, description = "Key revoked", body = MessageResponse),
        (status = 404, description = "Unknown key")
    ),
    tag = "Auth"
)]
pub async fn delete_api_key(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(key_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    auth.require(Permission::Admin)?;
    if !state.api_keys.delete_key(&key_id) {
        return Err(ApiError::not_found("API key", &key_id));
    }
    info!("Revoked API key {}", key_id);
    Ok(Json(MessageResponse {
        message: format!("API key {} revoked", key_id),
        count: 1,
    }))
}

// ============================================================================
// Market data
// ============================================================================

/// Lists the enabled markets of a family.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/markets",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`")
    ),
    responses(
        (status = 200, description = "Enabled markets", body = Vec<MarketSummary>)
    ),
    tag = "Market Data"
)]
pub async fn list_markets(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<MarketKind>,
) -> Json<Vec<MarketSummary>> {
    let mut markets: Vec<MarketSummary> = match kind {
        MarketKind::Ecosystem => state
            .store
            .ecosystem_markets
            .filter(|m| m.status)
            .into_iter()
            .map(|m| MarketSummary {
                symbol: m.symbol(),
                currency: m.currency,
                pair: m.pair,
                is_trending: m.is_trending,
                is_hot: m.is_hot,
                taker_fee: m.taker_fee,
                maker_fee: m.maker_fee,
                min_amount: m.min_amount,
                max_leverage: None,
            })
            .collect(),
        MarketKind::Futures => state
            .store
            .futures_markets
            .filter(|m| m.status)
            .into_iter()
            .map(|m| MarketSummary {
                symbol: m.symbol(),
                currency: m.currency,
                pair: m.pair,
                is_trending: m.is_trending,
                is_hot: m.is_hot,
                taker_fee: m.taker_fee,
                maker_fee: m.maker_fee,
                min_amount: m.min_amount,
                max_leverage: Some(m.max_leverage),
            })
            .collect(),
    };
    markets.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    Json(markets)
}

/// Order book of a market.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/orderbook/{currency}/{pair}",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`"),
        ("currency" = String, Path, description = "Base currency"),
        ("pair" = String, Path, description = "Quote currency"),
        ("limit" = Option<usize>, Query, description = "Levels per side (default 50, max 500)")
    ),
    responses(
        (status = 200, description = "Aggregated book", body = OrderBookSnapshot),
        (status = 404, description = "Unknown market")
    ),
    tag = "Market Data"
)]
pub async fn get_order_book(
    State(state): State<Arc<AppState>>,
    Path((kind, currency, pair)): Path<(MarketKind, String, String)>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<OrderBookSnapshot>, ApiError> {
    let depth = query
        .limit
        .unwrap_or(DEFAULT_BOOK_DEPTH)
        .clamp(1, MAX_BOOK_DEPTH);
    let book = state
        .exchange
        .engine(kind)
        .get_order_book(&market_symbol(&currency, &pair), depth)?;
    Ok(Json(book))
}

/// 24h ticker of a market.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/ticker/{currency}/{pair}",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`"),
        ("currency" = String, Path, description = "Base currency"),
        ("pair" = String, Path, description = "Quote currency")
    ),
    responses(
        (status = 200, description = "Ticker", body = Ticker),
        (status = 404, description = "Unknown market")
    ),
    tag = "Market Data"
)]
pub async fn get_ticker(
    State(state): State<Arc<AppState>>,
    Path((kind, currency, pair)): Path<(MarketKind, String, String)>,
) -> Result<Json<Ticker>, ApiError> {
    let ticker = state
        .exchange
        .engine(kind)
        .get_ticker(&market_symbol(&currency, &pair))?;
    Ok(Json(ticker))
}

/// Tickers of every market of a family.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/tickers",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`")
    ),
    responses(
        (status = 200, description = "Tickers sorted by symbol", body = Vec<Ticker>)
    ),
    tag = "Market Data"
)]
pub async fn get_tickers(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<MarketKind>,
) -> Json<Vec<Ticker>> {
    Json(state.exchange.engine(kind).get_tickers())
}

/// Recent trades of a market, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/trades/{currency}/{pair}",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`"),
        ("currency" = String, Path, description = "Base currency"),
        ("pair" = String, Path, description = "Quote currency"),
        ("limit" = Option<usize>, Query, description = "Number of trades (default 50)")
    ),
    responses(
        (status = 200, description = "Trades", body = Vec<Trade>),
        (status = 404, description = "Unknown market")
    ),
    tag = "Market Data"
)]
pub async fn get_trades(
    State(state): State<Arc<AppState>>,
    Path((kind, currency, pair)): Path<(MarketKind, String, String)>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Trade>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_TRADES_LIMIT);
    let trades = state
        .exchange
        .engine(kind)
        .recent_trades(&market_symbol(&currency, &pair), limit)?;
    Ok(Json(trades))
}

/// OHLC candles of a market.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/chart/{currency}/{pair}",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`"),
        ("currency" = String, Path, description = "Base currency"),
        ("pair" = String, Path, description = "Quote currency"),
        ("interval" = String, Query, description = "1m, 5m, 15m, 1h, 4h or 1d"),
        ("from" = Option<i64>, Query, description = "Start timestamp in seconds"),
        ("to" = Option<i64>, Query, description = "End timestamp in seconds"),
        ("limit" = Option<usize>, Query, description = "Maximum bars (default 500)")
    ),
    responses(
        (status = 200, description = "Bars, oldest first", body = OhlcResponse),
        (status = 400, description = "Invalid interval"),
        (status = 404, description = "Unknown market")
    ),
    tag = "Market Data"
)]
pub async fn get_chart(
    State(state): State<Arc<AppState>>,
    Path((kind, currency, pair)): Path<(MarketKind, String, String)>,
    Query(query): Query<OhlcQuery>,
) -> Result<Json<OhlcResponse>, ApiError> {
    let interval: OhlcInterval = query
        .interval
        .parse()
        .map_err(ApiError::InvalidRequest)?;
    let symbol = market_symbol(&currency, &pair);
    let engine = state.exchange.engine(kind);
    if !engine.has_market(&symbol) {
        return Err(ApiError::MarketNotFound(symbol));
    }

    let bars = engine.ohlc().get_bars(
        &symbol,
        interval,
        query.from,
        query.to,
        query.limit.unwrap_or(DEFAULT_BARS_LIMIT),
    );
    Ok(Json(OhlcResponse {
        symbol,
        interval: interval.to_string(),
        bars,
    }))
}

// ============================================================================
// Orders
// ============================================================================

/// Places an order for the key's user.
#[utoipa::path(
    post,
    path = "/api/v1/{kind}/orders",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`")
    ),
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = PlaceOrderResponse),
        (status = 400, description = "Invalid order or insufficient funds"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "Unknown market or wallet")
    ),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(kind): Path<MarketKind>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlaceOrderResponse>), ApiError> {
    auth.require(Permission::Trade)?;
    let user_id = auth.user_id()?;
    let placement = state.exchange.place_order(kind, user_id, req)?;
    Ok((
        StatusCode::CREATED,
        Json(PlaceOrderResponse {
            order: placement.order,
            trades: placement.trades,
        }),
    ))
}

/// Lists the key's orders.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/orders",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`"),
        ("symbol" = Option<String>, Query, description = "Market symbol"),
        ("status" = Option<String>, Query, description = "Order status"),
        ("side" = Option<String>, Query, description = "buy or sell"),
        ("page" = Option<usize>, Query, description = "1-based page"),
        ("per_page" = Option<usize>, Query, description = "Page size"),
        ("sort_field" = Option<String>, Query, description = "created_at, price, amount or filled"),
        ("sort_order" = Option<String>, Query, description = "asc or desc")
    ),
    responses(
        (status = 200, description = "A page of orders", body = OrderPage)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(kind): Path<MarketKind>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<OrderPage>, ApiError> {
    auth.require(Permission::Trade)?;
    let user_id = auth.user_id()?;
    state.exchange.list_orders(kind, user_id, &query).map(Json)
}

/// Fetches one of the key's orders.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/orders/{order_id}",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`"),
        ("order_id" = Uuid, Path, description = "Order identifier")
    ),
    responses(
        (status = 200, description = "Order", body = Order),
        (status = 404, description = "Unknown order")
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path((kind, order_id)): Path<(MarketKind, Uuid)>,
) -> Result<Json<Order>, ApiError> {
    auth.require(Permission::Trade)?;
    let user_id = auth.user_id()?;
    state.exchange.get_order(kind, user_id, order_id).map(Json)
}

/// Cancels one of the key's open orders.
#[utoipa::path(
    delete,
    path = "/api/v1/{kind}/orders/{order_id}",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`"),
        ("order_id" = Uuid, Path, description = "Order identifier")
    ),
    responses(
        (status = 200, description = "Canceled order", body = Order),
        (status = 404, description = "Unknown order"),
        (status = 409, description = "Order already closed")
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path((kind, order_id)): Path<(MarketKind, Uuid)>,
) -> Result<Json<Order>, ApiError> {
    auth.require(Permission::Trade)?;
    let user_id = auth.user_id()?;
    state.exchange.cancel_order(kind, user_id, order_id).map(Json)
}

/// Futures positions of the key's user.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/positions",
    params(
        ("kind" = String, Path, description = "Must be `futures`")
    ),
    responses(
        (status = 200, description = "Positions", body = Vec<Position>),
        (status = 400, description = "Spot markets have no positions")
    ),
    tag = "Orders"
)]
pub async fn list_positions(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(kind): Path<MarketKind>,
) -> Result<Json<Vec<Position>>, ApiError> {
    auth.require(Permission::Trade)?;
    let user_id = auth.user_id()?;
    if kind != MarketKind::Futures {
        return Err(ApiError::InvalidRequest(
            "positions only exist on futures markets".to_string(),
        ));
    }
    Ok(Json(state.exchange.list_positions(user_id)))
}
