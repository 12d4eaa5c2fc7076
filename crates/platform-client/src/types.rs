//! Request and response types for the platform API.
//!
//! Decimal amounts travel as strings and are kept that way here, so the
//! client never rounds a value it did not compute.

use serde::{Deserialize, Serialize};


/// Market family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    /// Spot markets settled in ECO wallets.
    Ecosystem,
    /// Margin markets settled in FUTURES wallets.
    Futures,
}

impl MarketKind {
    /// Path segment of this family.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ecosystem => "ecosystem",
            Self::Futures => "futures",
        }
    }
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side for trading operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Rests in the book at its limit price.
    Limit,
    /// Takes liquidity immediately.
    Market,
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Resting with no fills.
    Active,
    /// Partially filled and resting.
    Partial,
    /// Completely filled.
    Filled,
    /// Canceled.
    Canceled,
    /// Rejected.
    Rejected,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

// ============================================================================
// Health & Stats
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Platform-wide counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Registered users.
    pub users: usize,
    /// Wallets.
    pub wallets: usize,
    /// Listed ecosystem markets.
    pub ecosystem_markets: usize,
    /// Listed futures markets.
    pub futures_markets: usize,
    /// Orders resting in any book.
    pub open_orders: usize,
    /// Tracked orders.
    pub tracked_orders: usize,
    /// Connected websocket clients.
    pub websocket_clients: usize,
}

// ============================================================================
// API keys
// ============================================================================

/// Permission granted to an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Read admin resources.
    Read,
    /// Create and update admin resources.
    Write,
    /// Delete admin resources.
    Delete,
    /// Place and cancel orders.
    Trade,
    /// Everything.
    Admin,
}

/// Public view of an API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyInfo {
    /// Key identifier.
    pub key_id: String,
    /// Human-readable name.
    pub name: String,
    /// Granted permissions.
    pub permissions: Vec<Permission>,
    /// Requests per minute.
    pub rate_limit: u32,
    /// User the key trades for.
    pub user_id: Option<String>,
    /// Creation time in milliseconds.
    pub created_at: u64,
    /// Last use in milliseconds.
    pub last_used_at: Option<u64>,
}

/// Request to create an API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiKeyRequest {
    /// Human-readable name.
    pub name: String,
    /// Granted permissions.
    pub permissions: Vec<Permission>,
    /// Requests per minute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
    /// User the key trades for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Freshly created key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiKeyResponse {
    /// Raw key, shown once.
    pub api_key: String,
    /// Stored key details.
    pub key: ApiKeyInfo,
}

// ============================================================================
// Admin resources
// ============================================================================

/// Plain confirmation body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
    /// Number of records affected.
    pub count: usize,
}

/// Pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Records matching the query.
    pub total_items: usize,
    /// Current page (1-based).
    pub current_page: usize,
    /// Page size.
    pub per_page: usize,
    /// Number of pages.
    pub total_pages: usize,
}

/// A page of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// Records in this page.
    pub items: Vec<T>,
    /// Pagination metadata.
    pub pagination: Pagination,
}

/// Query parameters of admin list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// 1-based page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<usize>,
    /// Field to sort by.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,
    /// Sort direction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    /// Free-text search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// JSON object of equality filters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Ids of a bulk operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkIdsRequest {
    /// Record ids.
    pub ids: Vec<String>,
}

/// New status for one or more records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest<S> {
    /// Record ids (bulk routes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Status to set.
    pub status: S,
}

// ============================================================================
// Market data
// ============================================================================

/// A tradable market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSummary {
    /// Market symbol.
    pub symbol: String,
    /// Base currency.
    pub currency: String,
    /// Quote currency.
    pub pair: String,
    /// Trending flag.
    pub is_trending: bool,
    /// Hot flag.
    pub is_hot: bool,
    /// Taker fee rate.
    pub taker_fee: String,
    /// Maker fee rate.
    pub maker_fee: String,
    /// Smallest order amount.
    pub min_amount: String,
    /// Largest leverage (futures only).
    pub max_leverage: Option<u32>,
}

/// One aggregated price level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price.
    pub price: String,
    /// Total open amount.
    pub amount: String,
    /// Orders at this price.
    pub order_count: usize,
}

/// Aggregated depth of a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// Market symbol.
    pub symbol: String,
    /// Bids, best first.
    pub bids: Vec<PriceLevel>,
    /// Asks, best first.
    pub asks: Vec<PriceLevel>,
    /// Snapshot time (RFC 3339).
    pub timestamp: String,
}

/// 24h market statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    /// Market symbol.
    pub symbol: String,
    /// Last traded price.
    pub last: Option<String>,
    /// Window open.
    pub open: Option<String>,
    /// Window high.
    pub high: Option<String>,
    /// Window low.
    pub low: Option<String>,
    /// Best bid.
    pub bid: Option<String>,
    /// Best ask.
    pub ask: Option<String>,
    /// Base volume.
    pub base_volume: String,
    /// Quote volume.
    pub quote_volume: String,
    /// Change in percent.
    pub change: String,
    /// Computation time.
    pub timestamp: String,
}

/// An execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Trade identifier.
    pub id: String,
    /// Market symbol.
    pub symbol: String,
    /// Execution price.
    pub price: String,
    /// Executed amount.
    pub amount: String,
    /// Taker side.
    pub side: OrderSide,
    /// Taker order.
    pub taker_order_id: String,
    /// Maker order.
    pub maker_order_id: String,
    /// Taker owner.
    pub taker_user_id: String,
    /// Maker owner.
    pub maker_user_id: String,
    /// Execution time.
    pub timestamp: String,
}

/// Query parameters of the chart endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartParams {
    /// Bar interval (1m, 5m, 15m, 1h, 4h, 1d).
    pub interval: String,
    /// Start timestamp in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
    /// End timestamp in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<i64>,
    /// Maximum bars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl ChartParams {
    /// Every bar of an interval.
    #[must_use]
    pub fn interval(interval: &str) -> Self {
        Self {
            interval: interval.to_string(),
            from: None,
            to: None,
            limit: None,
        }
    }
}

/// A candlestick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcBar {
    /// Bar start in seconds.
    pub timestamp: i64,
    /// Open.
    pub open: String,
    /// High.
    pub high: String,
    /// Low.
    pub low: String,
    /// Close.
    pub close: String,
    /// Base volume.
    pub volume: String,
    /// Trades in the bar.
    pub trade_count: u64,
}

/// Chart response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcResponse {
    /// Market symbol.
    pub symbol: String,
    /// Bar interval.
    pub interval: String,
    /// Bars, oldest first.
    pub bars: Vec<OhlcBar>,
}

// ============================================================================
// Orders
// ============================================================================

/// An exchange order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: String,
    /// Owner.
    pub user_id: String,
    /// Market symbol.
    pub symbol: String,
    /// Side.
    pub side: OrderSide,
    /// Type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Limit price.
    pub price: Option<String>,
    /// Ordered amount.
    pub amount: String,
    /// Filled amount.
    pub filled: String,
    /// Open amount.
    pub remaining: String,
    /// Quote exchanged.
    pub cost: String,
    /// Fees charged.
    pub fee: String,
    /// Fee currency.
    pub fee_currency: String,
    /// Leverage (futures only).
    pub leverage: Option<u32>,
    /// Funds still reserved.
    pub reserved: String,
    /// Status.
    pub status: OrderStatus,
    /// Creation time.
    pub created_at: String,
    /// Last update time.
    pub updated_at: String,
}

/// Request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Base currency.
    pub currency: String,
    /// Quote currency.
    pub pair: String,
    /// Side.
    pub side: OrderSide,
    /// Type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// Amount in the base currency.
    pub amount: String,
    /// Leverage (futures only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leverage: Option<u32>,
}

impl PlaceOrderRequest {
    /// A limit order.
    #[must_use]
    pub fn limit(currency: &str, pair: &str, side: OrderSide, price: &str, amount: &str) -> Self {
        Self {
            currency: currency.to_string(),
            pair: pair.to_string(),
            side,
            order_type: OrderType::Limit,
            price: Some(price.to_string()),
            amount: amount.to_string(),
            leverage: None,
        }
    }

    /// A market order. Market buys need a price cap.
    #[must_use]
    pub fn market(
        currency: &str,
        pair: &str,
        side: OrderSide,
        price_cap: Option<&str>,
        amount: &str,
    ) -> Self {
        Self {
            currency: currency.to_string(),
            pair: pair.to_string(),
            side,
            order_type: OrderType::Market,
            price: price_cap.map(str::to_string),
            amount: amount.to_string(),
            leverage: None,
        }
    }

    /// Sets the leverage of a futures order.
    #[must_use]
    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = Some(leverage);
        self
    }
}

/// Result of placing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderResponse {
    /// The order after matching.
    pub order: Order,
    /// Trades it executed.
    pub trades: Vec<Trade>,
}

/// Order query parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQuery {
    /// Market symbol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Status (`open`, `closed`, `canceled`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<OrderSide>,
    /// 1-based page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<usize>,
    /// `created_at`, `price`, `amount` or `filled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,
    /// Sort direction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

/// A page of orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    /// Orders in this page.
    pub items: Vec<Order>,
    /// Pagination metadata.
    pub pagination: Pagination,
}

/// A futures position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Owner.
    pub user_id: String,
    /// Market symbol.
    pub symbol: String,
    /// Signed size.
    pub size: String,
    /// Average entry price.
    pub entry_price: String,
    /// Locked margin.
    pub margin: String,
    /// Leverage.
    pub leverage: u32,
    /// Realized P&L.
    pub realized_pnl: String,
    /// Creation time.
    pub created_at: String,
    /// Last update time.
    pub updated_at: String,
}
