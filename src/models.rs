//! Request and response models for the exchange API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ============================================================================
// Orders
// ============================================================================

/// Order side for trading operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// The side an order of this side matches against.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Rests in the book at its limit price.
    Limit,
    /// Takes liquidity immediately; never rests.
    Market,
}

/// Order status in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order is resting in the book with no fills.
    Active,
    /// Order is partially filled and still resting.
    Partial,
    /// Order is completely filled.
    Filled,
    /// Order was canceled (including unfilled market remainders).
    Canceled,
    /// Order was rejected before reaching the book.
    Rejected,
}

impl OrderStatus {
    /// Whether the order can still trade.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Partial)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Partial => write!(f, "partial"),
            Self::Filled => write!(f, "filled"),
            Self::Canceled => write!(f, "canceled"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" | "open" => Ok(Self::Active),
            "partial" => Ok(Self::Partial),
            "filled" | "closed" => Ok(Self::Filled),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

/// An exchange order as tracked by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    /// Unique order identifier.
    pub id: Uuid,
    /// Owner.
    pub user_id: Uuid,
    /// Market symbol (`CURRENCY/PAIR`).
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Limit price, or price cap for market orders.
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    /// Ordered amount in the base currency.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Filled amount.
    #[schema(value_type = String)]
    pub filled: Decimal,
    /// Amount still open.
    #[schema(value_type = String)]
    pub remaining: Decimal,
    /// Quote currency exchanged so far.
    #[schema(value_type = String)]
    pub cost: Decimal,
    /// Fees charged so far.
    #[schema(value_type = String)]
    pub fee: Decimal,
    /// Currency the fee is charged in.
    pub fee_currency: String,
    /// Leverage (futures only).
    pub leverage: Option<u32>,
    /// Funds reserved for this order and not yet spent.
    #[schema(value_type = String)]
    pub reserved: Decimal,
    /// Current status.
    pub status: OrderStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Average execution price, if anything filled.
    #[must_use]
    pub fn average_price(&self) -> Option<Decimal> {
        if self.filled.is_zero() {
            None
        } else {
            Some(self.cost / self.filled)
        }
    }
}

/// Request to place an order.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PlaceOrderRequest {
    /// Base currency.
    pub currency: String,
    /// Quote currency.
    pub pair: String,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Limit price (required for limit orders and market buys).
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    /// Amount in the base currency.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Leverage (futures only, default 1).
    #[serde(default)]
    pub leverage: Option<u32>,
}

/// Response after placing an order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderResponse {
    /// The order after matching.
    pub order: Order,
    /// Trades executed while placing it.
    pub trades: Vec<Trade>,
}

/// Sort field for order listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderSortField {
    /// Creation time (default).
    #[default]
    CreatedAt,
    /// Limit price.
    Price,
    /// Ordered amount.
    Amount,
    /// Filled amount.
    Filled,
}

/// Query parameters for listing orders.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct OrderQuery {
    /// Filter by market symbol (`CURRENCY/PAIR`).
    #[serde(default)]
    pub symbol: Option<String>,
    /// Filter by status.
    #[serde(default)]
    pub status: Option<String>,
    /// Filter by side.
    #[serde(default)]
    pub side: Option<OrderSide>,
    /// 1-based page (default 1).
    #[serde(default)]
    pub page: Option<usize>,
    /// Page size (default 10, max 100).
    #[serde(default)]
    pub per_page: Option<usize>,
    /// Sort field.
    #[serde(default)]
    pub sort_field: Option<OrderSortField>,
    /// Sort direction (`asc` or `desc`, default `desc`).
    #[serde(default)]
    pub sort_order: Option<crate::store::SortOrder>,
}

/// A page of orders.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderPage {
    /// Orders in this page.
    pub items: Vec<Order>,
    /// Pagination metadata.
    pub pagination: crate::store::Pagination,
}

// ============================================================================
// Trades, books and tickers
// ============================================================================

/// An execution between a taker and a resting maker order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Trade {
    /// Unique trade identifier.
    pub id: Uuid,
    /// Market symbol.
    pub symbol: String,
    /// Execution price (the maker's price).
    #[schema(value_type = String)]
    pub price: Decimal,
    /// Executed amount.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Side of the taker.
    pub side: OrderSide,
    /// Taker order.
    pub taker_order_id: Uuid,
    /// Maker order.
    pub maker_order_id: Uuid,
    /// Taker owner.
    pub taker_user_id: Uuid,
    /// Maker owner.
    pub maker_user_id: Uuid,
    /// Execution time.
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// `price * amount`.
    #[must_use]
    pub fn quote_amount(&self) -> Decimal {
        self.price * self.amount
    }
}

/// One aggregated price level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceLevel {
    /// Level price.
    #[schema(value_type = String)]
    pub price: Decimal,
    /// Total open amount at this price.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Number of orders at this price.
    pub order_count: usize,
}

/// Aggregated depth of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderBookSnapshot {
    /// Market symbol.
    pub symbol: String,
    /// Bids, best (highest) first.
    pub bids: Vec<PriceLevel>,
    /// Asks, best (lowest) first.
    pub asks: Vec<PriceLevel>,
    /// Snapshot time.
    pub timestamp: DateTime<Utc>,
}

/// 24h market statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Ticker {
    /// Market symbol.
    pub symbol: String,
    /// Last traded price.
    #[schema(value_type = Option<String>)]
    pub last: Option<Decimal>,
    /// First traded price in the window.
    #[schema(value_type = Option<String>)]
    pub open: Option<Decimal>,
    /// Highest price in the window.
    #[schema(value_type = Option<String>)]
    pub high: Option<Decimal>,
    /// Lowest price in the window.
    #[schema(value_type = Option<String>)]
    pub low: Option<Decimal>,
    /// Best bid.
    #[schema(value_type = Option<String>)]
    pub bid: Option<Decimal>,
    /// Best ask.
    #[schema(value_type = Option<String>)]
    pub ask: Option<Decimal>,
    /// Base currency volume in the window.
    #[schema(value_type = String)]
    pub base_volume: Decimal,
    /// Quote currency volume in the window.
    #[schema(value_type = String)]
    pub quote_volume: Decimal,
    /// Change from `open` to `last` in percent.
    #[schema(value_type = String)]
    pub change: Decimal,
    /// Computation time.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Positions
// ============================================================================

/// Futures position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    /// Positive size.
    Long,
    /// Negative size.
    Short,
    /// Zero size.
    Flat,
}

/// A futures position of one user in one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Position {
    /// Owner.
    pub user_id: Uuid,
    /// Market symbol.
    pub symbol: String,
    /// Signed size (positive = long, negative = short).
    #[schema(value_type = String)]
    pub size: Decimal,
    /// Average entry price.
    #[schema(value_type = String)]
    pub entry_price: Decimal,
    /// Margin locked by the open size.
    #[schema(value_type = String)]
    pub margin: Decimal,
    /// Leverage of the latest opening fill.
    pub leverage: u32,
    /// Realized P&L.
    #[schema(value_type = String)]
    pub realized_pnl: Decimal,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Result of applying one fill to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionChange {
    /// P&L realized by the closing part of the fill.
    pub realized_pnl: Decimal,
    /// Margin released by the closing part of the fill.
    pub released_margin: Decimal,
    /// Margin newly locked by the opening part of the fill.
    pub locked_margin: Decimal,
}

impl Position {
    /// Creates a flat position.
    #[must_use]
    pub fn new(user_id: Uuid, symbol: String, leverage: u32, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            symbol,
            size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            margin: Decimal::ZERO,
            leverage,
            realized_pnl: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current side.
    #[must_use]
    pub fn side(&self) -> PositionSide {
        if self.size > Decimal::ZERO {
            PositionSide::Long
        } else if self.size < Decimal::ZERO {
            PositionSide::Short
        } else {
            PositionSide::Flat
        }
    }

    /// Applies a fill of signed `fill_size` at `price` carrying `fill_margin`.
    ///
    /// Fills in the direction of the position increase it and average the
    /// entry price. Opposite fills close up to the open size, realizing P&L
    /// and releasing the proportional margin; any excess opens a new position
    /// in the other direction at the fill price.
    pub fn apply_fill(
        &mut self,
        fill_size: Decimal,
        price: Decimal,
        fill_margin: Decimal,
        leverage: u32,
        now: DateTime<Utc>,
    ) -> PositionChange {
        let mut change = PositionChange {
            realized_pnl: Decimal::ZERO,
            released_margin: Decimal::ZERO,
            locked_margin: Decimal::ZERO,
        };
        self.updated_at = now;

        let same_direction = self.size.is_zero()
            || (self.size > Decimal::ZERO) == (fill_size > Decimal::ZERO);

        if same_direction {
            let old_value = self.entry_price * self.size.abs();
            let new_value = price * fill_size.abs();
            let total = self.size.abs() + fill_size.abs();
            if !total.is_zero() {
                self.entry_price = (old_value + new_value) / total;
            }
            self.size += fill_size;
            self.margin += fill_margin;
            self.leverage = leverage;
            change.locked_margin = fill_margin;
            return change;
        }

        let open = self.size.abs();
        let closing = fill_size.abs().min(open);
        let direction = if self.size > Decimal::ZERO {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        };
        change.realized_pnl = (price - self.entry_price) * closing * direction;
        change.released_margin = self.margin * closing / open;

        self.realized_pnl += change.realized_pnl;
        self.margin -= change.released_margin;
        self.size += fill_size;

        let opening = fill_size.abs() - closing;
        if opening > Decimal::ZERO {
            // Flipped: the excess opens at the fill price with its share of margin.
            self.entry_price = price;
            self.margin = fill_margin * opening / fill_size.abs();
            self.leverage = leverage;
            change.locked_margin = self.margin;
        } else if self.size.is_zero() {
            self.entry_price = Decimal::ZERO;
            self.margin = Decimal::ZERO;
        }
        change
    }

    /// Unrealized P&L at `mark_price`.
    #[must_use]
    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        (mark_price - self.entry_price) * self.size
    }
}

// ============================================================================
// Candles
// ============================================================================

/// OHLC bar interval for candlestick data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum OhlcInterval {
    /// 1 minute bars.
    #[serde(rename = "1m")]
    OneMinute,
    /// 5 minute bars.
    #[serde(rename = "5m")]
    FiveMinutes,
    /// 15 minute bars.
    #[serde(rename = "15m")]
    FifteenMinutes,
    /// 1 hour bars.
    #[serde(rename = "1h")]
    OneHour,
    /// 4 hour bars.
    #[serde(rename = "4h")]
    FourHours,
    /// 1 day bars.
    #[serde(rename = "1d")]
    OneDay,
}

impl OhlcInterval {
    /// Every supported interval.
    pub const ALL: [Self; 6] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::OneHour,
        Self::FourHours,
        Self::OneDay,
    ];

    /// Returns the interval duration in seconds.
    #[must_use]
    pub fn seconds(&self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::OneHour => 3600,
            Self::FourHours => 14400,
            Self::OneDay => 86400,
        }
    }

    /// Floors a timestamp to the start of the interval.
    #[must_use]
    pub fn floor_timestamp(&self, timestamp_secs: i64) -> i64 {
        timestamp_secs - timestamp_secs.rem_euclid(self.seconds())
    }
}

impl std::fmt::Display for OhlcInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneMinute => write!(f, "1m"),
            Self::FiveMinutes => write!(f, "5m"),
            Self::FifteenMinutes => write!(f, "15m"),
            Self::OneHour => write!(f, "1h"),
            Self::FourHours => write!(f, "4h"),
            Self::OneDay => write!(f, "1d"),
        }
    }
}

impl std::str::FromStr for OhlcInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "1h" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "1d" => Ok(Self::OneDay),
            _ => Err(format!(
                "Invalid interval: {}. Use 1m, 5m, 15m, 1h, 4h, or 1d",
                s
            )),
        }
    }
}

/// A single OHLC bar (candlestick).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OhlcBar {
    /// Bar start timestamp in seconds since epoch.
    pub timestamp: i64,
    /// Opening price.
    #[schema(value_type = String)]
    pub open: Decimal,
    /// Highest price.
    #[schema(value_type = String)]
    pub high: Decimal,
    /// Lowest price.
    #[schema(value_type = String)]
    pub low: Decimal,
    /// Closing price.
    #[schema(value_type = String)]
    pub close: Decimal,
    /// Base volume traded in this bar.
    #[schema(value_type = String)]
    pub volume: Decimal,
    /// Number of trades in this bar.
    pub trade_count: u64,
}

impl OhlcBar {
    /// Creates a new OHLC bar from a single trade.
    #[must_use]
    pub fn new(timestamp: i64, price: Decimal, amount: Decimal) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: amount,
            trade_count: 1,
        }
    }

    /// Updates the bar with a new trade.
    pub fn update(&mut self, price: Decimal, amount: Decimal) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += amount;
        self.trade_count += 1;
    }
}

/// Query parameters for the chart endpoint.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OhlcQuery {
    /// Bar interval (1m, 5m, 15m, 1h, 4h, 1d).
    pub interval: String,
    /// Start timestamp in seconds (optional).
    #[serde(default)]
    pub from: Option<i64>,
    /// End timestamp in seconds (optional).
    #[serde(default)]
    pub to: Option<i64>,
    /// Maximum number of bars to return (default 500).
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Response for the chart endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OhlcResponse {
    /// Market symbol.
    pub symbol: String,
    /// Bar interval.
    pub interval: String,
    /// Bars, oldest first.
    pub bars: Vec<OhlcBar>,
}

// ============================================================================
// Service
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// A tradable market as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
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
    #[schema(value_type = String)]
    pub taker_fee: Decimal,
    /// Maker fee rate.
    #[schema(value_type = String)]
    pub maker_fee: Decimal,
    /// Smallest order amount.
    #[schema(value_type = String)]
    pub min_amount: Decimal,
    /// Largest leverage (futures only).
    pub max_leverage: Option<u32>,
}

/// Plain confirmation body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
    /// Number of records affected.
    pub count: usize,
}

/// Ids of a bulk operation.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct BulkIdsRequest {
    /// Record ids.
    pub ids: Vec<Uuid>,
}

/// New status for several records.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkStatusRequest<S> {
    /// Record ids.
    pub ids: Vec<Uuid>,
    /// Status to set.
    pub status: S,
}

/// New status for one record.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusRequest<S> {
    /// Status to set.
    pub status: S,
}

/// Platform-wide counters.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
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
    /// Tracked orders (open and closed).
    pub tracked_orders: usize,
    /// Connected websocket clients.
    pub websocket_clients: usize,
}

// ============================================================================
// API keys
// ============================================================================

/// Permission granted to an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Read admin resources.
    Read,
    /// Create and update admin resources.
    Write,
    /// Delete admin resources.
    Delete,
    /// Place and cancel orders for the key's user.
    Trade,
    /// Everything, including key management.
    Admin,
}

/// Public view of an API key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
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
    pub user_id: Option<Uuid>,
    /// Creation time in milliseconds.
    pub created_at: u64,
    /// Last use in milliseconds.
    pub last_used_at: Option<u64>,
}

/// Request to create an API key.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CreateApiKeyRequest {
    /// Human-readable name.
    pub name: String,
    /// Granted permissions.
    pub permissions: Vec<Permission>,
    /// Requests per minute (defaults to the configured limit).
    #[serde(default)]
    pub rate_limit: Option<u32>,
    /// User the key trades for.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// Response carrying a freshly created key. The raw key is shown once.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateApiKeyResponse {
    /// Raw key to send in `X-API-Key`.
    pub api_key: String,
    /// Stored key details.
    pub key: ApiKeyInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::new(Uuid::new_v4(), "BTC/USDT".to_string(), 10, Utc::now())
    }

    #[test]
    fn test_position_open_and_average() {
        let mut p = position();
        p.apply_fill(dec!(1), dec!(100), dec!(10), 10, Utc::now());
        p.apply_fill(dec!(1), dec!(200), dec!(20), 10, Utc::now());
        assert_eq!(p.size, dec!(2));
        assert_eq!(p.entry_price, dec!(150));
        assert_eq!(p.margin, dec!(30));
        assert_eq!(p.side(), PositionSide::Long);
    }

    #[test]
    fn test_position_partial_close_realizes_pnl() {
        let mut p = position();
        p.apply_fill(dec!(2), dec!(100), dec!(20), 10, Utc::now());
        let change = p.apply_fill(dec!(-1), dec!(130), dec!(13), 10, Utc::now());
        assert_eq!(change.realized_pnl, dec!(30));
        assert_eq!(change.released_margin, dec!(10));
        assert_eq!(p.size, dec!(1));
        assert_eq!(p.margin, dec!(10));
        assert_eq!(p.entry_price, dec!(100));
    }

    #[test]
    fn test_short_close_and_flip() {
        let mut p = position();
        p.apply_fill(dec!(-1), dec!(100), dec!(10), 10, Utc::now());
        let change = p.apply_fill(dec!(3), dec!(90), dec!(27), 10, Utc::now());
        assert_eq!(change.realized_pnl, dec!(10));
        assert_eq!(change.released_margin, dec!(10));
        assert_eq!(p.size, dec!(2));
        assert_eq!(p.entry_price, dec!(90));
        assert_eq!(p.margin, dec!(18));
        assert_eq!(change.locked_margin, dec!(18));
        assert_eq!(p.side(), PositionSide::Long);
    }

    #[test]
    fn test_full_close_resets_position() {
        let mut p = position();
        p.apply_fill(dec!(1), dec!(100), dec!(10), 10, Utc::now());
        p.apply_fill(dec!(-1), dec!(90), dec!(9), 10, Utc::now());
        assert_eq!(p.side(), PositionSide::Flat);
        assert_eq!(p.realized_pnl, dec!(-10));
        assert_eq!(p.margin, Decimal::ZERO);
        assert_eq!(p.unrealized_pnl(dec!(50)), Decimal::ZERO);
    }

    #[test]
    fn test_interval_parse_and_floor() {
        assert_eq!("4H".parse::<OhlcInterval>().unwrap(), OhlcInterval::FourHours);
        assert!("2m".parse::<OhlcInterval>().is_err());
        assert_eq!(
            OhlcInterval::FiveMinutes.floor_timestamp(1704067265),
            1704067200
        );
    }

    #[test]
    fn test_order_status_parse() {
        assert_eq!("cancelled".parse::<OrderStatus>().unwrap(), OrderStatus::Canceled);
        assert!(OrderStatus::Partial.is_open());
        assert!(!OrderStatus::Filled.is_open());
    }
}
