//! Order workflow for ecosystem (spot) and futures markets.
//!
//! Placing an order reserves funds in the owner's wallet, runs the order
//! through the market's engine and settles every resulting trade for both
//! counterparties before the store guard is released. Spot orders trade ECO
//! wallets; futures orders lock margin in the FUTURES wallet of the quote
//! currency and update the owner's position.

use crate::config::{MarketKind, OrdersConfig};
use crate::entities::markets::symbol_of;
use crate::entities::wallets::{Transaction, TransactionType, Wallet};
use crate::entities::{WalletType, require_positive};
use crate::error::ApiError;
use crate::ledger;
use crate::matching::{EngineEvent, MatchingEngine, MatchingError};
use crate::models::{
    Order, OrderPage, OrderQuery, OrderSide, OrderStatus, OrderType, PlaceOrderRequest, Position,
    Trade,
};
use crate::order_store::{OrderStore, PositionStore};
use crate::store::Store;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Trading parameters of a listed market.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketTerms {
    /// `CURRENCY/PAIR`.
    pub symbol: String,
    /// Base currency.
    pub currency: String,
    /// Quote currency.
    pub pair: String,
    /// Fee rate paid by takers.
    pub taker_fee: Decimal,
    /// Fee rate paid by makers.
    pub maker_fee: Decimal,
    /// Smallest order amount.
    pub min_amount: Decimal,
    /// Largest leverage (1 for spot).
    pub max_leverage: u32,
    /// Whether the listing is enabled.
    pub enabled: bool,
}

impl MarketTerms {
    /// Reads the listing of `symbol` from the store.
    #[must_use]
    pub fn lookup(store: &Store, kind: MarketKind, symbol: &str) -> Option<Self> {
        let (currency, pair) = split_symbol(symbol);
        match kind {
            MarketKind::Ecosystem => store
                .ecosystem_markets
                .find(|m| m.currency == currency && m.pair == pair)
                .map(|m| Self {
                    symbol: m.symbol(),
                    currency: m.currency,
                    pair: m.pair,
                    taker_fee: m.taker_fee,
                    maker_fee: m.maker_fee,
                    min_amount: m.min_amount,
                    max_leverage: 1,
                    enabled: m.status,
                }),
            MarketKind::Futures => store
                .futures_markets
                .find(|m| m.currency == currency && m.pair == pair)
                .map(|m| Self {
                    symbol: m.symbol(),
                    currency: m.currency,
                    pair: m.pair,
                    taker_fee: m.taker_fee,
                    maker_fee: m.maker_fee,
                    min_amount: m.min_amount,
                    max_leverage: m.max_leverage,
                    enabled: m.status,
                }),
        }
    }
}

/// Splits `CURRENCY/PAIR`.
#[must_use]
pub fn split_symbol(symbol: &str) -> (&str, &str) {
    symbol.split_once('/').unwrap_or((symbol, ""))
}

/// Result of placing an order.
#[derive(Debug, Clone)]
pub struct Placement {
    /// The placed order after matching and settlement.
    pub order: Order,
    /// Trades it executed.
    pub trades: Vec<Trade>,
    /// Resting orders it filled, after settlement.
    pub makers: Vec<Order>,
}

/// Engine plus order records for one market kind.
pub struct Venue {
    /// Matching engine.
    pub engine: MatchingEngine,
    /// Orders placed on this venue.
    pub orders: OrderStore,
}

impl Venue {
    fn new(kind: MarketKind, orders: OrderStore) -> Self {
        Self {
            engine: MatchingEngine::new(kind),
            orders,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liquidity {
    Taker,
    Maker,
}

/// Trading front door over both venues.
pub struct Exchange {
    store: Arc<Store>,
    ecosystem: Venue,
    futures: Venue,
    positions: PositionStore,
}

impl Exchange {
    /// Creates an exchange without order cleanup.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            ecosystem: Venue::new(MarketKind::Ecosystem, OrderStore::new()),
            futures: Venue::new(MarketKind::Futures, OrderStore::new()),
            positions: PositionStore::new(),
        }
    }

    /// Creates an exchange whose order stores drop old closed orders.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn with_cleanup(store: Arc<Store>, config: &OrdersConfig) -> Self {
        Self {
            store,
            ecosystem: Venue::new(MarketKind::Ecosystem, OrderStore::with_cleanup(config.clone())),
            futures: Venue::new(MarketKind::Futures, OrderStore::with_cleanup(config.clone())),
            positions: PositionStore::new(),
        }
    }

    /// The venue of a market kind.
    #[must_use]
    pub fn venue(&self, kind: MarketKind) -> &Venue {
        match kind {
            MarketKind::Ecosystem => &self.ecosystem,
            MarketKind::Futures => &self.futures,
        }
    }

    /// The engine of a market kind.
    #[must_use]
    pub fn engine(&self, kind: MarketKind) -> &MatchingEngine {
        &self.venue(kind).engine
    }

    /// Futures positions.
    #[must_use]
    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    /// Registers every listed market with its engine.
    pub fn sync_markets(&self) {
        for market in self.store.ecosystem_markets.values() {
            self.ecosystem.engine.add_market(&market.symbol(), market.status);
        }
        for market in self.store.futures_markets.values() {
            self.futures.engine.add_market(&market.symbol(), market.status);
        }
        info!(
            ecosystem = self.ecosystem.engine.markets().len(),
            futures = self.futures.engine.markets().len(),
            "markets synchronised with engines"
        );
    }

    /// Registers or re-flags one market.
    pub fn list_market(&self, kind: MarketKind, symbol: &str, enabled: bool) {
        self.engine(kind).add_market(symbol, enabled);
    }

    /// Unregisters a market; a market the engine never knew is a no-op.
    ///
    /// # Errors
    /// `Conflict` while orders rest in its book.
    pub fn unlist_market(&self, kind: MarketKind, symbol: &str) -> Result<(), ApiError> {
        match self.engine(kind).remove_market(symbol) {
            Ok(()) | Err(MatchingError::UnknownMarket(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Checks that a market could be unlisted.
    ///
    /// # Errors
    /// `Conflict` while orders rest in its book.
    pub fn ensure_unlistable(&self, kind: MarketKind, symbol: &str) -> Result<(), ApiError> {
        if self.engine(kind).resting_orders(symbol) > 0 {
            return Err(MatchingError::OpenOrders(symbol.to_string()).into());
        }
        Ok(())
    }

    /// Places an order for `user_id`.
    ///
    /// # Errors
    /// `NotFound` for an unknown user or missing wallet, `MarketNotFound`,
    /// `Matching` for a disabled market, `InvalidRequest` for malformed
    /// orders and `InsufficientFunds` when the reservation cannot be made.
    pub fn place_order(
        &self,
        kind: MarketKind,
        user_id: Uuid,
        req: PlaceOrderRequest,
    ) -> Result<Placement, ApiError> {
        let currency = req.currency.trim().to_uppercase();
        let pair = req.pair.trim().to_uppercase();
        let symbol = symbol_of(&currency, &pair);
        let venue = self.venue(kind);

        let _guard = self.store.lock();
        self.store.require_user(user_id)?;
        let terms = MarketTerms::lookup(&self.store, kind, &symbol)
            .ok_or_else(|| ApiError::MarketNotFound(symbol.clone()))?;
        if !terms.enabled {
            return Err(MatchingError::MarketDisabled(symbol).into());
        }

        require_positive(req.amount, "amount")?;
        if req.amount < terms.min_amount {
            return Err(ApiError::InvalidRequest(format!(
                "amount {} is below the minimum {} for {}",
                req.amount, terms.min_amount, symbol
            )));
        }
        if let Some(price) = req.price {
            require_positive(price, "price")?;
        }
        if req.order_type == OrderType::Limit && req.price.is_none() {
            return Err(ApiError::InvalidRequest(
                "limit orders need a price".to_string(),
            ));
        }

        let leverage = match kind {
            MarketKind::Ecosystem => {
                if req.leverage.is_some_and(|l| l != 1) {
                    return Err(ApiError::InvalidRequest(
                        "leverage is only available on futures markets".to_string(),
                    ));
                }
                None
            }
            MarketKind::Futures => {
                let leverage = req.leverage.unwrap_or(1);
                if leverage == 0 || leverage > terms.max_leverage {
                    return Err(ApiError::InvalidRequest(format!(
                        "leverage must be between 1 and {}",
                        terms.max_leverage
                    )));
                }
                Some(leverage)
            }
        };

        let reservation = reservation_for(kind, &terms, req.side, req.price, req.amount, leverage)?;
        let (wallet_type, wallet_currency) = reservation_wallet(kind, &terms.currency, &terms.pair, req.side);
        let wallet = ledger::require_wallet(&self.store, user_id, wallet_type, wallet_currency)?;
        if kind == MarketKind::Ecosystem {
            let (receive_type, receive_currency) =
                reservation_wallet(kind, &terms.currency, &terms.pair, req.side.opposite());
            ledger::require_wallet(&self.store, user_id, receive_type, receive_currency)?;
        }
        ledger::ensure_available(&wallet, reservation)?;
        ledger::reserve(&self.store, wallet.id, reservation);

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            user_id,
            symbol: symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            amount: req.amount,
            filled: Decimal::ZERO,
            remaining: req.amount,
            cost: Decimal::ZERO,
            fee: Decimal::ZERO,
            fee_currency: fee_currency(kind, &terms, req.side).to_string(),
            leverage,
            reserved: reservation,
            status: OrderStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let outcome = match venue.engine.submit(order) {
            Ok(outcome) => outcome,
            Err(err) => {
                ledger::release(&self.store, wallet.id, reservation);
                return Err(err.into());
            }
        };

        let mut taker = outcome.order;
        let mut makers = Vec::with_capacity(outcome.trades.len());
        for trade in &outcome.trades {
            self.settle_fill(kind, &terms, &mut taker, trade, Liquidity::Taker);

            let Some(mut maker) = venue.orders.get(&trade.maker_order_id) else {
                warn!(order_id = %trade.maker_order_id, "filled maker order is not tracked");
                continue;
            };
            maker.filled += trade.amount;
            maker.remaining -= trade.amount;
            maker.cost += trade.quote_amount();
            maker.status = if maker.remaining.is_zero() {
                OrderStatus::Filled
            } else {
                OrderStatus::Partial
            };
            maker.updated_at = trade.timestamp;
            self.settle_fill(kind, &terms, &mut maker, trade, Liquidity::Maker);
            if !maker.status.is_open() {
                self.release_leftover(kind, &mut maker);
            }
            venue.orders.insert(maker.clone());
            makers.push(maker);
        }
        if !taker.status.is_open() {
            self.release_leftover(kind, &mut taker);
        }
        venue.orders.insert(taker.clone());

        info!(
            kind = ?kind,
            symbol = %taker.symbol,
            order_id = %taker.id,
            side = %taker.side,
            trades = outcome.trades.len(),
            status = %taker.status,
            "order placed"
        );
        venue.engine.publish(EngineEvent::OrderUpdated(taker.clone()));
        for maker in &makers {
            venue.engine.publish(EngineEvent::OrderUpdated(maker.clone()));
        }

        Ok(Placement {
            order: taker,
            trades: outcome.trades,
            makers,
        })
    }

    /// Cancels an open order of `user_id` and releases its reservation.
    ///
    /// # Errors
    /// `NotFound` if the order is unknown or owned by someone else,
    /// `Conflict` if it is no longer open.
    pub fn cancel_order(
        &self,
        kind: MarketKind,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<Order, ApiError> {
        let venue = self.venue(kind);
        let _guard = self.store.lock();
        let mut order = self.owned_order(kind, user_id, order_id)?;
        if !order.status.is_open() {
            return Err(ApiError::Conflict(format!(
                "order {} is already {}",
                order_id, order.status
            )));
        }

        venue.engine.cancel(&order.symbol, &order_id)?;
        order.status = OrderStatus::Canceled;
        order.updated_at = Utc::now();
        self.release_leftover(kind, &mut order);
        venue.orders.insert(order.clone());

        info!(kind = ?kind, order_id = %order_id, "order canceled");
        venue.engine.publish(EngineEvent::OrderUpdated(order.clone()));
        Ok(order)
    }

    /// Fetches an order of `user_id`.
    ///
    /// # Errors
    /// `NotFound` if the order is unknown or owned by someone else.
    pub fn get_order(
        &self,
        kind: MarketKind,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<Order, ApiError> {
        self.owned_order(kind, user_id, order_id)
    }

    /// Lists orders of `user_id`.
    ///
    /// # Errors
    /// `InvalidRequest` on an unknown status filter.
    pub fn list_orders(
        &self,
        kind: MarketKind,
        user_id: Uuid,
        query: &OrderQuery,
    ) -> Result<OrderPage, ApiError> {
        self.venue(kind).orders.query(Some(user_id), query)
    }

    /// Futures positions of `user_id`.
    #[must_use]
    pub fn list_positions(&self, user_id: Uuid) -> Vec<Position> {
        self.positions.list(user_id)
    }

    /// Orders resting in any book.
    #[must_use]
    pub fn open_order_count(&self) -> usize {
        self.ecosystem.engine.open_order_count() + self.futures.engine.open_order_count()
    }

    /// Orders tracked on both venues.
    #[must_use]
    pub fn tracked_order_count(&self) -> usize {
        self.ecosystem.orders.len() + self.futures.orders.len()
    }

    fn owned_order(&self, kind: MarketKind, user_id: Uuid, order_id: Uuid) -> Result<Order, ApiError> {
        self.venue(kind)
            .orders
            .get(&order_id)
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| ApiError::not_found("order", order_id))
    }

    /// Moves the funds of one fill for one side of a trade.
    fn settle_fill(
        &self,
        kind: MarketKind,
        terms: &MarketTerms,
        order: &mut Order,
        trade: &Trade,
        liquidity: Liquidity,
    ) {
        let rate = match liquidity {
            Liquidity::Taker => terms.taker_fee,
            Liquidity::Maker => terms.maker_fee,
        };
        let quote = trade.quote_amount();
        let user_id = order.user_id;

        let (receiving, fee, received) = match kind {
            MarketKind::Ecosystem => {
                let (pay_type, pay_currency) =
                    reservation_wallet(kind, &terms.currency, &terms.pair, order.side);
                let (receive_type, receive_currency) =
                    reservation_wallet(kind, &terms.currency, &terms.pair, order.side.opposite());
                let (spent, gross) = match order.side {
                    OrderSide::Buy => (quote, trade.amount),
                    OrderSide::Sell => (trade.amount, quote),
                };
                let fee = gross * rate;
                if let Some(wallet) = ledger::find_wallet(&self.store, user_id, pay_type, pay_currency) {
                    self.spend(&wallet, &mut order.reserved, spent);
                }
                let receiving =
                    ledger::find_wallet(&self.store, user_id, receive_type, receive_currency);
                if let Some(wallet) = &receiving {
                    ledger::credit(&self.store, wallet.id, gross - fee);
                }
                (receiving, fee, gross - fee)
            }
            MarketKind::Futures => {
                let leverage = order.leverage.unwrap_or(1).max(1);
                let signed = match order.side {
                    OrderSide::Buy => trade.amount,
                    OrderSide::Sell => -trade.amount,
                };
                let fee = quote * rate;
                let change = self.positions.apply_fill(
                    user_id,
                    &order.symbol,
                    signed,
                    trade.price,
                    quote / Decimal::from(leverage),
                    leverage,
                );
                let wallet =
                    ledger::find_wallet(&self.store, user_id, WalletType::Futures, &terms.pair);
                if let Some(wallet) = &wallet {
                    self.spend(wallet, &mut order.reserved, change.locked_margin + fee);
                    ledger::credit(&self.store, wallet.id, change.released_margin);
                    self.apply_pnl(wallet.id, change.realized_pnl);
                }
                (wallet, fee, quote)
            }
        };
        order.fee += fee;

        match receiving {
            Some(wallet) => {
                let mut tx = Transaction::completed(
                    &wallet,
                    TransactionType::Trade,
                    received,
                    Some(order.id),
                    format!("{} {} {} @ {}", order.side, trade.amount, order.symbol, trade.price),
                );
                tx.fee = fee;
                self.store.transactions.insert(tx.id, tx);
            }
            None => warn!(
                user_id = %user_id,
                order_id = %order.id,
                "settlement wallet disappeared; fill not credited"
            ),
        }
    }

    /// Spends `amount` out of an order's reservation, taking any shortfall
    /// from the available balance.
    fn spend(&self, wallet: &Wallet, reserved: &mut Decimal, amount: Decimal) {
        let from_reserved = amount.min(*reserved);
        ledger::consume_reserved(&self.store, wallet.id, from_reserved);
        *reserved -= from_reserved;

        let shortfall = amount - from_reserved;
        if shortfall > Decimal::ZERO {
            let available = self
                .store
                .wallets
                .get(&wallet.id)
                .map_or(Decimal::ZERO, |w| w.balance.max(Decimal::ZERO));
            ledger::debit(&self.store, wallet.id, shortfall.min(available));
        }
    }

    fn apply_pnl(&self, wallet_id: Uuid, pnl: Decimal) {
        if pnl > Decimal::ZERO {
            ledger::credit(&self.store, wallet_id, pnl);
        } else if pnl < Decimal::ZERO {
            let available = self
                .store
                .wallets
                .get(&wallet_id)
                .map_or(Decimal::ZERO, |w| w.balance.max(Decimal::ZERO));
            ledger::debit(&self.store, wallet_id, (-pnl).min(available));
        }
    }

    fn release_leftover(&self, kind: MarketKind, order: &mut Order) {
        if order.reserved <= Decimal::ZERO {
            return;
        }
        let (currency, pair) = split_symbol(&order.symbol);
        let (wallet_type, wallet_currency) = reservation_wallet(kind, currency, pair, order.side);
        if let Some(wallet) =
            ledger::find_wallet(&self.store, order.user_id, wallet_type, wallet_currency)
        {
            ledger::release(&self.store, wallet.id, order.reserved);
        }
        order.reserved = Decimal::ZERO;
    }
}

/// Wallet funding an order of `side`.
fn reservation_wallet<'a>(
    kind: MarketKind,
    currency: &'a str,
    pair: &'a str,
    side: OrderSide,
) -> (WalletType, &'a str) {
    match (kind, side) {
        (MarketKind::Ecosystem, OrderSide::Buy) => (WalletType::Eco, pair),
        (MarketKind::Ecosystem, OrderSide::Sell) => (WalletType::Eco, currency),
        (MarketKind::Futures, _) => (WalletType::Futures, pair),
    }
}

fn fee_currency<'a>(kind: MarketKind, terms: &'a MarketTerms, side: OrderSide) -> &'a str {
    match (kind, side) {
        (MarketKind::Ecosystem, OrderSide::Buy) => &terms.currency,
        _ => &terms.pair,
    }
}

fn reservation_for(
    kind: MarketKind,
    terms: &MarketTerms,
    side: OrderSide,
    price: Option<Decimal>,
    amount: Decimal,
    leverage: Option<u32>,
) -> Result<Decimal, ApiError> {
    let notional = price.map(|p| checked_notional(p, amount)).transpose()?;
    match (kind, side) {
        (MarketKind::Ecosystem, OrderSide::Sell) => Ok(amount),
        (MarketKind::Ecosystem, OrderSide::Buy) => notional.ok_or_else(|| {
            ApiError::InvalidRequest("market buy orders need a price cap".to_string())
        }),
        (MarketKind::Futures, _) => {
            let notional = notional.ok_or_else(|| {
                ApiError::InvalidRequest("futures orders need a price".to_string())
            })?;
            let leverage = Decimal::from(leverage.unwrap_or(1).max(1));
            notional
                .checked_div(leverage)
                .zip(notional.checked_mul(terms.taker_fee.max(terms.maker_fee)))
                .and_then(|(margin, fee)| margin.checked_add(fee))
                .ok_or_else(notional_overflow)
        }
    }
}

/// `price * amount`, rejecting values a `Decimal` cannot hold.
///
/// Every fill of an order trades at most its notional, so bounding it here
/// bounds the quote amounts of its trades.
fn checked_notional(price: Decimal, amount: Decimal) -> Result<Decimal, ApiError> {
    price.checked_mul(amount).ok_or_else(notional_overflow)
}

fn notional_overflow() -> ApiError {
    ApiError::InvalidRequest("order notional overflows".to_string())
}
