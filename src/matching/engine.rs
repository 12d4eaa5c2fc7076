//! Market registry and order matching.

use super::book::{BookOrder, OrderBook};
use super::ticker::TickerWindow;
use super::MatchingError;
use crate::config::MarketKind;
use crate::models::{Order, OrderBookSnapshot, OrderStatus, OrderType, Ticker, Trade};
use crate::ohlc::OhlcAggregator;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Trades kept per market for the trades endpoint.
pub const RECENT_TRADES_CAP: usize = 500;

const EVENT_CAPACITY: usize = 1024;

/// Something observers of the engine may want to relay.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A trade executed.
    Trade(Trade),
    /// An order changed after matching or settlement.
    OrderUpdated(Order),
    /// The book of a market changed.
    BookChanged {
        /// Market symbol.
        symbol: String,
    },
}

/// Result of submitting an order.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// The incoming order after matching.
    pub order: Order,
    /// Executions, in order. Each trade names the maker it filled.
    pub trades: Vec<Trade>,
}

#[derive(Debug)]
struct Market {
    book: OrderBook,
    enabled: bool,
    trades: VecDeque<Trade>,
    window: TickerWindow,
}

impl Market {
    fn new(enabled: bool) -> Self {
        Self {
            book: OrderBook::new(),
            enabled,
            trades: VecDeque::new(),
            window: TickerWindow::default(),
        }
    }

    fn ticker(&self, symbol: &str) -> Ticker {
        self.window
            .ticker(symbol, self.book.best_bid(), self.book.best_ask(), Utc::now())
    }
}

/// Matching engine for one market kind.
#[derive(Debug)]
pub struct MatchingEngine {
    kind: MarketKind,
    markets: DashMap<String, Market>,
    events: broadcast::Sender<EngineEvent>,
    ohlc: OhlcAggregator,
}

impl MatchingEngine {
    /// Creates an engine with no markets.
    #[must_use]
    pub fn new(kind: MarketKind) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            kind,
            markets: DashMap::new(),
            events,
            ohlc: OhlcAggregator::new(),
        }
    }

    /// Market kind served by this engine.
    #[must_use]
    pub fn kind(&self) -> MarketKind {
        self.kind
    }

    /// Registers a market. An existing market only has its flag updated.
    pub fn add_market(&self, symbol: &str, enabled: bool) {
        self.markets
            .entry(symbol.to_string())
            .and_modify(|m| m.enabled = enabled)
            .or_insert_with(|| {
                info!(kind = ?self.kind, symbol, "market registered");
                Market::new(enabled)
            });
    }

    /// Unregisters a market with an empty book.
    ///
    /// # Errors
    /// `UnknownMarket` if absent, `OpenOrders` if orders still rest.
    pub fn remove_market(&self, symbol: &str) -> Result<(), MatchingError> {
        let removed = self
            .markets
            .remove_if(symbol, |_, m| m.book.is_empty())
            .is_some();
        if removed {
            self.ohlc.clear_symbol(symbol);
            info!(kind = ?self.kind, symbol, "market removed");
            return Ok(());
        }
        if self.markets.contains_key(symbol) {
            Err(MatchingError::OpenOrders(symbol.to_string()))
        } else {
            Err(MatchingError::UnknownMarket(symbol.to_string()))
        }
    }

    /// Enables or disables order entry.
    ///
    /// # Errors
    /// `UnknownMarket` if absent.
    pub fn set_market_enabled(&self, symbol: &str, enabled: bool) -> Result<(), MatchingError> {
        let mut market = self
            .markets
            .get_mut(symbol)
            .ok_or_else(|| MatchingError::UnknownMarket(symbol.to_string()))?;
        market.enabled = enabled;
        Ok(())
    }

    /// Whether a market is registered.
    #[must_use]
    pub fn has_market(&self, symbol: &str) -> bool {
        self.markets.contains_key(symbol)
    }

    /// Registered symbols, sorted.
    #[must_use]
    pub fn markets(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.markets.iter().map(|m| m.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Matches an order and rests any limit remainder.
    ///
    /// Trades execute at the maker's price. A market order never rests: its
    /// unfilled remainder is canceled, and its optional price is a cap.
    ///
    /// # Errors
    /// `UnknownMarket`, `MarketDisabled` or `InvalidOrder`.
    pub fn submit(&self, mut order: Order) -> Result<MatchOutcome, MatchingError> {
        if order.remaining <= Decimal::ZERO {
            return Err(MatchingError::InvalidOrder(
                "amount must be positive".to_string(),
            ));
        }
        if order.price.is_some_and(|p| p <= Decimal::ZERO) {
            return Err(MatchingError::InvalidOrder(
                "price must be positive".to_string(),
            ));
        }
        if order.order_type == OrderType::Limit && order.price.is_none() {
            return Err(MatchingError::InvalidOrder(
                "limit orders need a price".to_string(),
            ));
        }

        let symbol = order.symbol.clone();
        let trades = {
            let mut market = self
                .markets
                .get_mut(&symbol)
                .ok_or_else(|| MatchingError::UnknownMarket(symbol.clone()))?;
            if !market.enabled {
                return Err(MatchingError::MarketDisabled(symbol));
            }

            let fills = market.book.take(order.side, order.price, order.remaining);
            let now = Utc::now();
            let mut trades = Vec::with_capacity(fills.len());
            for fill in fills {
                let trade = Trade {
                    id: Uuid::new_v4(),
                    symbol: symbol.clone(),
                    price: fill.price,
                    amount: fill.amount,
                    side: order.side,
                    taker_order_id: order.id,
                    maker_order_id: fill.maker_order_id,
                    taker_user_id: order.user_id,
                    maker_user_id: fill.maker_user_id,
                    timestamp: now,
                };
                order.filled += fill.amount;
                order.remaining -= fill.amount;
                order.cost += trade.quote_amount();

                market.window.record(now, fill.price, fill.amount);
                self.ohlc
                    .record_trade(&symbol, now.timestamp(), fill.price, fill.amount);
                market.trades.push_back(trade.clone());
                if market.trades.len() > RECENT_TRADES_CAP {
                    market.trades.pop_front();
                }
                trades.push(trade);
            }

            order.status = if order.remaining.is_zero() {
                OrderStatus::Filled
            } else if order.order_type == OrderType::Market {
                OrderStatus::Canceled
            } else {
                if let Some(price) = order.price {
                    market.book.rest(BookOrder {
                        id: order.id,
                        user_id: order.user_id,
                        side: order.side,
                        price,
                        remaining: order.remaining,
                    });
                }
                if order.filled.is_zero() {
                    OrderStatus::Active
                } else {
                    OrderStatus::Partial
                }
            };
            order.updated_at = now;
            trades
        };

        debug!(
            symbol = %symbol,
            order_id = %order.id,
            trades = trades.len(),
            status = %order.status,
            "order matched"
        );
        for trade in &trades {
            self.publish(EngineEvent::Trade(trade.clone()));
        }
        self.publish(EngineEvent::BookChanged { symbol });

        Ok(MatchOutcome { order, trades })
    }

    /// Removes a resting order from its book.
    ///
    /// # Errors
    /// `UnknownMarket` or `UnknownOrder`.
    pub fn cancel(&self, symbol: &str, order_id: &Uuid) -> Result<BookOrder, MatchingError> {
        let removed = {
            let mut market = self
                .markets
                .get_mut(symbol)
                .ok_or_else(|| MatchingError::UnknownMarket(symbol.to_string()))?;
            market
                .book
                .cancel(order_id)
                .ok_or(MatchingError::UnknownOrder(*order_id))?
        };
        self.publish(EngineEvent::BookChanged {
            symbol: symbol.to_string(),
        });
        Ok(removed)
    }

    /// Aggregated depth of a market.
    ///
    /// # Errors
    /// `UnknownMarket` if absent.
    pub fn get_order_book(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Result<OrderBookSnapshot, MatchingError> {
        let market = self
            .markets
            .get(symbol)
            .ok_or_else(|| MatchingError::UnknownMarket(symbol.to_string()))?;
        Ok(market.book.snapshot(symbol, depth))
    }

    /// 24h statistics of a market.
    ///
    /// # Errors
    /// `UnknownMarket` if absent.
    pub fn get_ticker(&self, symbol: &str) -> Result<Ticker, MatchingError> {
        let market = self
            .markets
            .get(symbol)
            .ok_or_else(|| MatchingError::UnknownMarket(symbol.to_string()))?;
        Ok(market.ticker(symbol))
    }

    /// Tickers of every market, sorted by symbol.
    #[must_use]
    pub fn get_tickers(&self) -> Vec<Ticker> {
        let mut tickers: Vec<Ticker> = self
            .markets
            .iter()
            .map(|m| m.value().ticker(m.key()))
            .collect();
        tickers.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        tickers
    }

    /// Most recent trades of a market, newest first.
    ///
    /// # Errors
    /// `UnknownMarket` if absent.
    pub fn recent_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>, MatchingError> {
        let market = self
            .markets
            .get(symbol)
            .ok_or_else(|| MatchingError::UnknownMarket(symbol.to_string()))?;
        Ok(market.trades.iter().rev().take(limit).cloned().collect())
    }

    /// Orders resting across all books.
    #[must_use]
    pub fn open_order_count(&self) -> usize {
        self.markets.iter().map(|m| m.book.len()).sum()
    }

    /// Orders resting in one market's book (0 for unknown markets).
    #[must_use]
    pub fn resting_orders(&self, symbol: &str) -> usize {
        self.markets.get(symbol).map_or(0, |m| m.book.len())
    }

    /// Candle aggregator fed by this engine's trades.
    #[must_use]
    pub fn ohlc(&self) -> &OhlcAggregator {
        &self.ohlc
    }

    /// Subscribes to engine events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Publishes an event; dropped silently when nobody listens.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}
