//! In-memory matching for ecosystem (spot) and futures markets.
//!
//! One [`MatchingEngine`] serves one market kind. Each market owns an
//! [`OrderBook`], a bounded list of recent trades and a rolling ticker
//! window; executed trades also feed the engine's candle aggregator.

mod book;
mod engine;
mod ticker;

pub use book::{BookOrder, Fill, OrderBook};
pub use engine::{EngineEvent, MatchOutcome, MatchingEngine, RECENT_TRADES_CAP};
pub use ticker::TickerWindow;

use uuid::Uuid;

/// Errors raised by the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchingError {
    /// No market with this symbol is registered.
    #[error("market {0} is not registered")]
    UnknownMarket(String),
    /// The market exists but does not accept orders.
    #[error("market {0} is disabled")]
    MarketDisabled(String),
    /// The order is not resting in the book.
    #[error("order {0} is not open")]
    UnknownOrder(Uuid),
    /// The market still has resting orders.
    #[error("market {0} still has open orders")]
    OpenOrders(String),
    /// The order is malformed.
    #[error("invalid order: {0}")]
    InvalidOrder(String),
}
