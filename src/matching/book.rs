//! Price-time priority limit order book.

use crate::models::{OrderBookSnapshot, OrderSide, PriceLevel};
use chrono::Utc;
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

/// An order resting in the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookOrder {
    /// Order identifier.
    pub id: Uuid,
    /// Owner.
    pub user_id: Uuid,
    /// Side.
    pub side: OrderSide,
    /// Limit price.
    pub price: Decimal,
    /// Open amount.
    pub remaining: Decimal,
}

/// One execution against a resting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    /// Maker order.
    pub maker_order_id: Uuid,
    /// Maker owner.
    pub maker_user_id: Uuid,
    /// Execution price (the maker's price).
    pub price: Decimal,
    /// Executed amount.
    pub amount: Decimal,
    /// Maker amount left after this fill.
    pub maker_remaining: Decimal,
}

/// A two-sided order book.
///
/// Asks are keyed by price ascending and bids by `Reverse(price)` so the
/// best level of either side is always the first entry. Each level is a
/// FIFO queue, giving price-time priority.
#[derive(Debug, Default)]
pub struct OrderBook {
    asks: BTreeMap<Decimal, VecDeque<BookOrder>>,
    bids: BTreeMap<Reverse<Decimal>, VecDeque<BookOrder>>,
    index: HashMap<Uuid, (OrderSide, Decimal)>,
}

impl OrderBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an order at the back of its price level.
    pub fn rest(&mut self, order: BookOrder) {
        self.index.insert(order.id, (order.side, order.price));
        match order.side {
            OrderSide::Buy => self
                .bids
                .entry(Reverse(order.price))
                .or_default()
                .push_back(order),
            OrderSide::Sell => self.asks.entry(order.price).or_default().push_back(order),
        }
    }

    /// Removes a resting order.
    pub fn cancel(&mut self, order_id: &Uuid) -> Option<BookOrder> {
        let (side, price) = self.index.remove(order_id)?;
        match side {
            OrderSide::Buy => remove_from_level(&mut self.bids, Reverse(price), order_id),
            OrderSide::Sell => remove_from_level(&mut self.asks, price, order_id),
        }
    }

    /// Matches an incoming order of `side` against the opposite side.
    ///
    /// Levels are consumed best first while `limit` allows (no limit means
    /// any price). Returns the fills in execution order; the caller's
    /// remaining amount is `amount` minus the filled total.
    pub fn take(&mut self, side: OrderSide, limit: Option<Decimal>, amount: Decimal) -> Vec<Fill> {
        let mut left = amount;
        let mut fills = Vec::new();
        match side {
            OrderSide::Buy => {
                while left > Decimal::ZERO {
                    let Some(mut entry) = self.asks.first_entry() else {
                        break;
                    };
                    let price = *entry.key();
                    if limit.is_some_and(|cap| price > cap) {
                        break;
                    }
                    drain_level(entry.get_mut(), price, &mut left, &mut fills, &mut self.index);
                    if entry.get().is_empty() {
                        entry.remove();
                    }
                }
            }
            OrderSide::Sell => {
                while left > Decimal::ZERO {
                    let Some(mut entry) = self.bids.first_entry() else {
                        break;
                    };
                    let price = entry.key().0;
                    if limit.is_some_and(|floor| price < floor) {
                        break;
                    }
                    drain_level(entry.get_mut(), price, &mut left, &mut fills, &mut self.index);
                    if entry.get().is_empty() {
                        entry.remove();
                    }
                }
            }
        }
        fills
    }

    /// Highest bid price.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|p| p.0)
    }

    /// Lowest ask price.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Looks up a resting order.
    #[must_use]
    pub fn get(&self, order_id: &Uuid) -> Option<&BookOrder> {
        let (side, price) = self.index.get(order_id)?;
        let level = match side {
            OrderSide::Buy => self.bids.get(&Reverse(*price)),
            OrderSide::Sell => self.asks.get(price),
        }?;
        level.iter().find(|o| o.id == *order_id)
    }

    /// Number of resting orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no order rests in the book.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Aggregated depth, `depth` levels per side.
    #[must_use]
    pub fn snapshot(&self, symbol: &str, depth: usize) -> OrderBookSnapshot {
        OrderBookSnapshot {
            symbol: symbol.to_string(),
            bids: self
                .bids
                .iter()
                .take(depth)
                .map(|(price, level)| aggregate(price.0, level))
                .collect(),
            asks: self
                .asks
                .iter()
                .take(depth)
                .map(|(price, level)| aggregate(*price, level))
                .collect(),
            timestamp: Utc::now(),
        }
    }
}

fn aggregate(price: Decimal, level: &VecDeque<BookOrder>) -> PriceLevel {
    PriceLevel {
        price,
        amount: level.iter().map(|o| o.remaining).sum(),
        order_count: level.len(),
    }
}

fn drain_level(
    level: &mut VecDeque<BookOrder>,
    price: Decimal,
    left: &mut Decimal,
    fills: &mut Vec<Fill>,
    index: &mut HashMap<Uuid, (OrderSide, Decimal)>,
) {
    while *left > Decimal::ZERO {
        let Some(maker) = level.front_mut() else {
            break;
        };
        let amount = maker.remaining.min(*left);
        maker.remaining -= amount;
        *left -= amount;
        fills.push(Fill {
            maker_order_id: maker.id,
            maker_user_id: maker.user_id,
            price,
            amount,
            maker_remaining: maker.remaining,
        });
        if maker.remaining.is_zero() {
            let id = maker.id;
            level.pop_front();
            index.remove(&id);
        }
    }
}

fn remove_from_level<K: Ord>(
    levels: &mut BTreeMap<K, VecDeque<BookOrder>>,
    key: K,
    order_id: &Uuid,
) -> Option<BookOrder> {
    let level = levels.get_mut(&key)?;
    let pos = level.iter().position(|o| o.id == *order_id)?;
    let order = level.remove(pos);
    if level.is_empty() {
        levels.remove(&key);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: OrderSide, price: Decimal, amount: Decimal) -> BookOrder {
        BookOrder {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            side,
            price,
            remaining: amount,
        }
    }

    #[test]
    fn test_best_prices() {
        let mut book = OrderBook::new();
        book.rest(order(OrderSide::Buy, dec!(99), dec!(1)));
        book.rest(order(OrderSide::Buy, dec!(100), dec!(1)));
        book.rest(order(OrderSide::Sell, dec!(102), dec!(1)));
        book.rest(order(OrderSide::Sell, dec!(101), dec!(1)));
        assert_eq!(book.best_bid(), Some(dec!(100)));
        assert_eq!(book.best_ask(), Some(dec!(101)));
        assert_eq!(book.len(), 4);
    }

    #[test]
    fn test_take_walks_levels_at_maker_price() {
        let mut book = OrderBook::new();
        book.rest(order(OrderSide::Sell, dec!(101), dec!(1)));
        book.rest(order(OrderSide::Sell, dec!(100), dec!(1)));

        let fills = book.take(OrderSide::Buy, Some(dec!(101)), dec!(1.5));
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].price, dec!(100));
        assert_eq!(fills[0].amount, dec!(1));
        assert_eq!(fills[1].price, dec!(101));
        assert_eq!(fills[1].amount, dec!(0.5));
        assert_eq!(fills[1].maker_remaining, dec!(0.5));
        assert_eq!(book.len(), 1);
        assert_eq!(book.best_ask(), Some(dec!(101)));
    }

    #[test]
    fn test_take_respects_limit() {
        let mut book = OrderBook::new();
        book.rest(order(OrderSide::Buy, dec!(100), dec!(1)));
        let fills = book.take(OrderSide::Sell, Some(dec!(101)), dec!(1));
        assert!(fills.is_empty());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_time_priority_within_level() {
        let mut book = OrderBook::new();
        let first = order(OrderSide::Sell, dec!(100), dec!(1));
        let second = order(OrderSide::Sell, dec!(100), dec!(1));
        let first_id = first.id;
        book.rest(first);
        book.rest(second);
        let fills = book.take(OrderSide::Buy, None, dec!(1));
        assert_eq!(fills[0].maker_order_id, first_id);
    }

    #[test]
    fn test_cancel_removes_empty_level() {
        let mut book = OrderBook::new();
        let resting = order(OrderSide::Buy, dec!(100), dec!(2));
        let id = resting.id;
        book.rest(resting);
        assert!(book.get(&id).is_some());
        assert_eq!(book.cancel(&id).map(|o| o.remaining), Some(dec!(2)));
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert!(book.cancel(&id).is_none());
    }

    #[test]
    fn test_snapshot_aggregates_levels() {
        let mut book = OrderBook::new();
        book.rest(order(OrderSide::Buy, dec!(100), dec!(1)));
        book.rest(order(OrderSide::Buy, dec!(100), dec!(2)));
        book.rest(order(OrderSide::Buy, dec!(98), dec!(1)));
        book.rest(order(OrderSide::Sell, dec!(105), dec!(4)));

        let snapshot = book.snapshot("BTC/USDT", 1);
        assert_eq!(snapshot.bids.len(), 1);
        assert_eq!(snapshot.bids[0].amount, dec!(3));
        assert_eq!(snapshot.bids[0].order_count, 2);
        assert_eq!(snapshot.asks[0].price, dec!(105));
    }
}
