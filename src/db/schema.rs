//! Journal row types.

use crate::config::MarketKind;
use crate::models::{Order, OrderType, Trade};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row of the `trades` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    /// Trade identifier.
    pub id: Uuid,
    /// `ecosystem` or `futures`.
    pub market_kind: String,
    /// Market symbol.
    pub symbol: String,
    /// Execution price.
    pub price: Decimal,
    /// Executed amount.
    pub amount: Decimal,
    /// Taker side.
    pub side: String,
    /// Taker order.
    pub taker_order_id: Uuid,
    /// Maker order.
    pub maker_order_id: Uuid,
    /// Taker owner.
    pub taker_user_id: Uuid,
    /// Maker owner.
    pub maker_user_id: Uuid,
    /// Execution time.
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    /// Journal row for an engine trade.
    #[must_use]
    pub fn from_trade(kind: MarketKind, trade: &Trade) -> Self {
        Self {
            id: trade.id,
            market_kind: kind.as_str().to_string(),
            symbol: trade.symbol.clone(),
            price: trade.price,
            amount: trade.amount,
            side: trade.side.to_string(),
            taker_order_id: trade.taker_order_id,
            maker_order_id: trade.maker_order_id,
            taker_user_id: trade.taker_user_id,
            maker_user_id: trade.maker_user_id,
            executed_at: trade.timestamp,
        }
    }
}

/// A row of the `orders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderRecord {
    /// Order identifier.
    pub id: Uuid,
    /// `ecosystem` or `futures`.
    pub market_kind: String,
    /// Owner.
    pub user_id: Uuid,
    /// Market symbol.
    pub symbol: String,
    /// `buy` or `sell`.
    pub side: String,
    /// `limit` or `market`.
    pub order_type: String,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Ordered amount.
    pub amount: Decimal,
    /// Filled amount.
    pub filled: Decimal,
    /// Quote exchanged.
    pub cost: Decimal,
    /// Fees charged.
    pub fee: Decimal,
    /// Fee currency.
    pub fee_currency: String,
    /// Leverage (futures only).
    pub leverage: Option<i32>,
    /// Order status.
    pub status: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Journal row for an order state.
    #[must_use]
    pub fn from_order(kind: MarketKind, order: &Order) -> Self {
        let order_type = match order.order_type {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        };
        Self {
            id: order.id,
            market_kind: kind.as_str().to_string(),
            user_id: order.user_id,
            symbol: order.symbol.clone(),
            side: order.side.to_string(),
            order_type: order_type.to_string(),
            price: order.price,
            amount: order.amount,
            filled: order.filled,
            cost: order.cost,
            fee: order.fee,
            fee_currency: order.fee_currency.clone(),
            leverage: order.leverage.and_then(|l| i32::try_from(l).ok()),
            status: order.status.to_string(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, OrderStatus};
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_record_uses_wire_names() {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            symbol: "BTC/USDT".to_string(),
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            price: None,
            amount: dec!(2),
            filled: dec!(1),
            remaining: dec!(0),
            cost: dec!(100),
            fee: dec!(0.1),
            fee_currency: "USDT".to_string(),
            leverage: Some(5),
            reserved: dec!(0),
            status: OrderStatus::Canceled,
            created_at: now,
            updated_at: now,
        };

        let record = OrderRecord::from_order(MarketKind::Futures, &order);
        assert_eq!(record.market_kind, "futures");
        assert_eq!(record.side, "sell");
        assert_eq!(record.order_type, "market");
        assert_eq!(record.status, order.status.to_string());
        assert_eq!(record.leverage, Some(5));
    }
}
