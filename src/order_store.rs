//! In-memory order and position storage.
//!
//! Orders live in a DashMap keyed by id, so the matching path and the
//! query endpoints never contend on a global lock:
//! - Order insertion and per-order atomic updates
//! - Filtered, sorted and paginated queries
//! - Periodic cleanup of old closed orders
//!
//! Futures positions are kept per (user, symbol).

use crate::config::OrdersConfig;
use crate::error::ApiError;
use crate::models::{
    Order, OrderPage, OrderQuery, OrderSortField, OrderStatus, Position, PositionChange,
};
use crate::store::query::{DEFAULT_PER_PAGE, MAX_PER_PAGE, paginate};
use crate::store::SortOrder;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Order storage with optional background cleanup.
pub struct OrderStore {
    orders: Arc<DashMap<Uuid, Order>>,
    cleanup_handle: Option<JoinHandle<()>>,
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStore {
    /// Creates a store without cleanup.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: Arc::new(DashMap::new()),
            cleanup_handle: None,
        }
    }

    /// Creates a store that periodically drops old closed orders.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn with_cleanup(config: OrdersConfig) -> Self {
        let orders = Arc::new(DashMap::new());
        let orders_clone = Arc::clone(&orders);

        let handle = tokio::spawn(async move {
            Self::cleanup_loop(orders_clone, config).await;
        });

        Self {
            orders,
            cleanup_handle: Some(handle),
        }
    }

    async fn cleanup_loop(orders: Arc<DashMap<Uuid, Order>>, config: OrdersConfig) {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
            config.cleanup_interval_secs.max(1),
        ));

        loop {
            interval.tick().await;
            let removed = remove_closed_before(&orders, config.max_age_secs);
            if removed > 0 {
                info!("Cleaned up {} old closed orders", removed);
            }
            debug!("Order cleanup complete. Tracked orders: {}", orders.len());
        }
    }

    /// Stores an order, replacing any previous version.
    pub fn insert(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    /// Looks up an order.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<Order> {
        self.orders.get(id).map(|o| o.clone())
    }

    /// Mutates an order in place and returns the new version.
    pub fn update<F>(&self, id: &Uuid, f: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let mut entry = self.orders.get_mut(id)?;
        f(entry.value_mut());
        Some(entry.clone())
    }

    /// Lists orders, optionally restricted to one user.
    ///
    /// # Errors
    /// Returns `InvalidRequest` on an unknown status filter.
    pub fn query(&self, user_id: Option<Uuid>, query: &OrderQuery) -> Result<OrderPage, ApiError> {
        let status = query
            .status
            .as_deref()
            .map(str::parse::<OrderStatus>)
            .transpose()
            .map_err(ApiError::InvalidRequest)?;
        let symbol = query.symbol.as_ref().map(|s| s.to_uppercase());

        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                user_id.is_none_or(|u| order.user_id == u)
                    && symbol.as_ref().is_none_or(|s| &order.symbol == s)
                    && status.is_none_or(|s| order.status == s)
                    && query.side.is_none_or(|s| order.side == s)
            })
            .map(|entry| entry.value().clone())
            .collect();

        let field = query.sort_field.unwrap_or_default();
        orders.sort_by(|a, b| {
            let ordering = match field {
                OrderSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                OrderSortField::Price => a.price.cmp(&b.price),
                OrderSortField::Amount => a.amount.cmp(&b.amount),
                OrderSortField::Filled => a.filled.cmp(&b.filled),
            };
            match query.sort_order.unwrap_or_default() {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let paginated = paginate(orders, page, per_page);
        Ok(OrderPage {
            items: paginated.items,
            pagination: paginated.pagination,
        })
    }

    /// Number of tracked orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether no order is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Drops closed orders last updated more than `max_age_secs` ago.
    pub fn cleanup_old_orders(&self, max_age_secs: i64) -> usize {
        remove_closed_before(&self.orders, max_age_secs)
    }
}

fn remove_closed_before(orders: &DashMap<Uuid, Order>, max_age_secs: i64) -> usize {
    let threshold = Utc::now() - Duration::seconds(max_age_secs);
    let before = orders.len();
    orders.retain(|_, order| order.status.is_open() || order.updated_at >= threshold);
    before - orders.len()
}

impl Drop for OrderStore {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

/// Futures positions keyed by (user, symbol).
#[derive(Debug, Default)]
pub struct PositionStore {
    positions: DashMap<(Uuid, String), Position>,
}

impl PositionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A user's position in one market.
    #[must_use]
    pub fn get(&self, user_id: Uuid, symbol: &str) -> Option<Position> {
        self.positions
            .get(&(user_id, symbol.to_string()))
            .map(|p| p.clone())
    }

    /// All positions of a user, sorted by symbol.
    #[must_use]
    pub fn list(&self, user_id: Uuid) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .positions
            .iter()
            .filter(|p| p.key().0 == user_id)
            .map(|p| p.value().clone())
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    /// Applies a signed fill to a position, opening it if needed.
    pub fn apply_fill(
        &self,
        user_id: Uuid,
        symbol: &str,
        size: Decimal,
        price: Decimal,
        margin: Decimal,
        leverage: u32,
    ) -> PositionChange {
        let now = Utc::now();
        let mut position = self
            .positions
            .entry((user_id, symbol.to_string()))
            .or_insert_with(|| Position::new(user_id, symbol.to_string(), leverage, now));
        position.apply_fill(size, price, margin, leverage, now)
    }

    /// Number of positions, flat ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no position exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
