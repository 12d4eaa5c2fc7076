//! Database connection pool management.

use super::schema::{OrderRecord, TradeRecord};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Creates a new database pool from the connection string.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        info!("Database connection pool established");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs database migrations.
    ///
    /// # Errors
    /// Returns an error if migrations fail.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Journals an executed trade. Replays of the same trade are ignored.
    ///
    /// # Errors
    /// Returns the database error.
    pub async fn insert_trade(&self, trade: &TradeRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO trades (id, market_kind, symbol, price, amount, side,
                taker_order_id, maker_order_id, taker_user_id, maker_user_id, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(trade.id)
        .bind(&trade.market_kind)
        .bind(&trade.symbol)
        .bind(trade.price)
        .bind(trade.amount)
        .bind(&trade.side)
        .bind(trade.taker_order_id)
        .bind(trade.maker_order_id)
        .bind(trade.taker_user_id)
        .bind(trade.maker_user_id)
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or refreshes the journaled state of an order.
    ///
    /// # Errors
    /// Returns the database error.
    pub async fn upsert_order(&self, order: &OrderRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, market_kind, user_id, symbol, side, order_type, price,
                amount, filled, cost, fee, fee_currency, leverage, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id) DO UPDATE SET
                filled = EXCLUDED.filled,
                cost = EXCLUDED.cost,
                fee = EXCLUDED.fee,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(order.id)
        .bind(&order.market_kind)
        .bind(order.user_id)
        .bind(&order.symbol)
        .bind(&order.side)
        .bind(&order.order_type)
        .bind(order.price)
        .bind(order.amount)
        .bind(order.filled)
        .bind(order.cost)
        .bind(order.fee)
        .bind(&order.fee_currency)
        .bind(order.leverage)
        .bind(&order.status)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
