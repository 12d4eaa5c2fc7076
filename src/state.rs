//! Application state management.

use crate::api::broker::Broker;
use crate::api::websocket;
use crate::auth::ApiKeyStore;
use crate::config::{Config, MarketKind};
use crate::db::{self, DatabasePool};
use crate::entities::markets;
use crate::exchange::Exchange;
use crate::models::Permission;
use crate::store::Store;
use std::sync::Arc;
use tracing::info;

/// Application state shared across all handlers.
pub struct AppState {
    /// Platform tables.
    pub store: Arc<Store>,
    /// Matching engines and order workflow.
    pub exchange: Arc<Exchange>,
    /// Websocket connection registry.
    pub broker: Arc<Broker>,
    /// API key registry and rate limiter.
    pub api_keys: Arc<ApiKeyStore>,
    /// Optional database journal.
    pub db: Option<DatabasePool>,
    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates an empty state with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(Config::default(), None)
    }

    /// Creates the state from configuration.
    ///
    /// Configured markets are seeded into the store and listed in their
    /// engines; a configured admin key is registered. Order cleanup only runs
    /// when built inside a tokio runtime.
    #[must_use]
    pub fn from_config(config: Config, db: Option<DatabasePool>) -> Self {
        let store = Arc::new(Store::new());
        markets::seed_from_config(&store, &config.markets);

        let exchange = if tokio::runtime::Handle::try_current().is_ok() {
            Exchange::with_cleanup(Arc::clone(&store), &config.orders)
        } else {
            Exchange::new(Arc::clone(&store))
        };
        let exchange = Arc::new(exchange);
        exchange.sync_markets();

        let api_keys = Arc::new(ApiKeyStore::new());
        if let Some(admin_key) = &config.auth.admin_key {
            let info = api_keys.register_key(
                admin_key,
                "admin".to_string(),
                vec![Permission::Admin],
                config.auth.default_rate_limit.max(1000),
                None,
            );
            info!("Registered configured admin key {}", info.key_id);
        }

        Self {
            store,
            exchange,
            broker: Arc::new(Broker::new()),
            api_keys,
            db,
            config: Arc::new(config),
        }
    }

    /// Starts the websocket relays and, with a database, the trade journals.
    pub fn start_background_tasks(self: &Arc<Self>) {
        for kind in [MarketKind::Ecosystem, MarketKind::Futures] {
            websocket::spawn_relay(Arc::clone(self), kind);
            if let Some(pool) = &self.db {
                db::spawn_journal(pool.clone(), kind, self.exchange.engine(kind).subscribe());
            }
        }
        info!("Background tasks started");
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
