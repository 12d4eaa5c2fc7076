//! Route configuration.

use crate::api::{crud, handlers, middleware, websocket};
use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post};
use std::sync::Arc;

/// Creates the API router.
///
/// Exchange routes are shared by both market families through the `{kind}`
/// path segment (`ecosystem` or `futures`).
pub fn create_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Statistics
        .route("/api/v1/stats", get(handlers::get_stats))
        // Authentication
        .route(
            "/api/v1/auth/keys",
            post(handlers::create_api_key).get(handlers::list_api_keys),
        )
        .route(
            "/api/v1/auth/keys/{key_id}",
            delete(handlers::delete_api_key),
        );

    // Admin resources
    let router = crud::admin_routes(router);

    router
        // WebSocket
        .route("/api/v1/{kind}/ws", get(websocket::market_ws))
        // Market data
        .route("/api/v1/{kind}/markets", get(handlers::list_markets))
        .route(
            "/api/v1/{kind}/orderbook/{currency}/{pair}",
            get(handlers::get_order_book),
        )
        .route(
            "/api/v1/{kind}/ticker/{currency}/{pair}",
            get(handlers::get_ticker),
        )
        .route("/api/v1/{kind}/tickers", get(handlers::get_tickers))
        .route(
            "/api/v1/{kind}/trades/{currency}/{pair}",
            get(handlers::get_trades),
        )
        .route(
            "/api/v1/{kind}/chart/{currency}/{pair}",
            get(handlers::get_chart),
        )
        // Orders
        .route(
            "/api/v1/{kind}/orders",
            post(handlers::place_order).get(handlers::list_orders),
        )
        .route(
            "/api/v1/{kind}/orders/{order_id}",
            get(handlers::get_order).delete(handlers::cancel_order),
        )
        .route("/api/v1/{kind}/positions", get(handlers::list_positions))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::rate_limit_middleware,
        ))
        .with_state(state)
}
