//! Trading Platform Backend Server
//!
//! Admin API, exchange API and market data websockets of the trading platform.

use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trading_platform_backend::api::create_router;
use trading_platform_backend::config::Config;
use trading_platform_backend::db::DatabasePool;
use trading_platform_backend::state::AppState;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use trading_platform_backend::models::{
    ApiKeyInfo, BulkIdsRequest, CreateApiKeyRequest, CreateApiKeyResponse, HealthResponse,
    MarketSummary, MessageResponse, OhlcBar, OhlcInterval, OhlcResponse, Order,
    OrderBookSnapshot, OrderPage, OrderSide, OrderSortField, OrderStatus, OrderType, Permission,
    PlaceOrderRequest, PlaceOrderResponse, Position, PositionSide, PriceLevel, StatsResponse,
    Ticker, Trade,
};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        trading_platform_backend::api::handlers::health_check,
        trading_platform_backend::api::handlers::get_stats,
        trading_platform_backend::api::handlers::create_api_key,
        trading_platform_backend::api::handlers::list_api_keys,
        trading_platform_backend::api::handlers::delete_api_key,
        trading_platform_backend::api::handlers::list_markets,
        trading_platform_backend::api::handlers::get_order_book,
        trading_platform_backend::api::handlers::get_ticker,
        trading_platform_backend::api::handlers::get_tickers,
        trading_platform_backend::api::handlers::get_trades,
        trading_platform_backend::api::handlers::get_chart,
        trading_platform_backend::api::handlers::place_order,
        trading_platform_backend::api::handlers::list_orders,
        trading_platform_backend::api::handlers::get_order,
        trading_platform_backend::api::handlers::cancel_order,
        trading_platform_backend::api::handlers::list_positions,
        trading_platform_backend::api::websocket::market_ws,
    ),
    components(
        schemas(
            HealthResponse,
            StatsResponse,
            Permission,
            ApiKeyInfo,
            CreateApiKeyRequest,
            CreateApiKeyResponse,
            MarketSummary,
            MessageResponse,
            BulkIdsRequest,
            PriceLevel,
            OrderBookSnapshot,
            Ticker,
            Trade,
            OhlcInterval,
            OhlcBar,
            OhlcResponse,
            OrderSide,
            OrderType,
            OrderStatus,
            OrderSortField,
            Order,
            OrderPage,
            PlaceOrderRequest,
            PlaceOrderResponse,
            PositionSide,
            Position,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Statistics", description = "Platform statistics"),
        (name = "Auth", description = "API key management"),
        (name = "Market Data", description = "Order books, tickers, trades and candles"),
        (name = "Orders", description = "Order placement and queries"),
        (name = "WebSocket", description = "Real-time market data"),
    ),
    info(
        title = "Trading Platform API",
        version = "0.1.0",
        description = "Admin and exchange API of the trading platform",
        license(name = "MIT")
    )
)]
struct ApiDoc;

/// Reads `CONFIG_PATH` (default `config.toml`); a missing file means defaults.
fn load_config() -> anyhow::Result<Config> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let mut config = if Path::new(&path).exists() {
        info!("Loading configuration from {}", path);
        Config::load(&path)?
    } else {
        warn!("Config file {} not found, using defaults", path);
        Config::default()
    };
    config.apply_env_overrides()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;

    let db = match &config.database {
        Some(database) => {
            let pool = DatabasePool::new(&database.url, database.max_connections).await?;
            pool.run_migrations().await?;
            info!("Database journal enabled");
            Some(pool)
        }
        None => {
            info!("No database configured, trades and orders are kept in memory only");
            None
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::from_config(config, db));
    state.start_background_tasks();

    info!("Starting Trading Platform Backend on {}", addr);
    info!("Swagger UI available at http://{}/swagger-ui/", addr);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = create_router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start the server
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
