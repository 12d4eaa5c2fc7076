//! # Trading Platform Backend - REST and WebSocket API Server
//!
//! Backend of a multi-module trading and investment platform. Built with
//! [Axum](https://crates.io/crates/axum) for async HTTP handling and provides
//! OpenAPI/Swagger documentation via [utoipa](https://crates.io/crates/utoipa).
//!
//! ## Key Features
//!
//! - **Admin CRUD**: Users, wallets, referrals, ICO, staking, P2P, forex and AI
//!   investment records, each with list/show/store/update/delete, bulk delete
//!   and status routes.
//!
//! - **Compensating Deletes**: Deleting an investment, stake, contribution or
//!   P2P offer refunds the locked funds to the owner's wallet in the same
//!   atomic step.
//!
//! - **Matching Engines**: Price-time priority order books for ecosystem
//!   (spot) and futures markets, with tickers, recent trades and candles.
//!
//! - **WebSocket Relays**: Order book, ticker and trade updates pushed to
//!   subscribers using a `{ "type", "payload" }` envelope.
//!
//! - **API Keys and Rate Limiting**: Permission-scoped keys sent in the
//!   `X-API-Key` header and a per-client requests-per-minute window.
//!
//! - **Optional Persistence**: Trades and orders journaled to PostgreSQL
//!   when a database is configured.
//!
//! ## Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Route handlers, websocket relay and router configuration |
//! | [`auth`] | API key store, permissions and rate limiting |
//! | [`config`] | TOML configuration with environment overrides |
//! | [`db`] | PostgreSQL trade and order journal |
//! | [`entities`] | Platform records and their business rules |
//! | [`error`] | API error types with `IntoResponse` implementation |
//! | [`exchange`] | Order placement, settlement and cancellation |
//! | [`ledger`] | Wallet debits, credits and transactions |
//! | [`matching`] | Order books and matching engines |
//! | [`models`] | Exchange DTOs with OpenAPI schemas |
//! | [`ohlc`] | Candle aggregation |
//! | [`order_store`] | Order and position storage |
//! | [`state`] | Application state management |
//! | [`store`] | In-process tables and generic CRUD helpers |
//!
//! ## API Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/v1/stats` | Platform statistics |
//! | * | `/api/v1/admin/{resource}` | Admin CRUD |
//! | GET | `/api/v1/{kind}/markets` | Enabled markets |
//! | GET | `/api/v1/{kind}/orderbook/{currency}/{pair}` | Order book |
//! | GET | `/api/v1/{kind}/ticker/{currency}/{pair}` | Ticker |
//! | GET | `/api/v1/{kind}/tickers` | All tickers |
//! | GET | `/api/v1/{kind}/trades/{currency}/{pair}` | Recent trades |
//! | GET | `/api/v1/{kind}/chart/{currency}/{pair}` | Candles |
//! | POST | `/api/v1/{kind}/orders` | Place order |
//! | GET | `/api/v1/{kind}/orders` | Query orders |
//! | DELETE | `/api/v1/{kind}/orders/{id}` | Cancel order |
//! | GET | `/api/v1/{kind}/ws` | WebSocket |
//!
//! `{kind}` is `ecosystem` or `futures`.
//!
//! ## Swagger UI
//!
//! ```text
//! http://localhost:8080/swagger-ui/
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod matching;
pub mod models;
pub mod ohlc;
pub mod order_store;
pub mod state;
pub mod store;
