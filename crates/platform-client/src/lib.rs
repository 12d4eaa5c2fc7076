//! HTTP client library for the Trading Platform API.
//!
//! This crate provides a typed HTTP client for the admin and exchange
//! endpoints of the trading platform backend, plus a WebSocket client that
//! speaks the `{ "type", "payload" }` envelope of the market data streams.
//!
//! # Example
//!
//! ```no_run
//! use platform_client::{ClientConfig, MarketKind, PlatformClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), platform_client::Error> {
//!     let client = PlatformClient::new(ClientConfig {
//!         base_url: "http://localhost:8080".into(),
//!         timeout: Duration::from_secs(30),
//!         api_key: Some("sk_live_...".into()),
//!     })?;
//!
//!     let health = client.health_check().await?;
//!     println!("Status: {}", health.status);
//!
//!     let tickers = client.get_tickers(MarketKind::Ecosystem).await?;
//!     println!("{} markets", tickers.len());
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;
mod websocket;

pub use client::{API_KEY_HEADER, ClientConfig, PlatformClient};
pub use error::Error;
pub use types::*;
pub use websocket::{WsClient, WsMessage, ws_url};
