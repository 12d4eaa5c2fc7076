//! Integration tests for the Trading Platform API.
//!
//! Each test starts its own server on an ephemeral port with a fixed admin
//! key and a BTC/USDT market in both families, then talks to it through
//! `platform-client`.

use platform_client::{
    ClientConfig, CreateApiKeyRequest, MarketKind, Permission, PlatformClient, WsClient,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use trading_platform_backend::api::create_router;
use trading_platform_backend::config::Config;
use trading_platform_backend::state::AppState;

/// Admin key registered by every test server.
pub const ADMIN_KEY: &str = "sk_live_integration_admin";

const CONFIG: &str = r#"
[auth]
admin_key = "sk_live_integration_admin"
default_rate_limit = 1000

[[markets]]
kind = "ecosystem"
currency = "BTC"
pair = "USDT"
taker_fee = "0.001"
maker_fee = "0.001"

[[markets]]
kind = "futures"
currency = "BTC"
pair = "USDT"
max_leverage = 20
"#;

/// A running server and clients for it.
pub struct TestServer {
    /// HTTP base URL.
    pub base_url: String,
    /// Client holding the admin key.
    pub admin: PlatformClient,
    /// Client without a key.
    pub anonymous: PlatformClient,
}

impl TestServer {
    /// Starts a server on `127.0.0.1` with an ephemeral port.
    ///
    /// # Panics
    /// Panics if the server cannot be started.
    pub async fn spawn() -> Self {
        let config = Config::parse(CONFIG).expect("test config must parse");
        let state = Arc::new(AppState::from_config(config, None));
        state.start_background_tasks();
        let app = create_router(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("listener has an address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let base_url = format!("http://{}", addr);
        let anonymous = PlatformClient::new(ClientConfig {
            base_url: base_url.clone(),
            timeout: Duration::from_secs(10),
            api_key: None,
        })
        .expect("failed to create client");
        let admin = anonymous.with_api_key(ADMIN_KEY);

        Self {
            base_url,
            admin,
            anonymous,
        }
    }

    /// Creates a user with ECO and FUTURES wallets and returns it with a
    /// trading client bound to it.
    ///
    /// # Panics
    /// Panics if any admin call fails.
    pub async fn trader(&self, email: &str, balances: &[(&str, &str, &str)]) -> (Value, PlatformClient) {
        let user: Value = self
            .admin
            .create_resource(
                "users",
                &json!({ "email": email, "firstName": "Test", "lastName": "Trader" }),
            )
            .await
            .expect("failed to create user");
        let user_id = user["id"].as_str().expect("user has an id").to_string();

        for (wallet_type, currency, balance) in balances {
            let _: Value = self
                .admin
                .create_resource(
                    "wallets",
                    &json!({
                        "userId": user_id,
                        "type": wallet_type,
                        "currency": currency,
                        "balance": balance
                    }),
                )
                .await
                .expect("failed to create wallet");
        }

        let key = self
            .admin
            .create_api_key(&CreateApiKeyRequest {
                name: format!("{} trading", email),
                permissions: vec![Permission::Trade],
                rate_limit: None,
                user_id: Some(user_id),
            })
            .await
            .expect("failed to create trading key");

        (user, self.anonymous.with_api_key(key.api_key))
    }

    /// Opens a websocket to a market family and waits for `connected`.
    ///
    /// # Panics
    /// Panics if the connection fails or the greeting never arrives.
    pub async fn websocket(&self, kind: MarketKind) -> WsClient {
        let mut ws = WsClient::connect_market(&self.base_url, kind)
            .await
            .expect("failed to connect websocket");
        let greeting = recv_within(&mut ws, "connected").await;
        assert_eq!(greeting.payload["route"], format!("/api/v1/{}/ws", kind));
        ws
    }
}

/// Waits up to five seconds for a message of type `kind`.
///
/// # Panics
/// Panics on timeout or a closed connection.
pub async fn recv_within(ws: &mut WsClient, kind: &str) -> platform_client::WsMessage {
    match tokio::time::timeout(Duration::from_secs(5), ws.recv_kind(kind)).await {
        Ok(Some(msg)) => msg,
        Ok(None) => panic!("websocket closed while waiting for {}", kind),
        Err(_) => panic!("timeout waiting for {}", kind),
    }
}
