//! WebSocket client for real-time market data.
//!
//! Every frame in either direction is a `{ "type": ..., "payload": ... }`
//! envelope. Asking for a snapshot (`orderbook`, `ticker`, `tickers`,
//! `trades`) also subscribes the connection to later updates of it.

use crate::error::Error;
use crate::types::MarketKind;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// A message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    /// Message type (`connected`, `orderbook`, `trade`, `error`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific body.
    #[serde(default)]
    pub payload: Value,
}

impl WsMessage {
    /// Creates an envelope.
    #[must_use]
    pub fn new(kind: &str, payload: Value) -> Self {
        Self {
            kind: kind.to_string(),
            payload,
        }
    }

    /// Whether this is an `error` message.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == "error"
    }
}

/// Builds the websocket URL of a market family from an HTTP base URL.
///
/// # Errors
/// Returns error if `base_url` is not a valid http(s) URL.
pub fn ws_url(base_url: &str, kind: MarketKind) -> Result<String, Error> {
    let mut url = Url::parse(base_url)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::InvalidRequest(format!("cannot use {} as websocket URL", base_url)))?;
    url.set_path(&format!("/api/v1/{}/ws", kind));
    Ok(url.to_string())
}

/// WebSocket client for receiving real-time updates.
pub struct WsClient {
    rx: mpsc::Receiver<WsMessage>,
    tx: mpsc::Sender<WsMessage>,
}

impl WsClient {
    /// Connects to a websocket URL (e.g., "ws://localhost:8080/api/v1/ecosystem/ws").
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let (ws_stream, _) = connect_async(url).await.map_err(Box::new)?;
        let (mut write, mut read) = ws_stream.split();

        // Channel for receiving messages
        let (msg_tx, msg_rx) = mpsc::channel::<WsMessage>(100);

        // Channel for sending commands
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsMessage>(100);

        // Spawn task to read messages
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Ok(ws_msg) = serde_json::from_str::<WsMessage>(&text)
                            && msg_tx.send(ws_msg).await.is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(_) => break,
                    _ => {}
                }
            }
        });

        // Spawn task to send commands
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                if let Ok(json) = serde_json::to_string(&cmd)
                    && write.send(Message::Text(json.into())).await.is_err()
                {
                    break;
                }
            }
        });

        Ok(Self {
            rx: msg_rx,
            tx: cmd_tx,
        })
    }

    /// Connects to the websocket of a market family.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or connection fails.
    pub async fn connect_market(base_url: &str, kind: MarketKind) -> Result<Self, Error> {
        Self::connect(&ws_url(base_url, kind)?).await
    }

    /// Receives the next message from the server.
    ///
    /// Returns `None` if the connection is closed.
    pub async fn recv(&mut self) -> Option<WsMessage> {
        self.rx.recv().await
    }

    /// Receives messages until one of type `kind` arrives, skipping the rest.
    ///
    /// Returns `None` if the connection is closed first.
    pub async fn recv_kind(&mut self, kind: &str) -> Option<WsMessage> {
        while let Some(msg) = self.rx.recv().await {
            if msg.kind == kind {
                return Some(msg);
            }
        }
        None
    }

    /// Sends a message to the server.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn send(&self, msg: WsMessage) -> Result<(), Error> {
        self.tx.send(msg).await.map_err(|_| Error::ConnectionClosed)
    }

    /// Requests an order book snapshot and subscribes to its updates.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn order_book(&self, symbol: &str, limit: Option<usize>) -> Result<(), Error> {
        let payload = match limit {
            Some(limit) => json!({ "symbol": symbol, "limit": limit }),
            None => json!({ "symbol": symbol }),
        };
        self.send(WsMessage::new("orderbook", payload)).await
    }

    /// Requests a ticker and subscribes to its updates.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn ticker(&self, symbol: &str) -> Result<(), Error> {
        self.send(WsMessage::new("ticker", json!({ "symbol": symbol })))
            .await
    }

    /// Requests every ticker and subscribes to their updates.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn tickers(&self) -> Result<(), Error> {
        self.send(WsMessage::new("tickers", json!({}))).await
    }

    /// Requests recent trades and subscribes to new ones.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn trades(&self, symbol: &str) -> Result<(), Error> {
        self.send(WsMessage::new("trades", json!({ "symbol": symbol })))
            .await
    }

    /// Adds a raw subscription object.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn subscribe(&self, filter: Value) -> Result<(), Error> {
        self.send(WsMessage::new("subscribe", filter)).await
    }

    /// Removes subscriptions matching `filter`.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn unsubscribe(&self, filter: Value) -> Result<(), Error> {
        self.send(WsMessage::new("unsubscribe", filter)).await
    }

    /// Sends a ping; the server answers with `pong`.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn ping(&self) -> Result<(), Error> {
        self.send(WsMessage::new("ping", Value::Null)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_switches_scheme() {
        assert_eq!(
            ws_url("http://localhost:8080", MarketKind::Ecosystem).unwrap(),
            "ws://localhost:8080/api/v1/ecosystem/ws"
        );
        assert_eq!(
            ws_url("https://api.example.com/", MarketKind::Futures).unwrap(),
            "wss://api.example.com/api/v1/futures/ws"
        );
    }

    #[test]
    fn test_ws_url_rejects_garbage() {
        assert!(ws_url("not a url", MarketKind::Futures).is_err());
    }

    #[test]
    fn test_envelope_wire_format() {
        let msg = WsMessage::new("ticker", json!({ "symbol": "BTC/USDT" }));
        let text = serde_json::to_string(&msg).unwrap();
        assert_eq!(text, r#"{"type":"ticker","payload":{"symbol":"BTC/USDT"}}"#);

        let parsed: WsMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(parsed.kind, "pong");
        assert_eq!(parsed.payload, Value::Null);
        assert!(!parsed.is_error());
    }
}
