//! WebSocket endpoints for real-time market data.
//!
//! Each market family has its own route. Clients ask for a snapshot with an
//! `orderbook`, `ticker`, `tickers` or `trades` message and are subscribed to
//! later updates of the same data; `subscribe` and `unsubscribe` manage raw
//! subscription objects. Engine events are relayed through the [`Broker`].
//!
//! [`Broker`]: super::broker::Broker

use super::broker::WsMessage;
use super::{DEFAULT_BOOK_DEPTH, MAX_BOOK_DEPTH};
use crate::config::MarketKind;
use crate::entities::markets::symbol_of;
use crate::matching::EngineEvent;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Trades returned in a `trades` snapshot.
const TRADES_SNAPSHOT: usize = 50;

/// Route of the websocket of a market family.
#[must_use]
pub fn route_for(kind: MarketKind) -> &'static str {
    match kind {
        MarketKind::Ecosystem => "/api/v1/ecosystem/ws",
        MarketKind::Futures => "/api/v1/futures/ws",
    }
}

/// Websocket upgrade handler of a market family.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/ws",
    params(
        ("kind" = String, Path, description = "`ecosystem` or `futures`")
    ),
    responses(
        (status = 101, description = "WebSocket connection established")
    ),
    tag = "WebSocket"
)]
pub async fn market_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(kind): Path<MarketKind>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, kind))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, kind: MarketKind) {
    let route = route_for(kind);
    let (mut sender, mut receiver) = socket.split();
    let (client_id, mut outbox) = state.broker.register(route);

    let connected = WsMessage::new("connected", json!({ "clientId": client_id, "route": route }));
    if let Ok(text) = serde_json::to_string(&connected) {
        let _ = sender.send(Message::Text(text.into())).await;
    }
    info!(client = %client_id, route, "WebSocket client connected");

    let recv_state = Arc::clone(&state);
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!("Received WebSocket message: {}", text);
                    if let Some(reply) = handle_client_message(&recv_state, kind, client_id, &text)
                    {
                        recv_state.broker.send_to_client(&client_id, &reply);
                    }
                }
                Ok(Message::Close(_)) => {
                    info!(client = %client_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                queued = outbox.recv() => {
                    let Some(text) = queued else { break };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(30)) => {
                    let heartbeat = WsMessage::new(
                        "heartbeat",
                        json!({ "timestamp": chrono::Utc::now().timestamp_millis() }),
                    );
                    if let Ok(text) = serde_json::to_string(&heartbeat)
                        && sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                }
            }
        }
    });

    tokio::select! {
        _ = recv_task => {}
        _ = send_task => {}
    }

    state.broker.unregister(&client_id);
    info!(client = %client_id, "WebSocket connection closed");
}

fn subscription(kind: &str, symbol: Option<&str>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("type".to_string(), Value::String(kind.to_string()));
    if let Some(symbol) = symbol {
        map.insert("symbol".to_string(), Value::String(symbol.to_string()));
    }
    map
}

/// Reads the market of a payload: `symbol`, or `currency` plus `pair`.
fn payload_symbol(payload: &Value) -> Option<String> {
    if let Some(symbol) = payload.get("symbol").and_then(Value::as_str) {
        return Some(symbol.trim().to_uppercase());
    }
    let currency = payload.get("currency").and_then(Value::as_str)?;
    let pair = payload.get("pair").and_then(Value::as_str)?;
    Some(symbol_of(
        &currency.trim().to_uppercase(),
        &pair.trim().to_uppercase(),
    ))
}

fn payload_limit(payload: &Value) -> usize {
    payload
        .get("limit")
        .and_then(Value::as_u64)
        .map_or(DEFAULT_BOOK_DEPTH, |l| (l as usize).clamp(1, MAX_BOOK_DEPTH))
}

/// Handles one inbound frame and returns the reply, if any.
///
/// Snapshot requests subscribe the connection to later updates of the same
/// data once the snapshot has been produced.
pub fn handle_client_message(
    state: &AppState,
    kind: MarketKind,
    client_id: Uuid,
    text: &str,
) -> Option<WsMessage> {
    let message: WsMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => return Some(WsMessage::error(format!("malformed message: {}", e))),
    };
    let engine = state.exchange.engine(kind);
    let payload = &message.payload;

    let reply = match message.kind.as_str() {
        "subscribe" | "unsubscribe" => {
            let Value::Object(filter) = payload else {
                return Some(WsMessage::error("payload must be an object"));
            };
            if message.kind == "subscribe" {
                state.broker.subscribe(&client_id, filter.clone());
                WsMessage::new("subscribed", payload)
            } else {
                let removed = state.broker.unsubscribe(&client_id, filter);
                WsMessage::new("unsubscribed", json!({ "filter": payload, "removed": removed }))
            }
        }
        "orderbook" | "ticker" | "trades" => {
            let Some(symbol) = payload_symbol(payload) else {
                return Some(WsMessage::error("payload needs symbol or currency and pair"));
            };
            let snapshot = match message.kind.as_str() {
                "orderbook" => engine
                    .get_order_book(&symbol, payload_limit(payload))
                    .map(|book| WsMessage::new("orderbook", book)),
                "ticker" => engine
                    .get_ticker(&symbol)
                    .map(|ticker| WsMessage::new("ticker", ticker)),
                _ => engine
                    .recent_trades(&symbol, TRADES_SNAPSHOT)
                    .map(|trades| WsMessage::new("trades", trades)),
            };
            match snapshot {
                Ok(reply) => {
                    state
                        .broker
                        .subscribe(&client_id, subscription(&message.kind, Some(&symbol)));
                    reply
                }
                Err(e) => WsMessage::error(e.to_string()),
            }
        }
        "tickers" => {
            state
                .broker
                .subscribe(&client_id, subscription("tickers", None));
            WsMessage::new("tickers", engine.get_tickers())
        }
        "ping" => WsMessage::new("pong", json!({ "timestamp": chrono::Utc::now().timestamp_millis() })),
        other => WsMessage::error(format!("unknown message type: {}", other)),
    };
    Some(reply)
}

/// Forwards one engine event to the subscribers of the family's route.
///
/// Returns the number of deliveries.
pub fn relay_event(state: &AppState, kind: MarketKind, event: &EngineEvent) -> usize {
    let route = route_for(kind);
    let engine = state.exchange.engine(kind);
    let broker = &state.broker;

    match event {
        EngineEvent::Trade(trade) => {
            let symbol = trade.symbol.as_str();
            let mut delivered = broker.send_message_to_route(
                route,
                &subscription("trades", Some(symbol)),
                &WsMessage::new("trade", trade),
            );
            if let Ok(ticker) = engine.get_ticker(symbol) {
                delivered += broker.send_message_to_route(
                    route,
                    &subscription("ticker", Some(symbol)),
                    &WsMessage::new("ticker", ticker),
                );
            }
            delivered
                + broker.send_message_to_route(
                    route,
                    &subscription("tickers", None),
                    &WsMessage::new("tickers", engine.get_tickers()),
                )
        }
        EngineEvent::BookChanged { symbol } => match engine.get_order_book(symbol, DEFAULT_BOOK_DEPTH)
        {
            Ok(book) => broker.send_message_to_route(
                route,
                &subscription("orderbook", Some(symbol)),
                &WsMessage::new("orderbook", book),
            ),
            Err(_) => 0,
        },
        EngineEvent::OrderUpdated(_) => 0,
    }
}

/// Spawns the task relaying engine events of one family to websockets.
pub fn spawn_relay(state: Arc<AppState>, kind: MarketKind) -> JoinHandle<()> {
    let mut events = state.exchange.engine(kind).subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    relay_event(&state, kind, &event);
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(route = route_for(kind), "WebSocket relay lagged {} events", n);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MarketConfig};
    use rust_decimal_macros::dec;

    fn state() -> AppState {
        let mut config = Config::default();
        config.markets.push(MarketConfig {
            kind: MarketKind::Ecosystem,
            currency: "BTC".to_string(),
            pair: "USDT".to_string(),
            taker_fee: dec!(0.001),
            maker_fee: dec!(0.001),
            min_amount: dec!(0.0001),
            max_leverage: 1,
        });
        AppState::from_config(config, None)
    }

    fn frame(text: &str) -> WsMessage {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_orderbook_request_replies_and_subscribes() {
        let state = state();
        let (client, mut outbox) = state.broker.register(route_for(MarketKind::Ecosystem));

        let reply = handle_client_message(
            &state,
            MarketKind::Ecosystem,
            client,
            r#"{"type":"orderbook","payload":{"currency":"btc","pair":"usdt","limit":5}}"#,
        )
        .unwrap();
        assert_eq!(reply.kind, "orderbook");
        assert_eq!(reply.payload["symbol"], "BTC/USDT");

        let delivered = relay_event(
            &state,
            MarketKind::Ecosystem,
            &EngineEvent::BookChanged {
                symbol: "BTC/USDT".to_string(),
            },
        );
        assert_eq!(delivered, 1);
        let pushed = frame(&outbox.try_recv().unwrap());
        assert_eq!(pushed.kind, "orderbook");
    }

    #[test]
    fn test_unknown_market_is_an_error_without_subscription() {
        let state = state();
        let (client, mut outbox) = state.broker.register(route_for(MarketKind::Ecosystem));

        let reply = handle_client_message(
            &state,
            MarketKind::Ecosystem,
            client,
            r#"{"type":"ticker","payload":{"symbol":"DOGE/USDT"}}"#,
        )
        .unwrap();
        assert_eq!(reply.kind, "error");

        relay_event(
            &state,
            MarketKind::Ecosystem,
            &EngineEvent::BookChanged {
                symbol: "DOGE/USDT".to_string(),
            },
        );
        assert!(outbox.try_recv().is_err());
    }

    #[test]
    fn test_tickers_and_routes_are_separate() {
        let state = state();
        let (spot, _spot_rx) = state.broker.register(route_for(MarketKind::Ecosystem));
        let (futures, mut futures_rx) = state.broker.register(route_for(MarketKind::Futures));

        let reply =
            handle_client_message(&state, MarketKind::Ecosystem, spot, r#"{"type":"tickers"}"#)
                .unwrap();
        assert_eq!(reply.kind, "tickers");
        assert_eq!(reply.payload.as_array().map(Vec::len), Some(1));

        let reply =
            handle_client_message(&state, MarketKind::Futures, futures, r#"{"type":"tickers"}"#)
                .unwrap();
        assert_eq!(reply.payload.as_array().map(Vec::len), Some(0));

        relay_event(
            &state,
            MarketKind::Ecosystem,
            &EngineEvent::BookChanged {
                symbol: "BTC/USDT".to_string(),
            },
        );
        assert!(futures_rx.try_recv().is_err());
    }

    #[test]
    fn test_raw_subscribe_unsubscribe_and_errors() {
        let state = state();
        let (client, _rx) = state.broker.register(route_for(MarketKind::Ecosystem));

        let reply = handle_client_message(
            &state,
            MarketKind::Ecosystem,
            client,
            r#"{"type":"subscribe","payload":{"type":"trades","symbol":"BTC/USDT"}}"#,
        )
        .unwrap();
        assert_eq!(reply.kind, "subscribed");

        let reply = handle_client_message(
            &state,
            MarketKind::Ecosystem,
            client,
            r#"{"type":"unsubscribe","payload":{"type":"trades"}}"#,
        )
        .unwrap();
        assert_eq!(reply.kind, "unsubscribed");
        assert_eq!(reply.payload["removed"], 1);

        let reply =
            handle_client_message(&state, MarketKind::Ecosystem, client, "not json").unwrap();
        assert_eq!(reply.kind, "error");

        let reply =
            handle_client_message(&state, MarketKind::Ecosystem, client, r#"{"type":"dance"}"#)
                .unwrap();
        assert_eq!(reply.kind, "error");
    }
}
