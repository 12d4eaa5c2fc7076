//! Route-addressed fan-out to websocket connections.
//!
//! Every connection registers under the route it was opened on and keeps a
//! list of subscription objects. [`Broker::send_message_to_route`] delivers a
//! message to the connections of one route holding a subscription that
//! matches a filter: every field of the filter must be present with an
//! equal value in the subscription.
//!
//! Outboxes are bounded; a connection whose outbox is full is dropped from
//! the registry, which closes its socket once the queued frames drain.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Envelope of every websocket frame, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body.
    #[serde(default)]
    pub payload: Value,
}

impl WsMessage {
    /// Builds a message from any serializable payload.
    pub fn new(kind: &str, payload: impl Serialize) -> Self {
        let payload = serde_json::to_value(payload).unwrap_or_else(|err| {
            warn!("websocket payload not serializable: {}", err);
            Value::Null
        });
        Self {
            kind: kind.to_string(),
            payload,
        }
    }

    /// An error reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", serde_json::json!({ "message": message.into() }))
    }
}

/// Frames queued per connection before it counts as too slow.
pub const OUTBOX_CAPACITY: usize = 1024;

struct Client {
    route: String,
    sender: mpsc::Sender<String>,
    subscriptions: Vec<Map<String, Value>>,
}

/// Registry of live websocket connections.
#[derive(Default)]
pub struct Broker {
    clients: DashMap<Uuid, Client>,
}

/// Whether `subscription` carries every field of `filter` with the same value.
#[must_use]
pub fn matches_filter(subscription: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(key, value)| subscription.get(key) == Some(value))
}

impl Broker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection on `route` and returns its id and outbox.
    pub fn register(&self, route: &str) -> (Uuid, mpsc::Receiver<String>) {
        self.register_with_capacity(route, OUTBOX_CAPACITY)
    }

    /// Registers a connection whose outbox holds at most `capacity` frames.
    pub fn register_with_capacity(&self, route: &str, capacity: usize) -> (Uuid, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = Uuid::new_v4();
        self.clients.insert(
            id,
            Client {
                route: route.to_string(),
                sender,
                subscriptions: Vec::new(),
            },
        );
        debug!(client = %id, route, "websocket client registered");
        (id, receiver)
    }

    /// Forgets a connection.
    pub fn unregister(&self, id: &Uuid) {
        self.clients.remove(id);
    }

    /// Adds a subscription; duplicates are ignored. Returns false for an
    /// unknown connection.
    pub fn subscribe(&self, id: &Uuid, subscription: Map<String, Value>) -> bool {
        let Some(mut client) = self.clients.get_mut(id) else {
            return false;
        };
        if !client.subscriptions.contains(&subscription) {
            client.subscriptions.push(subscription);
        }
        true
    }

    /// Removes every subscription matching `filter`; returns how many.
    pub fn unsubscribe(&self, id: &Uuid, filter: &Map<String, Value>) -> usize {
        let Some(mut client) = self.clients.get_mut(id) else {
            return 0;
        };
        let before = client.subscriptions.len();
        client.subscriptions.retain(|s| !matches_filter(s, filter));
        before - client.subscriptions.len()
    }

    /// Sends a message to one connection.
    pub fn send_to_client(&self, id: &Uuid, message: &WsMessage) -> bool {
        let Ok(text) = serde_json::to_string(message) else {
            return false;
        };
        let outcome = match self.clients.get(id) {
            Some(client) => client.sender.try_send(text),
            None => return false,
        };
        self.settle(id, outcome)
    }

    fn settle(&self, id: &Uuid, outcome: Result<(), TrySendError<String>>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client = %id, "websocket outbox full, dropping client");
                self.clients.remove(id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.clients.remove(id);
                false
            }
        }
    }

    /// Sends `message` to every connection on `route` subscribed to
    /// something matching `filter`. Returns the number of deliveries.
    pub fn send_message_to_route(
        &self,
        route: &str,
        filter: &Map<String, Value>,
        message: &WsMessage,
    ) -> usize {
        let Ok(text) = serde_json::to_string(message) else {
            return 0;
        };
        let outcomes: Vec<(Uuid, Result<(), TrySendError<String>>)> = self
            .clients
            .iter()
            .filter(|client| {
                client.route == route && client.subscriptions.iter().any(|s| matches_filter(s, filter))
            })
            .map(|client| (*client.key(), client.sender.try_send(text.clone())))
            .collect();

        outcomes
            .into_iter()
            .filter_map(|(id, outcome)| self.settle(&id, outcome).then_some(id))
            .count()
    }

    /// Connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_envelope_shape() {
        let message = WsMessage::new("ticker", json!({ "symbol": "BTC/USDT" }));
        let text = serde_json::to_string(&message).unwrap();
        assert_eq!(text, r#"{"type":"ticker","payload":{"symbol":"BTC/USDT"}}"#);

        let parsed: WsMessage = serde_json::from_str(r#"{"type":"tickers"}"#).unwrap();
        assert_eq!(parsed.kind, "tickers");
        assert_eq!(parsed.payload, Value::Null);
    }

    #[test]
    fn test_filter_matching() {
        let subscription = object(json!({ "type": "orderbook", "symbol": "BTC/USDT", "limit": 10 }));
        assert!(matches_filter(&subscription, &object(json!({ "type": "orderbook" }))));
        assert!(matches_filter(
            &subscription,
            &object(json!({ "type": "orderbook", "symbol": "BTC/USDT" }))
        ));
        assert!(!matches_filter(
            &subscription,
            &object(json!({ "type": "orderbook", "symbol": "ETH/USDT" }))
        ));
    }

    #[test]
    fn test_send_message_to_route_respects_route_and_filter() {
        let broker = Broker::new();
        let (spot, mut spot_rx) = broker.register("/api/v1/ecosystem/ws");
        let (futures, mut futures_rx) = broker.register("/api/v1/futures/ws");
        let (idle, mut idle_rx) = broker.register("/api/v1/ecosystem/ws");

        let subscription = object(json!({ "type": "ticker", "symbol": "BTC/USDT" }));
        assert!(broker.subscribe(&spot, subscription.clone()));
        assert!(broker.subscribe(&spot, subscription.clone()));
        assert!(broker.subscribe(&futures, subscription.clone()));

        let delivered = broker.send_message_to_route(
            "/api/v1/ecosystem/ws",
            &subscription,
            &WsMessage::new("ticker", json!({ "last": "1" })),
        );
        assert_eq!(delivered, 1);
        assert!(spot_rx.try_recv().is_ok());
        assert!(spot_rx.try_recv().is_err());
        assert!(futures_rx.try_recv().is_err());
        assert!(idle_rx.try_recv().is_err());

        assert!(broker.send_to_client(&idle, &WsMessage::new("pong", Value::Null)));
        assert!(idle_rx.try_recv().is_ok());
    }

    #[test]
    fn test_slow_client_is_dropped_when_outbox_fills() {
        let broker = Broker::new();
        let (slow, mut slow_rx) = broker.register_with_capacity("/ws", 2);
        let (fast, mut fast_rx) = broker.register("/ws");
        let subscription = object(json!({ "type": "trades" }));
        broker.subscribe(&slow, subscription.clone());
        broker.subscribe(&fast, subscription.clone());

        let trade = WsMessage::new("trade", json!({ "price": "1" }));
        assert_eq!(broker.send_message_to_route("/ws", &subscription, &trade), 2);
        assert_eq!(broker.send_message_to_route("/ws", &subscription, &trade), 2);
        assert_eq!(broker.send_message_to_route("/ws", &subscription, &trade), 1);

        assert_eq!(broker.client_count(), 1);
        assert!(!broker.send_to_client(&slow, &trade));
        assert!(slow_rx.try_recv().is_ok());
        assert!(slow_rx.try_recv().is_ok());
        assert!(slow_rx.try_recv().is_err());
        for _ in 0..3 {
            assert!(fast_rx.try_recv().is_ok());
        }
    }

    #[test]
    fn test_unsubscribe_and_unregister() {
        let broker = Broker::new();
        let (id, _rx) = broker.register("/ws");
        broker.subscribe(&id, object(json!({ "type": "ticker", "symbol": "A/B" })));
        broker.subscribe(&id, object(json!({ "type": "ticker", "symbol": "C/D" })));
        broker.subscribe(&id, object(json!({ "type": "tickers" })));

        assert_eq!(broker.unsubscribe(&id, &object(json!({ "type": "ticker" }))), 2);
        assert_eq!(broker.client_count(), 1);
        broker.unregister(&id);
        assert_eq!(broker.client_count(), 0);
        assert!(!broker.subscribe(&id, Map::new()));
    }
}
