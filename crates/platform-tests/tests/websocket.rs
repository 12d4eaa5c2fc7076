//! WebSocket connection and message handling tests.

use platform_client::{MarketKind, OrderSide, PlaceOrderRequest, WsMessage};
use platform_tests::{TestServer, recv_within};
use serde_json::json;

#[tokio::test]
async fn test_websocket_greets_with_client_id() {
    let server = TestServer::spawn().await;

    // `websocket` asserts the route of the greeting.
    let _ws = server.websocket(MarketKind::Futures).await;
}

#[tokio::test]
async fn test_ping_and_unknown_messages() {
    let server = TestServer::spawn().await;
    let mut ws = server.websocket(MarketKind::Ecosystem).await;

    ws.ping().await.expect("Failed to send ping");
    recv_within(&mut ws, "pong").await;

    ws.send(WsMessage::new("launch", json!({})))
        .await
        .expect("Failed to send");
    let error = recv_within(&mut ws, "error").await;
    assert!(error.payload["message"].is_string());
}

#[tokio::test]
async fn test_orderbook_snapshot_then_updates() {
    let server = TestServer::spawn().await;
    let mut ws = server.websocket(MarketKind::Ecosystem).await;

    ws.order_book("BTC/USDT", Some(10))
        .await
        .expect("Failed to request order book");
    let snapshot = recv_within(&mut ws, "orderbook").await;
    assert_eq!(snapshot.payload["symbol"], "BTC/USDT");
    assert_eq!(snapshot.payload["asks"], json!([]));

    let (_, seller) = server
        .trader("seller@example.com", &[("ECO", "BTC", "1"), ("ECO", "USDT", "0")])
        .await;
    seller
        .place_order(
            MarketKind::Ecosystem,
            &PlaceOrderRequest::limit("BTC", "USDT", OrderSide::Sell, "100", "1"),
        )
        .await
        .expect("Failed to place ask");

    let update = recv_within(&mut ws, "orderbook").await;
    assert_eq!(update.payload["asks"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_unknown_market_snapshot_is_an_error() {
    let server = TestServer::spawn().await;
    let mut ws = server.websocket(MarketKind::Ecosystem).await;

    ws.ticker("NOPE/USDT").await.expect("Failed to request ticker");
    recv_within(&mut ws, "error").await;
}
