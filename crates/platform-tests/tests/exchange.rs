//! Order placement and market data tests.

use platform_client::{
    ChartParams, Error, MarketKind, OrderQuery, OrderSide, OrderStatus, PlaceOrderRequest,
};
use platform_tests::TestServer;

fn num(value: &str) -> f64 {
    value.parse().expect("decimal string")
}

#[tokio::test]
async fn test_spot_trade_updates_market_data() {
    let server = TestServer::spawn().await;
    let (_, seller) = server
        .trader("seller@example.com", &[("ECO", "BTC", "2"), ("ECO", "USDT", "0")])
        .await;
    let (_, buyer) = server
        .trader("buyer@example.com", &[("ECO", "BTC", "0"), ("ECO", "USDT", "1000")])
        .await;

    let ask = seller
        .place_order(
            MarketKind::Ecosystem,
            &PlaceOrderRequest::limit("BTC", "USDT", OrderSide::Sell, "100", "1"),
        )
        .await
        .expect("Failed to place ask");
    assert_eq!(ask.order.status, OrderStatus::Active);
    assert!(ask.trades.is_empty());

    let book = server
        .anonymous
        .get_order_book(MarketKind::Ecosystem, "BTC", "USDT", Some(10))
        .await
        .expect("Failed to get order book");
    assert_eq!(book.asks.len(), 1);
    assert_eq!(num(&book.asks[0].price), 100.0);
    assert!(book.bids.is_empty());

    let bid = buyer
        .place_order(
            MarketKind::Ecosystem,
            &PlaceOrderRequest::limit("BTC", "USDT", OrderSide::Buy, "100", "1"),
        )
        .await
        .expect("Failed to place bid");
    assert_eq!(bid.order.status, OrderStatus::Filled);
    assert_eq!(bid.trades.len(), 1);

    let ticker = server
        .anonymous
        .get_ticker(MarketKind::Ecosystem, "BTC", "USDT")
        .await
        .expect("Failed to get ticker");
    assert_eq!(ticker.last.as_deref().map(num), Some(100.0));

    let trades = server
        .anonymous
        .get_trades(MarketKind::Ecosystem, "BTC", "USDT", None)
        .await
        .expect("Failed to get trades");
    assert_eq!(trades.len(), 1);

    let chart = server
        .anonymous
        .get_chart(MarketKind::Ecosystem, "BTC", "USDT", &ChartParams::interval("1m"))
        .await
        .expect("Failed to get chart");
    assert_eq!(chart.bars.len(), 1);
    assert_eq!(chart.bars[0].trade_count, 1);

    let filled = seller
        .list_orders(
            MarketKind::Ecosystem,
            Some(&OrderQuery {
                status: Some("filled".to_string()),
                ..Default::default()
            }),
        )
        .await
        .expect("Failed to list orders");
    assert_eq!(filled.pagination.total_items, 1);

    let cancel = seller
        .cancel_order(MarketKind::Ecosystem, &ask.order.id)
        .await;
    assert!(matches!(cancel, Err(Error::Api { status: 409, .. })));
}

#[tokio::test]
async fn test_cancel_releases_the_order() {
    let server = TestServer::spawn().await;
    let (_, seller) = server
        .trader("seller@example.com", &[("ECO", "BTC", "2"), ("ECO", "USDT", "0")])
        .await;
    let (_, other) = server
        .trader("other@example.com", &[("ECO", "BTC", "0"), ("ECO", "USDT", "0")])
        .await;

    let ask = seller
        .place_order(
            MarketKind::Ecosystem,
            &PlaceOrderRequest::limit("BTC", "USDT", OrderSide::Sell, "150", "1"),
        )
        .await
        .expect("Failed to place ask");

    let foreign = other.cancel_order(MarketKind::Ecosystem, &ask.order.id).await;
    assert!(matches!(foreign, Err(Error::NotFound(_))));

    let canceled = seller
        .cancel_order(MarketKind::Ecosystem, &ask.order.id)
        .await
        .expect("Failed to cancel");
    assert_eq!(canceled.status, OrderStatus::Canceled);

    let book = server
        .anonymous
        .get_order_book(MarketKind::Ecosystem, "BTC", "USDT", None)
        .await
        .expect("Failed to get order book");
    assert!(book.asks.is_empty());
}

#[tokio::test]
async fn test_futures_fill_opens_positions() {
    let server = TestServer::spawn().await;
    let (_, short) = server
        .trader("short@example.com", &[("FUTURES", "USDT", "1000")])
        .await;
    let (_, long) = server
        .trader("long@example.com", &[("FUTURES", "USDT", "1000")])
        .await;

    short
        .place_order(
            MarketKind::Futures,
            &PlaceOrderRequest::limit("BTC", "USDT", OrderSide::Sell, "100", "1").with_leverage(10),
        )
        .await
        .expect("Failed to place short");
    let fill = long
        .place_order(
            MarketKind::Futures,
            &PlaceOrderRequest::limit("BTC", "USDT", OrderSide::Buy, "100", "1").with_leverage(10),
        )
        .await
        .expect("Failed to place long");
    assert_eq!(fill.trades.len(), 1);

    let positions = long.list_positions().await.expect("Failed to list positions");
    assert_eq!(positions.len(), 1);
    assert_eq!(num(&positions[0].size), 1.0);

    let positions = short.list_positions().await.expect("Failed to list positions");
    assert_eq!(num(&positions[0].size), -1.0);
}

#[tokio::test]
async fn test_trading_needs_a_key_and_a_known_market() {
    let server = TestServer::spawn().await;
    let order = PlaceOrderRequest::limit("BTC", "USDT", OrderSide::Buy, "100", "1");

    let result = server
        .anonymous
        .place_order(MarketKind::Ecosystem, &order)
        .await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));

    let result = server
        .anonymous
        .get_ticker(MarketKind::Ecosystem, "DOGE", "USDT")
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}
