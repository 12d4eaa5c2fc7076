use super::*;
use crate::api::test_support::{admin, auth};
use crate::models::{OrderSide, OrderType, Permission, PlaceOrderRequest};
use axum::extract::{Path, Query, State};
use rust_decimal_macros::dec;
use serde_json::json;

fn balance(state: &AppState, wallet_id: Uuid) -> rust_decimal::Decimal {
    state.store.wallets.get(&wallet_id).unwrap().balance
}

fn state() -> Arc<AppState> {
    Arc::new(AppState::new())
}

fn payload<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Json<T> {
    Json(serde_json::from_value(value).unwrap())
}

async fn user(state: &Arc<AppState>, email: &str) -> User {
    let (_, Json(user)) = create::<User>(
        State(Arc::clone(state)),
        admin(state),
        payload(json!({ "email": email, "firstName": "Test", "lastName": "User" })),
    )
    .await
    .unwrap();
    user
}

#[tokio::test]
async fn test_referral_lifecycle() {
    let state = state();
    let alice = user(&state, "alice@example.com").await;
    let bob = user(&state, "bob@example.com").await;

    let (status, Json(referral)) = create::<Referral>(
        State(Arc::clone(&state)),
        admin(&state),
        payload(json!({ "referrerId": alice.id, "referredId": bob.id })),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let Json(page) = list::<Referral>(
        State(Arc::clone(&state)),
        admin(&state),
        Query(ListQuery::default()),
    )
    .await
    .unwrap();
    assert_eq!(page.pagination.total_items, 1);

    let Json(done) = update_status_one::<Referral>(
        State(Arc::clone(&state)),
        admin(&state),
        Path(referral.id),
        payload(json!({ "status": "ACTIVE" })),
    )
    .await
    .unwrap();
    assert_eq!(done.count, 1);

    let Json(shown) = show::<Referral>(State(Arc::clone(&state)), admin(&state), Path(referral.id))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&shown).unwrap()["status"],
        json!("ACTIVE")
    );

    let Json(deleted) =
        destroy::<Referral>(State(Arc::clone(&state)), admin(&state), Path(referral.id))
            .await
            .unwrap();
    assert_eq!(deleted.count, 1);

    let missing =
        show::<Referral>(State(Arc::clone(&state)), admin(&state), Path(referral.id)).await;
    assert!(matches!(missing, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn test_self_referral_rejected() {
    let state = state();
    let alice = user(&state, "alice@example.com").await;

    let result = create::<Referral>(
        State(Arc::clone(&state)),
        admin(&state),
        payload(json!({ "referrerId": alice.id, "referredId": alice.id })),
    )
    .await;
    assert!(result.is_err());
    assert!(state.store.referrals.is_empty());
}

#[tokio::test]
async fn test_permissions_are_checked() {
    let state = state();
    let reader = auth(&state, vec![Permission::Read], None);

    let result = create::<User>(
        State(Arc::clone(&state)),
        reader.clone(),
        payload(json!({ "email": "x@example.com", "firstName": "X", "lastName": "Y" })),
    )
    .await;
    assert!(matches!(result, Err(ApiError::Forbidden(_))));

    let result = destroy::<User>(State(Arc::clone(&state)), reader.clone(), Path(Uuid::new_v4()))
        .await;
    assert!(matches!(result, Err(ApiError::Forbidden(_))));

    assert!(
        list::<User>(State(Arc::clone(&state)), reader, Query(ListQuery::default()))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_bulk_delete_unknown_id_is_not_found_and_atomic() {
    let state = state();
    let alice = user(&state, "alice@example.com").await;

    let result = destroy_bulk::<User>(
        State(Arc::clone(&state)),
        admin(&state),
        Json(BulkIdsRequest {
            ids: vec![alice.id, Uuid::new_v4()],
        }),
    )
    .await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
    assert!(state.store.users.contains(&alice.id));

    let result = destroy_bulk::<User>(
        State(Arc::clone(&state)),
        admin(&state),
        Json(BulkIdsRequest { ids: Vec::new() }),
    )
    .await;
    assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_deleting_a_stake_refunds_the_wallet() {
    let state = state();
    let staker = user(&state, "staker@example.com").await;
    let (_, Json(wallet)) = create::<Wallet>(
        State(Arc::clone(&state)),
        admin(&state),
        payload(json!({ "userId": staker.id, "type": "SPOT", "currency": "USDT", "balance": "500" })),
    )
    .await
    .unwrap();
    let (_, Json(pool)) = create::<StakingPool>(
        State(Arc::clone(&state)),
        admin(&state),
        payload(json!({
            "name": "USDT flexible",
            "currency": "USDT",
            "chain": "TRC20",
            "type": "SPOT",
            "minStake": "10",
            "maxStake": "1000"
        })),
    )
    .await
    .unwrap();
    let (_, Json(duration)) = create::<StakingDuration>(
        State(Arc::clone(&state)),
        admin(&state),
        payload(json!({ "poolId": pool.id, "duration": 30, "interestRate": "5" })),
    )
    .await
    .unwrap();
    let (_, Json(stake)) = create::<StakingLog>(
        State(Arc::clone(&state)),
        admin(&state),
        payload(json!({
            "userId": staker.id,
            "poolId": pool.id,
            "durationId": duration.id,
            "amount": "200"
        })),
    )
    .await
    .unwrap();
    assert_eq!(balance(&state, wallet.id), dec!(300));

    let Json(deleted) =
        destroy::<StakingLog>(State(Arc::clone(&state)), admin(&state), Path(stake.id))
            .await
            .unwrap();
    assert_eq!(deleted.count, 1);
    assert_eq!(balance(&state, wallet.id), dec!(500));
}

#[tokio::test]
async fn test_market_admin_keeps_engine_in_sync() {
    let state = state();
    let engine = state.exchange.engine(MarketKind::Ecosystem);

    let (_, Json(market)) = create::<EcosystemMarket>(
        State(Arc::clone(&state)),
        admin(&state),
        payload(json!({
            "currency": "eth",
            "pair": "usdt",
            "takerFee": "0.001",
            "makerFee": "0.001"
        })),
    )
    .await
    .unwrap();
    assert!(engine.has_market("ETH/USDT"));

    let Json(disabled) = update_status_bulk::<EcosystemMarket>(
        State(Arc::clone(&state)),
        admin(&state),
        payload(json!({ "ids": [market.id], "status": false })),
    )
    .await
    .unwrap();
    assert_eq!(disabled.count, 1);
    assert!(engine.has_market("ETH/USDT"));

    let Json(deleted) =
        destroy::<EcosystemMarket>(State(Arc::clone(&state)), admin(&state), Path(market.id))
            .await
            .unwrap();
    assert_eq!(deleted.count, 1);
    assert!(!engine.has_market("ETH/USDT"));
}

#[tokio::test]
async fn test_market_with_resting_orders_is_kept() {
    let state = state();
    let trader = user(&state, "maker@example.com").await;
    for currency in ["ETH", "USDT"] {
        let _ = create::<Wallet>(
            State(Arc::clone(&state)),
            admin(&state),
            payload(json!({ "userId": trader.id, "type": "ECO", "currency": currency, "balance": "1000" })),
        )
        .await
        .unwrap();
    }
    let (_, Json(market)) = create::<EcosystemMarket>(
        State(Arc::clone(&state)),
        admin(&state),
        payload(json!({ "currency": "ETH", "pair": "USDT", "takerFee": "0", "makerFee": "0" })),
    )
    .await
    .unwrap();
    state
        .exchange
        .place_order(
            MarketKind::Ecosystem,
            trader.id,
            PlaceOrderRequest {
                currency: "ETH".to_string(),
                pair: "USDT".to_string(),
                side: OrderSide::Sell,
                order_type: OrderType::Limit,
                price: Some(dec!(2000)),
                amount: dec!(1),
                leverage: None,
            },
        )
        .unwrap();

    let result =
        destroy::<EcosystemMarket>(State(Arc::clone(&state)), admin(&state), Path(market.id)).await;
    assert!(matches!(result, Err(ApiError::Conflict(_))));
    assert!(state.store.ecosystem_markets.contains(&market.id));
    assert!(state.exchange.engine(MarketKind::Ecosystem).has_market("ETH/USDT"));
    assert_eq!(state.exchange.engine(MarketKind::Ecosystem).resting_orders("ETH/USDT"), 1);
}
