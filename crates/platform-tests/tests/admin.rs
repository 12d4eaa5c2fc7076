//! Admin CRUD tests.

use platform_client::{Error, ListParams};
use platform_tests::TestServer;
use serde_json::{Value, json};

async fn user(server: &TestServer, email: &str) -> String {
    let user: Value = server
        .admin
        .create_resource(
            "users",
            &json!({ "email": email, "firstName": "Test", "lastName": "User" }),
        )
        .await
        .expect("Failed to create user");
    user["id"].as_str().expect("user id").to_string()
}

#[tokio::test]
async fn test_referral_crud() {
    let server = TestServer::spawn().await;
    let alice = user(&server, "alice@example.com").await;
    let bob = user(&server, "bob@example.com").await;

    let referral: Value = server
        .admin
        .create_resource("referrals", &json!({ "referrerId": alice, "referredId": bob }))
        .await
        .expect("Failed to create referral");
    let id = referral["id"].as_str().expect("referral id").to_string();
    assert_eq!(referral["referrerId"], json!(alice));

    let page = server
        .admin
        .list_resources::<Value>("referrals", Some(&ListParams::default()))
        .await
        .expect("Failed to list referrals");
    assert_eq!(page.pagination.total_items, 1);

    let updated = server
        .admin
        .update_status("referrals", &id, "ACTIVE")
        .await
        .expect("Failed to update status");
    assert_eq!(updated.count, 1);

    let fetched: Value = server
        .admin
        .get_resource("referrals", &id)
        .await
        .expect("Failed to get referral");
    assert_eq!(fetched["status"], "ACTIVE");

    let deleted = server
        .admin
        .delete_resource("referrals", &id)
        .await
        .expect("Failed to delete referral");
    assert_eq!(deleted.count, 1);

    let missing = server.admin.get_resource::<Value>("referrals", &id).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_self_referral_is_rejected() {
    let server = TestServer::spawn().await;
    let alice = user(&server, "alice@example.com").await;

    let result = server
        .admin
        .create_resource::<_, Value>(
            "referrals",
            &json!({ "referrerId": alice, "referredId": alice }),
        )
        .await;

    assert!(matches!(result, Err(Error::InvalidRequest(_))));
}

#[tokio::test]
async fn test_bulk_delete_is_all_or_nothing() {
    let server = TestServer::spawn().await;
    let alice = user(&server, "alice@example.com").await;
    let bob = user(&server, "bob@example.com").await;

    let result = server
        .admin
        .delete_resources(
            "users",
            &[alice.clone(), "00000000-0000-0000-0000-000000000000".to_string()],
        )
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    let deleted = server
        .admin
        .delete_resources("users", &[alice, bob])
        .await
        .expect("Failed to bulk delete");
    assert_eq!(deleted.count, 2);
}

#[tokio::test]
async fn test_admin_routes_need_a_key() {
    let server = TestServer::spawn().await;

    let result = server
        .anonymous
        .list_resources::<Value>("users", None)
        .await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));

    let result = server
        .anonymous
        .with_api_key("sk_live_not_a_key")
        .list_resources::<Value>("users", None)
        .await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
}
