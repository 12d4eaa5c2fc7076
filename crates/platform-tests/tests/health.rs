//! Health check and status endpoint tests.

use platform_tests::TestServer;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::spawn().await;

    let health = server
        .anonymous
        .health_check()
        .await
        .expect("Health check failed");

    assert_eq!(health.status, "healthy");
    assert!(!health.version.is_empty());
}

#[tokio::test]
async fn test_stats_count_configured_markets() {
    let server = TestServer::spawn().await;

    let stats = server.admin.get_stats().await.expect("Failed to get stats");

    assert_eq!(stats.ecosystem_markets, 1);
    assert_eq!(stats.futures_markets, 1);
    assert_eq!(stats.open_orders, 0);
}
