//! Unit tests for client module.

use super::*;

// ============================================================================
// ClientConfig Tests
// ============================================================================

#[test]
fn test_client_config_default() {
    let config = ClientConfig::default();

    assert_eq!(config.base_url, "http://localhost:8080");
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert!(config.api_key.is_none());
}

// ============================================================================
// PlatformClient Creation Tests
// ============================================================================

#[test]
fn test_platform_client_new() {
    let client = PlatformClient::new(ClientConfig {
        api_key: Some("sk_live_test".to_string()),
        ..Default::default()
    });

    assert!(client.is_ok());
}

#[test]
fn test_platform_client_base_url_trimmed() {
    let client = PlatformClient::with_base_url("http://localhost:3000/").unwrap();

    assert_eq!(client.base_url(), "http://localhost:3000");
}

#[test]
fn test_with_api_key_keeps_base_url() {
    let client = PlatformClient::with_base_url("http://localhost:3000").unwrap();
    let keyed = client.with_api_key("sk_live_abc");

    assert_eq!(keyed.base_url(), client.base_url());
    assert_eq!(keyed.api_key.as_deref(), Some("sk_live_abc"));
    assert!(client.api_key.is_none());
}

// ============================================================================
// Path building
// ============================================================================

#[test]
fn test_admin_path_trims_slashes() {
    assert_eq!(admin_path("referrals"), "/api/v1/admin/referrals");
    assert_eq!(admin_path("/staking/pools/"), "/api/v1/admin/staking/pools");
}

#[test]
fn test_with_query_skips_empty_params() {
    let empty = ListParams::default();
    assert_eq!(with_query("/x", Some(&empty)), "/x");
    assert_eq!(with_query::<ListParams>("/x", None), "/x");

    let params = ListParams {
        search: Some("alice".to_string()),
        ..Default::default()
    };
    assert_eq!(with_query("/x", Some(&params)), "/x?search=alice");
}
