//! Unit tests for error module.

use super::*;

// ============================================================================
// ErrorResponse Tests
// ============================================================================

#[test]
fn test_error_response_serialization() {
    let response = ErrorResponse {
        error: "Something went wrong".to_string(),
        code: "INTERNAL_ERROR".to_string(),
    };

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"error\":\"Something went wrong\""));
    assert!(json.contains("\"code\":\"INTERNAL_ERROR\""));
}

#[test]
fn test_rate_limit_error_response_serialization() {
    let response = RateLimitErrorResponse {
        error: "Rate limit exceeded".to_string(),
        code: "RATE_LIMIT_EXCEEDED".to_string(),
        limit: 100,
        remaining: 0,
        reset: 1704067260,
        retry_after: 60,
    };

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"limit\":100"));
    assert!(json.contains("\"retry_after\":60"));
}

// ============================================================================
// ApiError Display Tests
// ============================================================================

#[test]
fn test_not_found_helper_message() {
    let error = ApiError::not_found("referral", "abc");
    assert_eq!(format!("{}", error), "Not found: referral abc not found");
}

#[test]
fn test_invalid_request_display() {
    let error = ApiError::InvalidRequest("Referrer and referred user must differ".to_string());
    assert_eq!(
        format!("{}", error),
        "Invalid request: Referrer and referred user must differ"
    );
}

#[test]
fn test_insufficient_funds_display() {
    let error = ApiError::InsufficientFunds("wallet USDT".to_string());
    assert_eq!(format!("{}", error), "Insufficient funds: wallet USDT");
}

// ============================================================================
// ApiError IntoResponse Tests
// ============================================================================

#[test]
fn test_not_found_into_response() {
    let response = ApiError::NotFound("x".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_market_not_found_into_response() {
    let response = ApiError::MarketNotFound("BTC/USDT".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_unauthorized_into_response() {
    let response = ApiError::Unauthorized("missing key".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_forbidden_into_response() {
    let response = ApiError::Forbidden("admin".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[test]
fn test_conflict_into_response() {
    let response = ApiError::Conflict("open orders".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[test]
fn test_insufficient_funds_into_response() {
    let response = ApiError::InsufficientFunds("x".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_database_into_response() {
    let response = ApiError::Database("DB error".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_rate_limit_exceeded_into_response() {
    let error = ApiError::RateLimitExceeded {
        limit: 100,
        remaining: 0,
        reset: 1704067260,
        retry_after: 60,
    };
    let response = error.into_response();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok()),
        Some("60")
    );
}

#[test]
fn test_matching_error_conversion() {
    let error: ApiError =
        crate::matching::MatchingError::UnknownMarket("ETH/USDT".to_string()).into();
    assert!(matches!(error, ApiError::MarketNotFound(_)));

    let error: ApiError = crate::matching::MatchingError::MarketDisabled("ETH/USDT".to_string())
        .into();
    assert_eq!(error.status_and_code().1, "MATCHING_ERROR");
}

#[test]
fn test_open_orders_maps_to_conflict() {
    let error: ApiError = crate::matching::MatchingError::OpenOrders("BTC/USDT".to_string()).into();
    assert_eq!(error.status_and_code().0, StatusCode::CONFLICT);
}
