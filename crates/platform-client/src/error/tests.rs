//! Unit tests for error module.

use super::*;

#[test]
fn test_api_error_display() {
    let error = Error::Api {
        status: 409,
        message: "market has open orders".to_string(),
    };

    let display = format!("{}", error);
    assert!(display.contains("409"));
    assert!(display.contains("market has open orders"));
}

#[test]
fn test_from_status_maps_known_codes() {
    assert!(matches!(
        Error::from_status(400, "bad".to_string()),
        Error::InvalidRequest(_)
    ));
    assert!(matches!(
        Error::from_status(401, "no key".to_string()),
        Error::Unauthorized(_)
    ));
    assert!(matches!(
        Error::from_status(404, "missing".to_string()),
        Error::NotFound(_)
    ));
    assert!(matches!(
        Error::from_status(429, "slow down".to_string()),
        Error::Api { status: 429, .. }
    ));
}

#[test]
fn test_status_round_trips_through_from_status() {
    for status in [400, 401, 403, 404, 409, 500] {
        assert_eq!(
            Error::from_status(status, String::new()).status(),
            Some(status)
        );
    }
    assert_eq!(Error::ConnectionClosed.status(), None);
}

#[test]
fn test_unauthorized_error_display() {
    let error = Error::Unauthorized("missing API key".to_string());

    let display = format!("{}", error);
    assert!(display.contains("Unauthorized"));
    assert!(display.contains("missing API key"));
}

#[test]
fn test_connection_closed_error_display() {
    let display = format!("{}", Error::ConnectionClosed);
    assert!(display.contains("Connection closed"));
}
