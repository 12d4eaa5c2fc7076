//! API keys, permissions and the request authentication extractor.
//!
//! Keys are only ever stored as SHA-256 digests; the raw value is handed out
//! once at creation time. A key may be bound to a platform user, which is
//! required for trading endpoints.

use crate::error::ApiError;
use crate::models::{ApiKeyInfo, Permission};
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

/// Prefix for API keys.
const API_KEY_PREFIX: &str = "sk_live_";

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Length of the rate limiting window in milliseconds.
const WINDOW_MS: u64 = 60_000;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A stored key; only the digest of the raw key is kept.
#[derive(Debug)]
pub struct StoredApiKey {
    /// Key identifier.
    pub key_id: String,
    /// SHA-256 digest of the raw key.
    pub key_hash: String,
    /// Human-readable name.
    pub name: String,
    /// Granted permissions.
    pub permissions: Vec<Permission>,
    /// Requests per minute.
    pub rate_limit: u32,
    /// User the key trades for.
    pub user_id: Option<Uuid>,
    /// Creation time in milliseconds.
    pub created_at: u64,
    /// Last use in milliseconds (0 if never used).
    pub last_used_at: AtomicU64,
}

impl Clone for StoredApiKey {
    fn clone(&self) -> Self {
        Self {
            key_id: self.key_id.clone(),
            key_hash: self.key_hash.clone(),
            name: self.name.clone(),
            permissions: self.permissions.clone(),
            rate_limit: self.rate_limit,
            user_id: self.user_id,
            created_at: self.created_at,
            last_used_at: AtomicU64::new(self.last_used_at.load(Ordering::Relaxed)),
        }
    }
}

impl StoredApiKey {
    /// Public view without the digest.
    #[must_use]
    pub fn to_info(&self) -> ApiKeyInfo {
        let last_used = self.last_used_at.load(Ordering::Relaxed);
        ApiKeyInfo {
            key_id: self.key_id.clone(),
            name: self.name.clone(),
            permissions: self.permissions.clone(),
            rate_limit: self.rate_limit,
            user_id: self.user_id,
            created_at: self.created_at,
            last_used_at: (last_used > 0).then_some(last_used),
        }
    }

    /// Whether the key grants `permission`; `admin` grants everything.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission) || self.permissions.contains(&Permission::Admin)
    }

    fn touch(&self) {
        self.last_used_at.store(now_ms(), Ordering::Relaxed);
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Seconds until the oldest request leaves the window.
    pub retry_after: u64,
}

/// Requests between sweeps of idle identities.
const SWEEP_EVERY: u64 = 256;

/// Sliding-window rate limiter keyed by client identity.
///
/// Identities without a request in the current window are evicted every
/// [`SWEEP_EVERY`] requests.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<u64>>,
    calls: AtomicU64,
}

impl RateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request for `identity` if it fits in the window.
    pub fn check_and_record(&self, identity: &str, rate_limit: u32) -> RateDecision {
        self.check_and_record_at(identity, rate_limit, now_ms())
    }

    fn check_and_record_at(&self, identity: &str, rate_limit: u32, now: u64) -> RateDecision {
        let window_start = now.saturating_sub(WINDOW_MS);
        let decision = self.record(identity, rate_limit, now, window_start);

        if self.calls.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.windows
                .retain(|_, window| window.back().is_some_and(|&t| t >= window_start));
            debug!(tracked = self.windows.len(), "Rate limiter swept idle identities");
        }
        decision
    }

    fn record(&self, identity: &str, rate_limit: u32, now: u64, window_start: u64) -> RateDecision {
        let mut entry = self.windows.entry(identity.to_string()).or_default();
        let window = entry.value_mut();
        while window.front().is_some_and(|&t| t < window_start) {
            window.pop_front();
        }

        let limit = rate_limit as usize;
        if window.len() < limit {
            window.push_back(now);
            RateDecision {
                allowed: true,
                remaining: (limit - window.len()) as u32,
                retry_after: 0,
            }
        } else {
            let oldest = window.front().copied().unwrap_or(now);
            RateDecision {
                allowed: false,
                remaining: 0,
                retry_after: (oldest + WINDOW_MS).saturating_sub(now).div_ceil(1000).max(1),
            }
        }
    }

    /// Identities currently tracked.
    #[must_use]
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    /// Forgets the history of `identity`.
    pub fn clear(&self, identity: &str) {
        self.windows.remove(identity);
    }
}

/// In-memory API key registry.
#[derive(Debug, Default)]
pub struct ApiKeyStore {
    keys_by_id: DashMap<String, StoredApiKey>,
    hash_to_id: DashMap<String, String>,
    rate_limiter: RateLimiter,
}

impl ApiKeyStore {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_key() -> String {
        format!("{}{}", API_KEY_PREFIX, Uuid::new_v4().simple())
    }

    fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Creates a key and returns its stored view plus the raw key.
    pub fn create_key(
        &self,
        name: String,
        permissions: Vec<Permission>,
        rate_limit: u32,
        user_id: Option<Uuid>,
    ) -> (ApiKeyInfo, String) {
        let raw_key = Self::generate_key();
        let info = self.register_key(&raw_key, name, permissions, rate_limit, user_id);
        (info, raw_key)
    }

    /// Registers a caller-chosen raw key, e.g. the configured admin key.
    pub fn register_key(
        &self,
        raw_key: &str,
        name: String,
        permissions: Vec<Permission>,
        rate_limit: u32,
        user_id: Option<Uuid>,
    ) -> ApiKeyInfo {
        let key_hash = Self::hash_key(raw_key);
        let stored = StoredApiKey {
            key_id: Uuid::new_v4().to_string(),
            key_hash: key_hash.clone(),
            name,
            permissions,
            rate_limit,
            user_id,
            created_at: now_ms(),
            last_used_at: AtomicU64::new(0),
        };
        let info = stored.to_info();
        if let Some((_, previous)) = self.hash_to_id.remove(&key_hash) {
            self.keys_by_id.remove(&previous);
        }
        self.hash_to_id.insert(key_hash, stored.key_id.clone());
        self.keys_by_id.insert(stored.key_id.clone(), stored);
        info
    }

    /// Looks up a raw key and marks it used.
    #[must_use]
    pub fn validate_key(&self, raw_key: &str) -> Option<StoredApiKey> {
        let key_id = self.hash_to_id.get(&Self::hash_key(raw_key))?;
        let stored = self.keys_by_id.get(key_id.value())?;
        stored.touch();
        Some(stored.clone())
    }

    /// Applies the rate limit of `identity`.
    pub fn check_rate_limit(&self, identity: &str, rate_limit: u32) -> RateDecision {
        self.rate_limiter.check_and_record(identity, rate_limit)
    }

    /// All keys, oldest first.
    #[must_use]
    pub fn list_keys(&self) -> Vec<ApiKeyInfo> {
        let mut keys: Vec<ApiKeyInfo> = self.keys_by_id.iter().map(|k| k.to_info()).collect();
        keys.sort_by_key(|k| k.created_at);
        keys
    }

    /// Revokes a key.
    pub fn delete_key(&self, key_id: &str) -> bool {
        match self.keys_by_id.remove(key_id) {
            Some((_, stored)) => {
                self.hash_to_id.remove(&stored.key_hash);
                self.rate_limiter.clear(key_id);
                true
            }
            None => false,
        }
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys_by_id.len()
    }

    /// Whether no key exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys_by_id.is_empty()
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The caller's key.
    pub key: StoredApiKey,
}

impl AuthContext {
    /// Fails with `Forbidden` unless the key grants `permission`.
    ///
    /// # Errors
    /// Returns `Forbidden` when the permission is missing.
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.key.has_permission(permission) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "API key {} lacks the {:?} permission",
                self.key.key_id, permission
            )))
        }
    }

    /// The user the key acts for.
    ///
    /// # Errors
    /// Returns `Forbidden` for keys not bound to a user.
    pub fn user_id(&self) -> Result<Uuid, ApiError> {
        self.key.user_id.ok_or_else(|| {
            ApiError::Forbidden(format!("API key {} is not bound to a user", self.key.key_id))
        })
    }
}

impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing API key".to_string()))?;
        let key = state
            .api_keys
            .validate_key(raw)
            .ok_or_else(|| ApiError::Unauthorized("invalid API key".to_string()))?;
        debug!(key_id = %key.key_id, "request authenticated");
        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_validate() {
        let store = ApiKeyStore::new();
        let user = Uuid::new_v4();
        let (info, raw_key) = store.create_key(
            "Trader".to_string(),
            vec![Permission::Read, Permission::Trade],
            1000,
            Some(user),
        );

        assert!(raw_key.starts_with(API_KEY_PREFIX));
        let stored = store.validate_key(&raw_key).unwrap();
        assert_eq!(stored.key_id, info.key_id);
        assert_eq!(stored.user_id, Some(user));
        assert!(stored.has_permission(Permission::Trade));
        assert!(!stored.has_permission(Permission::Delete));
        assert!(stored.to_info().last_used_at.is_some());
        assert!(store.validate_key("sk_live_nope").is_none());
    }

    #[test]
    fn test_register_replaces_same_raw_key() {
        let store = ApiKeyStore::new();
        store.register_key("sk_live_admin", "a".to_string(), vec![Permission::Admin], 10, None);
        store.register_key("sk_live_admin", "b".to_string(), vec![Permission::Admin], 10, None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.validate_key("sk_live_admin").unwrap().name, "b");
    }

    #[test]
    fn test_delete_revokes() {
        let store = ApiKeyStore::new();
        let (info, raw_key) = store.create_key("Gone".to_string(), vec![Permission::Read], 10, None);
        assert!(store.delete_key(&info.key_id));
        assert!(store.validate_key(&raw_key).is_none());
        assert!(!store.delete_key(&info.key_id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_admin_grants_everything() {
        let store = ApiKeyStore::new();
        let (_, raw_key) = store.create_key("Root".to_string(), vec![Permission::Admin], 10, None);
        let context = AuthContext {
            key: store.validate_key(&raw_key).unwrap(),
        };
        assert!(context.require(Permission::Delete).is_ok());
        assert!(matches!(context.user_id(), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn test_missing_permission_is_forbidden() {
        let store = ApiKeyStore::new();
        let (_, raw_key) = store.create_key("Reader".to_string(), vec![Permission::Read], 10, None);
        let context = AuthContext {
            key: store.validate_key(&raw_key).unwrap(),
        };
        assert!(matches!(
            context.require(Permission::Write),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn test_rate_limiter_window() {
        let limiter = RateLimiter::new();
        for expected_remaining in (0..5).rev() {
            let decision = limiter.check_and_record("k", 5);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
        let denied = limiter.check_and_record("k", 5);
        assert!(!denied.allowed);
        assert!(denied.retry_after >= 1);
        assert!(limiter.check_and_record("other", 5).allowed);

        limiter.clear("k");
        assert!(limiter.check_and_record("k", 5).allowed);
    }

    #[test]
    fn test_rate_limiter_evicts_idle_identities() {
        let limiter = RateLimiter::new();
        let start = 1_000_000;
        for i in 0..100 {
            assert!(limiter.check_and_record_at(&format!("10.0.0.{}", i), 5, start).allowed);
        }
        assert_eq!(limiter.tracked_identities(), 100);

        let later = start + WINDOW_MS + 1;
        for _ in 0..SWEEP_EVERY {
            limiter.check_and_record_at("live", 1000, later);
        }
        assert_eq!(limiter.tracked_identities(), 1);
    }
}
