//! API routes module.

pub mod broker;
pub mod crud;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod websocket;

pub use routes::create_router;

/// Order book depth returned when the client does not ask for one.
pub const DEFAULT_BOOK_DEPTH: usize = 50;

/// Deepest order book snapshot served.
pub const MAX_BOOK_DEPTH: usize = 500;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::auth::AuthContext;
    use crate::models::Permission;
    use crate::state::AppState;
    use uuid::Uuid;

    /// An authenticated caller with the given permissions.
    pub fn auth(state: &AppState, permissions: Vec<Permission>, user_id: Option<Uuid>) -> AuthContext {
        let (_, raw) = state
            .api_keys
            .create_key("test".to_string(), permissions, 1000, user_id);
        AuthContext {
            key: state.api_keys.validate_key(&raw).unwrap(),
        }
    }

    /// A caller holding every permission.
    pub fn admin(state: &AppState) -> AuthContext {
        auth(state, vec![Permission::Admin], None)
    }
}
