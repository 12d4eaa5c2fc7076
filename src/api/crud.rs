//! Admin CRUD endpoints shared by every platform resource.
//!
//! Each resource is mounted under `/api/v1/admin/<resource>` with list,
//! store, bulk delete, show, update and delete routes; resources with a
//! status column also get single and bulk status routes. Reads need the
//! `read` permission, creates and updates `write`, deletes `delete`.

use crate::auth::AuthContext;
use crate::config::MarketKind;
use crate::entities::{
    ai::{AiInvestment, AiInvestmentPlan},
    forex::{ForexDuration, ForexInvestment, ForexPlan, ForexSignal},
    ico::{IcoContribution, IcoPhase, IcoToken},
    markets::{EcosystemMarket, FuturesMarket},
    p2p::{P2pDispute, P2pEscrow, P2pOffer, P2pReview, P2pTrade},
    referral::{Referral, ReferralReward},
    staking::{StakingDuration, StakingLog, StakingPool},
    users::User,
    wallets::{Transaction, Wallet},
};
use crate::error::ApiError;
use crate::models::{BulkIdsRequest, BulkStatusRequest, MessageResponse, Permission, StatusRequest};
use crate::state::AppState;
use crate::store::{self, Entity, HasStatus, ListQuery, Paginated};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// An entity exposed through the admin API.
///
/// The hooks keep state outside the store in step with admin changes.
pub trait Resource: Entity {
    /// Runs after a record was stored, updated or had its status changed.
    fn after_write(_state: &AppState, _record: &Self) {}

    /// Runs under the store guard before records are deleted; an error
    /// aborts the delete.
    ///
    /// # Errors
    /// Returns the reason the records cannot be deleted.
    fn before_delete(_state: &AppState, _records: &[Self]) -> Result<(), ApiError> {
        Ok(())
    }

    /// Runs after records were deleted.
    fn after_delete(_state: &AppState, _records: &[Self]) {}
}

macro_rules! plain_resource {
    ($($ty:ty),* $(,)?) => {
        $(impl Resource for $ty {})*
    };
}

plain_resource!(
    User,
    Wallet,
    Transaction,
    Referral,
    ReferralReward,
    AiInvestmentPlan,
    AiInvestment,
    ForexPlan,
    ForexDuration,
    ForexInvestment,
    ForexSignal,
    IcoToken,
    IcoPhase,
    IcoContribution,
    StakingPool,
    StakingDuration,
    StakingLog,
    P2pOffer,
    P2pTrade,
    P2pEscrow,
    P2pDispute,
    P2pReview,
);

fn ensure_unlistable(
    state: &AppState,
    kind: MarketKind,
    symbols: impl Iterator<Item = String>,
) -> Result<(), ApiError> {
    for symbol in symbols {
        state.exchange.ensure_unlistable(kind, &symbol)?;
    }
    Ok(())
}

fn unlist(state: &AppState, kind: MarketKind, symbols: impl Iterator<Item = String>) {
    for symbol in symbols {
        if let Err(e) = state.exchange.unlist_market(kind, &symbol) {
            warn!("Market {} could not be unlisted: {}", symbol, e);
        }
    }
}

impl Resource for EcosystemMarket {
    fn after_write(state: &AppState, record: &Self) {
        state
            .exchange
            .list_market(MarketKind::Ecosystem, &record.symbol(), record.status);
    }

    fn before_delete(state: &AppState, records: &[Self]) -> Result<(), ApiError> {
        ensure_unlistable(state, MarketKind::Ecosystem, records.iter().map(Self::symbol))
    }

    fn after_delete(state: &AppState, records: &[Self]) {
        unlist(state, MarketKind::Ecosystem, records.iter().map(Self::symbol));
    }
}

impl Resource for FuturesMarket {
    fn after_write(state: &AppState, record: &Self) {
        state
            .exchange
            .list_market(MarketKind::Futures, &record.symbol(), record.status);
    }

    fn before_delete(state: &AppState, records: &[Self]) -> Result<(), ApiError> {
        ensure_unlistable(state, MarketKind::Futures, records.iter().map(Self::symbol))
    }

    fn after_delete(state: &AppState, records: &[Self]) {
        unlist(state, MarketKind::Futures, records.iter().map(Self::symbol));
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Lists records with filtering, search, sorting and pagination.
pub async fn list<E: Resource>(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<E>>, ApiError> {
    auth.require(Permission::Read)?;
    store::get_filtered::<E>(&state.store, &query).map(Json)
}

/// Fetches one record.
pub async fn show<E: Resource>(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<E>, ApiError> {
    auth.require(Permission::Read)?;
    store::get_record::<E>(&state.store, id).map(Json)
}

/// Creates a record.
pub async fn create<E: Resource>(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(req): Json<E::Create>,
) -> Result<(StatusCode, Json<E>), ApiError> {
    auth.require(Permission::Write)?;
    let record = store::store_record::<E>(&state.store, req)?;
    E::after_write(&state, &record);
    Ok((StatusCode::CREATED, Json(record)))
}

/// Updates a record.
pub async fn update<E: Resource>(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<E::Update>,
) -> Result<Json<E>, ApiError> {
    auth.require(Permission::Write)?;
    let record = store::update_record::<E>(&state.store, id, req)?;
    E::after_write(&state, &record);
    Ok(Json(record))
}

fn delete_records<E: Resource>(state: &AppState, ids: &[Uuid]) -> Result<usize, ApiError> {
    // Orders are placed under the same guard, so the check still holds when
    // the records go.
    let deleted = store::handle_bulk_delete_with::<E, _>(&state.store, ids, |records| {
        E::before_delete(state, records)
    })?;
    E::after_delete(state, &deleted);
    Ok(deleted.len())
}

/// Deletes one record, refunding what it holds first.
pub async fn destroy<E: Resource>(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    auth.require(Permission::Delete)?;
    let count = delete_records::<E>(&state, &[id])?;
    Ok(Json(MessageResponse {
        message: format!("{} removed successfully", E::NAME),
        count,
    }))
}

/// Deletes several records; all or nothing.
pub async fn destroy_bulk<E: Resource>(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(req): Json<BulkIdsRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    auth.require(Permission::Delete)?;
    if req.ids.is_empty() {
        return Err(ApiError::InvalidRequest("ids cannot be empty".to_string()));
    }
    let count = delete_records::<E>(&state, &req.ids)?;
    Ok(Json(MessageResponse {
        message: format!("{} {} record(s) removed successfully", count, E::NAME),
        count,
    }))
}

fn set_status<E: Resource + HasStatus>(
    state: &AppState,
    ids: &[Uuid],
    status: E::Status,
) -> Result<usize, ApiError> {
    let updated = store::update_status::<E>(&state.store, ids, status)?;
    for record in &updated {
        E::after_write(state, record);
    }
    Ok(updated.len())
}

/// Sets the status of several records.
pub async fn update_status_bulk<E: Resource + HasStatus>(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(req): Json<BulkStatusRequest<E::Status>>,
) -> Result<Json<MessageResponse>, ApiError> {
    auth.require(Permission::Write)?;
    let count = set_status::<E>(&state, &req.ids, req.status)?;
    Ok(Json(MessageResponse {
        message: format!("{} {} status(es) updated to {:?}", count, E::NAME, req.status),
        count,
    }))
}

/// Sets the status of one record.
pub async fn update_status_one<E: Resource + HasStatus>(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest<E::Status>>,
) -> Result<Json<MessageResponse>, ApiError> {
    auth.require(Permission::Write)?;
    let count = set_status::<E>(&state, &[id], req.status)?;
    Ok(Json(MessageResponse {
        message: format!("{} status updated to {:?}", E::NAME, req.status),
        count,
    }))
}

// ============================================================================
// Mounting
// ============================================================================

/// Mounts the CRUD routes of `E` at `base`.
pub fn mount<E: Resource>(router: Router<Arc<AppState>>, base: &str) -> Router<Arc<AppState>> {
    router
        .route(
            base,
            get(list::<E>).post(create::<E>).delete(destroy_bulk::<E>),
        )
        .route(
            &format!("{}/{{id}}", base),
            get(show::<E>).put(update::<E>).delete(destroy::<E>),
        )
}

/// Mounts the CRUD and status routes of `E` at `base`.
pub fn mount_with_status<E: Resource + HasStatus>(
    router: Router<Arc<AppState>>,
    base: &str,
) -> Router<Arc<AppState>> {
    mount::<E>(router, base)
        .route(&format!("{}/status", base), put(update_status_bulk::<E>))
        .route(&format!("{}/{{id}}/status", base), put(update_status_one::<E>))
}

/// Mounts every admin resource under `/api/v1/admin`.
pub fn admin_routes(router: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    const ADMIN: &str = "/api/v1/admin";
    let at = |resource: &str| format!("{}/{}", ADMIN, resource);

    let router = mount_with_status::<User>(router, &at("users"));
    let router = mount_with_status::<Wallet>(router, &at("wallets"));
    let router = mount_with_status::<Transaction>(router, &at("transactions"));

    let router = mount_with_status::<Referral>(router, &at("referrals"));
    let router = mount::<ReferralReward>(router, &at("referral-rewards"));

    let router = mount_with_status::<AiInvestmentPlan>(router, &at("ai/plans"));
    let router = mount_with_status::<AiInvestment>(router, &at("ai/investments"));

    let router = mount_with_status::<ForexPlan>(router, &at("forex/plans"));
    let router = mount::<ForexDuration>(router, &at("forex/durations"));
    let router = mount_with_status::<ForexInvestment>(router, &at("forex/investments"));
    let router = mount_with_status::<ForexSignal>(router, &at("forex/signals"));

    let router = mount_with_status::<IcoToken>(router, &at("ico/tokens"));
    let router = mount_with_status::<IcoPhase>(router, &at("ico/phases"));
    let router = mount_with_status::<IcoContribution>(router, &at("ico/contributions"));

    let router = mount_with_status::<StakingPool>(router, &at("staking/pools"));
    let router = mount::<StakingDuration>(router, &at("staking/durations"));
    let router = mount_with_status::<StakingLog>(router, &at("staking/logs"));

    let router = mount_with_status::<P2pOffer>(router, &at("p2p/offers"));
    let router = mount_with_status::<P2pTrade>(router, &at("p2p/trades"));
    let router = mount_with_status::<P2pEscrow>(router, &at("p2p/escrows"));
    let router = mount_with_status::<P2pDispute>(router, &at("p2p/disputes"));
    let router = mount::<P2pReview>(router, &at("p2p/reviews"));

    let router = mount_with_status::<EcosystemMarket>(router, &at("ecosystem/markets"));
    mount_with_status::<FuturesMarket>(router, &at("futures/markets"))
}
