//! In-process data store and the generic CRUD helpers every admin resource
//! goes through.
//!
//! Each entity lives in its own [`Table`]. Mutations that touch more than one
//! row (refund then delete, reserve then submit, settle fills) take the store
//! guard and split into a fallible planning phase that only reads, followed by
//! infallible [`Effect`]s, so a failure never leaves a half-applied change.

mod crud;
pub mod query;
mod table;

pub use crud::{
    get_filtered, get_record, handle_bulk_delete, handle_bulk_delete_with, handle_single_delete,
    store_record, update_record, update_status,
};
pub use query::{ListQuery, Paginated, Pagination, SortOrder};
pub use table::Table;

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
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// A deferred, infallible mutation produced by a planning phase.
pub type Effect = Box<dyn FnOnce(&Store) + Send>;

/// A persisted record type.
pub trait Entity: Clone + Serialize + Send + Sync + 'static {
    /// Model name used in messages.
    const NAME: &'static str;
    /// Payload accepted by the store endpoint.
    type Create: DeserializeOwned + Send + 'static;
    /// Payload accepted by the update endpoint.
    type Update: DeserializeOwned + Send + 'static;

    /// Record identifier.
    fn id(&self) -> Uuid;

    /// The table holding this entity.
    fn table(store: &Store) -> &Table<Self>;

    /// Builds a new record from a create payload.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if the payload is internally inconsistent.
    fn from_create(id: Uuid, req: Self::Create, now: DateTime<Utc>) -> Result<Self, ApiError>;

    /// Applies an update payload to a copy of the record.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if the result would be inconsistent.
    fn apply_update(&mut self, req: Self::Update, now: DateTime<Utc>) -> Result<(), ApiError>;

    /// Validates references of a new record and plans its side effects.
    ///
    /// May fill fields derived from referenced records.
    ///
    /// # Errors
    /// Returns an error if a referenced record is missing or a constraint fails.
    fn plan_create(&mut self, _store: &Store) -> Result<Vec<Effect>, ApiError> {
        Ok(Vec::new())
    }

    /// Validates an updated record against the store.
    ///
    /// # Errors
    /// Returns an error if a referenced record is missing or a constraint fails.
    fn validate_update(&self, _store: &Store) -> Result<(), ApiError> {
        Ok(())
    }

    /// Plans compensating actions and cascades for deleting this record.
    ///
    /// # Errors
    /// Returns an error if the compensation cannot be carried out.
    fn plan_delete(&self, _store: &Store) -> Result<Vec<Effect>, ApiError> {
        Ok(Vec::new())
    }
}

/// An entity with an enumerated status column.
pub trait HasStatus: Entity {
    /// Status value type.
    type Status: DeserializeOwned + Serialize + Copy + std::fmt::Debug + Send + Sync + 'static;

    /// Current status.
    fn status(&self) -> Self::Status;

    /// Sets the status.
    fn set_status(&mut self, status: Self::Status, now: DateTime<Utc>);
}

/// All tables of the platform.
#[derive(Default)]
pub struct Store {
    guard: Mutex<()>,
    /// Platform users.
    pub users: Table<User>,
    /// User wallets.
    pub wallets: Table<Wallet>,
    /// Wallet transactions.
    pub transactions: Table<Transaction>,
    /// Referrals.
    pub referrals: Table<Referral>,
    /// Referral rewards.
    pub referral_rewards: Table<ReferralReward>,
    /// AI investment plans.
    pub ai_plans: Table<AiInvestmentPlan>,
    /// AI investments.
    pub ai_investments: Table<AiInvestment>,
    /// Forex plans.
    pub forex_plans: Table<ForexPlan>,
    /// Forex durations.
    pub forex_durations: Table<ForexDuration>,
    /// Forex investments.
    pub forex_investments: Table<ForexInvestment>,
    /// Forex signals.
    pub forex_signals: Table<ForexSignal>,
    /// ICO tokens.
    pub ico_tokens: Table<IcoToken>,
    /// ICO phases.
    pub ico_phases: Table<IcoPhase>,
    /// ICO contributions.
    pub ico_contributions: Table<IcoContribution>,
    /// Staking pools.
    pub staking_pools: Table<StakingPool>,
    /// Staking durations.
    pub staking_durations: Table<StakingDuration>,
    /// Staking logs.
    pub staking_logs: Table<StakingLog>,
    /// P2P offers.
    pub p2p_offers: Table<P2pOffer>,
    /// P2P trades.
    pub p2p_trades: Table<P2pTrade>,
    /// P2P escrows.
    pub p2p_escrows: Table<P2pEscrow>,
    /// P2P disputes.
    pub p2p_disputes: Table<P2pDispute>,
    /// P2P reviews.
    pub p2p_reviews: Table<P2pReview>,
    /// Ecosystem (spot) markets.
    pub ecosystem_markets: Table<EcosystemMarket>,
    /// Futures markets.
    pub futures_markets: Table<FuturesMarket>,
}

impl Store {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the store-wide write guard.
    ///
    /// Multi-row mutations hold this guard from planning through applying.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock()
    }

    /// Runs planned effects in order.
    pub fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            effect(self);
        }
    }

    /// Fails with `NotFound` unless the user exists.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown user.
    pub fn require_user(&self, id: Uuid) -> Result<User, ApiError> {
        self.users
            .get(&id)
            .ok_or_else(|| ApiError::not_found(User::NAME, id))
    }
}
