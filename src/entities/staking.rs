//! Staking pools, their lock durations and user stakes.

use super::{WalletType, require_non_negative, require_positive, require_range, require_within};
use crate::entities::wallets::TransactionType;
use crate::error::ApiError;
use crate::ledger;
use crate::store::{Effect, Entity, HasStatus, Store, Table};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A pool users can stake a currency in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StakingPool {
    /// Identifier.
    pub id: Uuid,
    /// Pool name.
    pub name: String,
    /// Staked currency.
    pub currency: String,
    /// Chain.
    pub chain: String,
    /// Wallet family stakes come from.
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    /// Smallest stake.
    #[schema(value_type = String)]
    pub min_stake: Decimal,
    /// Largest stake.
    #[schema(value_type = String)]
    pub max_stake: Decimal,
    /// Whether the pool accepts stakes.
    pub status: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a staking pool.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStakingPool {
    /// Pool name.
    pub name: String,
    /// Staked currency.
    pub currency: String,
    /// Chain.
    pub chain: String,
    /// Wallet family.
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    /// Smallest stake.
    #[schema(value_type = String)]
    pub min_stake: Decimal,
    /// Largest stake.
    #[schema(value_type = String)]
    pub max_stake: Decimal,
}

/// Payload to update a staking pool.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStakingPool {
    /// Pool name.
    pub name: Option<String>,
    /// Smallest stake.
    #[schema(value_type = Option<String>)]
    pub min_stake: Option<Decimal>,
    /// Largest stake.
    #[schema(value_type = Option<String>)]
    pub max_stake: Option<Decimal>,
}

impl Entity for StakingPool {
    const NAME: &'static str = "staking pool";
    type Create = CreateStakingPool;
    type Update = UpdateStakingPool;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.staking_pools
    }

    fn from_create(
        id: Uuid,
        req: CreateStakingPool,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        require_range(req.min_stake, req.max_stake, "stake")?;
        Ok(Self {
            id,
            name: req.name,
            currency: req.currency.trim().to_uppercase(),
            chain: req.chain,
            wallet_type: req.wallet_type,
            min_stake: req.min_stake,
            max_stake: req.max_stake,
            status: true,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(
        &mut self,
        req: UpdateStakingPool,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if let Some(name) = req.name {
            self.name = name;
        }
        if let Some(min_stake) = req.min_stake {
            self.min_stake = min_stake;
        }
        if let Some(max_stake) = req.max_stake {
            self.max_stake = max_stake;
        }
        require_range(self.min_stake, self.max_stake, "stake")?;
        self.updated_at = now;
        Ok(())
    }

    /// Durations go with the pool; pools with stakes are kept.
    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        let pool_id = self.id;
        if store.staking_logs.any(|l| l.pool_id == pool_id) {
            return Err(ApiError::Conflict(format!(
                "staking pool {} has stakes",
                pool_id
            )));
        }
        let durations: Vec<Uuid> = store
            .staking_durations
            .filter(|d| d.pool_id == pool_id)
            .into_iter()
            .map(|d| d.id)
            .collect();
        let cascade: Effect = Box::new(move |store: &Store| {
            for id in &durations {
                store.staking_durations.remove(id);
            }
        });
        Ok(vec![cascade])
    }
}

impl HasStatus for StakingPool {
    type Status = bool;

    fn status(&self) -> bool {
        self.status
    }

    fn set_status(&mut self, status: bool, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// A lock period offered by a pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StakingDuration {
    /// Identifier.
    pub id: Uuid,
    /// Pool.
    pub pool_id: Uuid,
    /// Lock period in days.
    pub duration: u32,
    /// Interest rate in percent over the period.
    #[schema(value_type = String)]
    pub interest_rate: Decimal,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a staking duration.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStakingDuration {
    /// Pool.
    pub pool_id: Uuid,
    /// Days.
    pub duration: u32,
    /// Interest rate.
    #[schema(value_type = String)]
    pub interest_rate: Decimal,
}

/// Payload to update a staking duration.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStakingDuration {
    /// Days.
    pub duration: Option<u32>,
    /// Interest rate.
    #[schema(value_type = Option<String>)]
    pub interest_rate: Option<Decimal>,
}

impl Entity for StakingDuration {
    const NAME: &'static str = "staking duration";
    type Create = CreateStakingDuration;
    type Update = UpdateStakingDuration;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.staking_durations
    }

    fn from_create(
        id: Uuid,
        req: CreateStakingDuration,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        if req.duration == 0 {
            return Err(ApiError::InvalidRequest(
                "duration must be positive".to_string(),
            ));
        }
        require_non_negative(req.interest_rate, "interest rate")?;
        Ok(Self {
            id,
            pool_id: req.pool_id,
            duration: req.duration,
            interest_rate: req.interest_rate,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(
        &mut self,
        req: UpdateStakingDuration,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if let Some(duration) = req.duration {
            if duration == 0 {
                return Err(ApiError::InvalidRequest(
                    "duration must be positive".to_string(),
                ));
            }
            self.duration = duration;
        }
        if let Some(rate) = req.interest_rate {
            require_non_negative(rate, "interest rate")?;
            self.interest_rate = rate;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        if !store.staking_pools.contains(&self.pool_id) {
            return Err(ApiError::not_found(StakingPool::NAME, self.pool_id));
        }
        Ok(Vec::new())
    }

    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        if store.staking_logs.any(|l| l.duration_id == self.id) {
            return Err(ApiError::Conflict(format!(
                "staking duration {} is used by stakes",
                self.id
            )));
        }
        Ok(Vec::new())
    }
}

/// Stake status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StakingStatus {
    /// Funds locked.
    Active,
    /// Lock period over, funds unlocked.
    Released,
    /// Funds and interest collected.
    Collected,
}

/// Funds a user locked in a pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StakingLog {
    /// Identifier.
    pub id: Uuid,
    /// Staker.
    pub user_id: Uuid,
    /// Pool.
    pub pool_id: Uuid,
    /// Lock period.
    pub duration_id: Uuid,
    /// Staked amount.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Status.
    pub status: StakingStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a stake.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStakingLog {
    /// Staker.
    pub user_id: Uuid,
    /// Pool.
    pub pool_id: Uuid,
    /// Lock period.
    pub duration_id: Uuid,
    /// Amount.
    #[schema(value_type = String)]
    pub amount: Decimal,
}

/// Payload to update a stake.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStakingLog {
    /// Lock period.
    pub duration_id: Option<Uuid>,
}

impl StakingLog {
    fn duration_of_pool(&self, store: &Store) -> Result<(), ApiError> {
        let duration = store
            .staking_durations
            .get(&self.duration_id)
            .ok_or_else(|| ApiError::not_found(StakingDuration::NAME, self.duration_id))?;
        if duration.pool_id != self.pool_id {
            return Err(ApiError::InvalidRequest(format!(
                "staking duration {} does not belong to pool {}",
                self.duration_id, self.pool_id
            )));
        }
        Ok(())
    }
}

impl Entity for StakingLog {
    const NAME: &'static str = "staking log";
    type Create = CreateStakingLog;
    type Update = UpdateStakingLog;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.staking_logs
    }

    fn from_create(id: Uuid, req: CreateStakingLog, now: DateTime<Utc>) -> Result<Self, ApiError> {
        require_positive(req.amount, "amount")?;
        Ok(Self {
            id,
            user_id: req.user_id,
            pool_id: req.pool_id,
            duration_id: req.duration_id,
            amount: req.amount,
            status: StakingStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateStakingLog, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(duration_id) = req.duration_id {
            self.duration_id = duration_id;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        store.require_user(self.user_id)?;
        let pool = store
            .staking_pools
            .get(&self.pool_id)
            .ok_or_else(|| ApiError::not_found(StakingPool::NAME, self.pool_id))?;
        if !pool.status {
            return Err(ApiError::InvalidRequest(format!(
                "staking pool {} is disabled",
                pool.id
            )));
        }
        self.duration_of_pool(store)?;
        require_within(self.amount, pool.min_stake, pool.max_stake)?;

        ledger::plan_charge(
            store,
            self.user_id,
            pool.wallet_type,
            &pool.currency,
            self.amount,
            TransactionType::Staking,
            self.id,
            format!("Stake in {}", pool.name),
        )
    }

    fn validate_update(&self, store: &Store) -> Result<(), ApiError> {
        self.duration_of_pool(store)
    }

    /// Active stakes are returned to the wallet.
    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        ledger::plan_refund(
            store,
            Self::NAME,
            self.id,
            self.status == StakingStatus::Active,
        )
    }
}

impl HasStatus for StakingLog {
    type Status = StakingStatus;

    fn status(&self) -> StakingStatus {
        self.status
    }

    fn set_status(&mut self, status: StakingStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::{CreateUser, User};
    use crate::entities::wallets::{CreateWallet, Wallet};
    use crate::store::{handle_single_delete, store_record, update_status};
    use rust_decimal_macros::dec;

    fn pool_with_wallet() -> (Store, Wallet, StakingPool, StakingDuration) {
        let store = Store::new();
        let user = store_record::<User>(
            &store,
            CreateUser {
                email: "staker@example.com".to_string(),
                first_name: "S".to_string(),
                last_name: "T".to_string(),
                status: None,
            },
        )
        .unwrap();
        let wallet = store_record::<Wallet>(
            &store,
            CreateWallet {
                user_id: user.id,
                wallet_type: WalletType::Eco,
                currency: "ETH".to_string(),
                balance: Some(dec!(10)),
            },
        )
        .unwrap();
        let pool = store_record::<StakingPool>(
            &store,
            CreateStakingPool {
                name: "ETH Flex".to_string(),
                currency: "eth".to_string(),
                chain: "ETH".to_string(),
                wallet_type: WalletType::Eco,
                min_stake: dec!(0.1),
                max_stake: dec!(5),
            },
        )
        .unwrap();
        let duration = store_record::<StakingDuration>(
            &store,
            CreateStakingDuration {
                pool_id: pool.id,
                duration: 30,
                interest_rate: dec!(4.5),
            },
        )
        .unwrap();
        (store, wallet, pool, duration)
    }

    fn stake(
        store: &Store,
        wallet: &Wallet,
        pool: &StakingPool,
        duration_id: Uuid,
        amount: Decimal,
    ) -> Result<StakingLog, ApiError> {
        store_record::<StakingLog>(
            store,
            CreateStakingLog {
                user_id: wallet.user_id,
                pool_id: pool.id,
                duration_id,
                amount,
            },
        )
    }

    #[test]
    fn test_stake_and_refund() {
        let (store, wallet, pool, duration) = pool_with_wallet();
        let log = stake(&store, &wallet, &pool, duration.id, dec!(2)).unwrap();
        assert_eq!(store.wallets.get(&wallet.id).unwrap().balance, dec!(8));

        handle_single_delete::<StakingLog>(&store, log.id).unwrap();
        assert_eq!(store.wallets.get(&wallet.id).unwrap().balance, dec!(10));
    }

    #[test]
    fn test_collected_stake_is_not_refunded() {
        let (store, wallet, pool, duration) = pool_with_wallet();
        let log = stake(&store, &wallet, &pool, duration.id, dec!(2)).unwrap();
        update_status::<StakingLog>(&store, &[log.id], StakingStatus::Collected).unwrap();

        handle_single_delete::<StakingLog>(&store, log.id).unwrap();
        assert_eq!(store.wallets.get(&wallet.id).unwrap().balance, dec!(8));
    }

    #[test]
    fn test_duration_from_other_pool_rejected() {
        let (store, wallet, pool, _) = pool_with_wallet();
        let other = store_record::<StakingPool>(
            &store,
            CreateStakingPool {
                name: "Other".to_string(),
                currency: "ETH".to_string(),
                chain: "ETH".to_string(),
                wallet_type: WalletType::Eco,
                min_stake: dec!(1),
                max_stake: dec!(2),
            },
        )
        .unwrap();
        let foreign = store_record::<StakingDuration>(
            &store,
            CreateStakingDuration {
                pool_id: other.id,
                duration: 7,
                interest_rate: dec!(1),
            },
        )
        .unwrap();

        let result = stake(&store, &wallet, &pool, foreign.id, dec!(1));
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_pool_delete_cascades_durations() {
        let (store, _, pool, _) = pool_with_wallet();
        handle_single_delete::<StakingPool>(&store, pool.id).unwrap();
        assert!(store.staking_durations.is_empty());
    }

    #[test]
    fn test_pool_with_stakes_cannot_be_deleted() {
        let (store, wallet, pool, duration) = pool_with_wallet();
        stake(&store, &wallet, &pool, duration.id, dec!(1)).unwrap();
        let result = handle_single_delete::<StakingPool>(&store, pool.id);
        assert!(matches!(result, Err(ApiError::Conflict(_))));
        assert_eq!(store.staking_durations.len(), 1);
    }
}
