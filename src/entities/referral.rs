//! Referrals between users and the rewards they earn.

use super::require_non_negative;
use crate::error::ApiError;
use crate::store::{Effect, Entity, HasStatus, Store, Table};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Referral status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralStatus {
    /// Awaiting approval.
    Pending,
    /// Approved.
    Active,
    /// Rejected.
    Rejected,
}

/// A user referring another user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    /// Identifier.
    pub id: Uuid,
    /// User who referred.
    pub referrer_id: Uuid,
    /// User who was referred.
    pub referred_id: Uuid,
    /// Status.
    pub status: ReferralStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a referral.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReferral {
    /// User who referred.
    pub referrer_id: Uuid,
    /// User who was referred.
    pub referred_id: Uuid,
    /// Initial status (default PENDING).
    #[serde(default)]
    pub status: Option<ReferralStatus>,
}

/// Payload to update a referral.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReferral {
    /// User who referred.
    pub referrer_id: Option<Uuid>,
    /// User who was referred.
    pub referred_id: Option<Uuid>,
    /// Status.
    pub status: Option<ReferralStatus>,
}

impl Referral {
    fn validate_parties(&self, store: &Store) -> Result<(), ApiError> {
        if self.referrer_id == self.referred_id {
            return Err(ApiError::InvalidRequest(
                "referrer and referred user cannot be the same".to_string(),
            ));
        }
        store.require_user(self.referrer_id)?;
        store.require_user(self.referred_id)?;

        if store
            .referrals
            .any(|r| r.id != self.id && r.referred_id == self.referred_id)
        {
            return Err(ApiError::Conflict(format!(
                "user {} has already been referred",
                self.referred_id
            )));
        }
        Ok(())
    }
}

impl Entity for Referral {
    const NAME: &'static str = "referral";
    type Create = CreateReferral;
    type Update = UpdateReferral;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.referrals
    }

    fn from_create(id: Uuid, req: CreateReferral, now: DateTime<Utc>) -> Result<Self, ApiError> {
        Ok(Self {
            id,
            referrer_id: req.referrer_id,
            referred_id: req.referred_id,
            status: req.status.unwrap_or(ReferralStatus::Pending),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateReferral, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(referrer_id) = req.referrer_id {
            self.referrer_id = referrer_id;
        }
        if let Some(referred_id) = req.referred_id {
            self.referred_id = referred_id;
        }
        if let Some(status) = req.status {
            self.status = status;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        self.validate_parties(store)?;
        Ok(Vec::new())
    }

    fn validate_update(&self, store: &Store) -> Result<(), ApiError> {
        self.validate_parties(store)
    }

    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        let referral_id = self.id;
        let rewards: Vec<Uuid> = store
            .referral_rewards
            .filter(|r| r.referral_id == referral_id)
            .into_iter()
            .map(|r| r.id)
            .collect();
        let cascade: Effect = Box::new(move |store: &Store| {
            for id in &rewards {
                store.referral_rewards.remove(id);
            }
        });
        Ok(vec![cascade])
    }
}

impl HasStatus for Referral {
    type Status = ReferralStatus;

    fn status(&self) -> ReferralStatus {
        self.status
    }

    fn set_status(&mut self, status: ReferralStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// A reward earned through a referral.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralReward {
    /// Identifier.
    pub id: Uuid,
    /// Referral the reward belongs to.
    pub referral_id: Uuid,
    /// Reward amount.
    #[schema(value_type = String)]
    pub reward: Decimal,
    /// Whether the referrer collected the reward.
    pub is_claimed: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a referral reward.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReferralReward {
    /// Referral.
    pub referral_id: Uuid,
    /// Reward amount.
    #[schema(value_type = String)]
    pub reward: Decimal,
    /// Whether already claimed.
    #[serde(default)]
    pub is_claimed: bool,
}

/// Payload to update a referral reward.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReferralReward {
    /// Reward amount.
    #[schema(value_type = Option<String>)]
    pub reward: Option<Decimal>,
    /// Whether claimed.
    pub is_claimed: Option<bool>,
}

impl Entity for ReferralReward {
    const NAME: &'static str = "referral reward";
    type Create = CreateReferralReward;
    type Update = UpdateReferralReward;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.referral_rewards
    }

    fn from_create(
        id: Uuid,
        req: CreateReferralReward,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        require_non_negative(req.reward, "reward")?;
        Ok(Self {
            id,
            referral_id: req.referral_id,
            reward: req.reward,
            is_claimed: req.is_claimed,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(
        &mut self,
        req: UpdateReferralReward,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if let Some(reward) = req.reward {
            require_non_negative(reward, "reward")?;
            self.reward = reward;
        }
        if let Some(is_claimed) = req.is_claimed {
            self.is_claimed = is_claimed;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        if !store.referrals.contains(&self.referral_id) {
            return Err(ApiError::not_found(Referral::NAME, self.referral_id));
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::{CreateUser, User};
    use crate::store::{handle_single_delete, store_record, update_record, update_status};
    use rust_decimal_macros::dec;

    fn user(store: &Store, email: &str) -> User {
        store_record::<User>(
            store,
            CreateUser {
                email: email.to_string(),
                first_name: "R".to_string(),
                last_name: "R".to_string(),
                status: None,
            },
        )
        .unwrap()
    }

    fn referral(store: &Store, referrer: Uuid, referred: Uuid) -> Result<Referral, ApiError> {
        store_record::<Referral>(
            store,
            CreateReferral {
                referrer_id: referrer,
                referred_id: referred,
                status: None,
            },
        )
    }

    #[test]
    fn test_self_referral_rejected() {
        let store = Store::new();
        let alice = user(&store, "alice@example.com");
        let result = referral(&store, alice.id, alice.id);
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert!(store.referrals.is_empty());
    }

    #[test]
    fn test_referral_requires_both_users() {
        let store = Store::new();
        let alice = user(&store, "alice@example.com");
        let result = referral(&store, alice.id, Uuid::new_v4());
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_user_can_only_be_referred_once() {
        let store = Store::new();
        let alice = user(&store, "alice@example.com");
        let bob = user(&store, "bob@example.com");
        let carol = user(&store, "carol@example.com");

        referral(&store, alice.id, carol.id).unwrap();
        let result = referral(&store, bob.id, carol.id);
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[test]
    fn test_update_cannot_make_self_referral() {
        let store = Store::new();
        let alice = user(&store, "alice@example.com");
        let bob = user(&store, "bob@example.com");
        let created = referral(&store, alice.id, bob.id).unwrap();

        let result = update_record::<Referral>(
            &store,
            created.id,
            UpdateReferral {
                referred_id: Some(alice.id),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert_eq!(store.referrals.get(&created.id).unwrap().referred_id, bob.id);
    }

    #[test]
    fn test_bulk_status_update_is_all_or_nothing() {
        let store = Store::new();
        let alice = user(&store, "alice@example.com");
        let bob = user(&store, "bob@example.com");
        let created = referral(&store, alice.id, bob.id).unwrap();

        let result = update_status::<Referral>(
            &store,
            &[created.id, Uuid::new_v4()],
            ReferralStatus::Active,
        );
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(
            store.referrals.get(&created.id).unwrap().status,
            ReferralStatus::Pending
        );

        let updated =
            update_status::<Referral>(&store, &[created.id], ReferralStatus::Active).unwrap();
        assert_eq!(updated[0].status, ReferralStatus::Active);
    }

    #[test]
    fn test_delete_referral_removes_rewards() {
        let store = Store::new();
        let alice = user(&store, "alice@example.com");
        let bob = user(&store, "bob@example.com");
        let created = referral(&store, alice.id, bob.id).unwrap();
        store_record::<ReferralReward>(
            &store,
            CreateReferralReward {
                referral_id: created.id,
                reward: dec!(12.5),
                is_claimed: false,
            },
        )
        .unwrap();

        handle_single_delete::<Referral>(&store, created.id).unwrap();
        assert!(store.referrals.is_empty());
        assert!(store.referral_rewards.is_empty());
    }

    #[test]
    fn test_reward_requires_referral() {
        let store = Store::new();
        let result = store_record::<ReferralReward>(
            &store,
            CreateReferralReward {
                referral_id: Uuid::new_v4(),
                reward: dec!(1),
                is_claimed: false,
            },
        );
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
