//! Platform users.

use crate::entities::referral::Referral;
use crate::error::ApiError;
use crate::store::{Effect, Entity, HasStatus, Store, Table};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// Normal account.
    Active,
    /// Dormant account.
    Inactive,
    /// Temporarily blocked.
    Suspended,
    /// Permanently blocked.
    Banned,
}

/// A platform user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identifier.
    pub id: Uuid,
    /// Unique e-mail address.
    pub email: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Account status.
    pub status: UserStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a user.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    /// E-mail address.
    pub email: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Initial status (default ACTIVE).
    #[serde(default)]
    pub status: Option<UserStatus>,
}

/// Payload to update a user.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    /// E-mail address.
    pub email: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::InvalidRequest(format!(
            "invalid email address: {}",
            email
        ))),
    }
}

impl User {
    fn ensure_unique_email(&self, store: &Store) -> Result<(), ApiError> {
        let email = self.email.to_lowercase();
        if store
            .users
            .any(|u| u.id != self.id && u.email.to_lowercase() == email)
        {
            return Err(ApiError::Conflict(format!(
                "email {} is already registered",
                self.email
            )));
        }
        Ok(())
    }
}

impl Entity for User {
    const NAME: &'static str = "user";
    type Create = CreateUser;
    type Update = UpdateUser;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.users
    }

    fn from_create(id: Uuid, req: CreateUser, now: DateTime<Utc>) -> Result<Self, ApiError> {
        validate_email(&req.email)?;
        Ok(Self {
            id,
            email: req.email.trim().to_string(),
            first_name: req.first_name,
            last_name: req.last_name,
            status: req.status.unwrap_or(UserStatus::Active),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateUser, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(email) = req.email {
            validate_email(&email)?;
            self.email = email.trim().to_string();
        }
        if let Some(first_name) = req.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = req.last_name {
            self.last_name = last_name;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        self.ensure_unique_email(store)?;
        Ok(Vec::new())
    }

    fn validate_update(&self, store: &Store) -> Result<(), ApiError> {
        self.ensure_unique_email(store)
    }

    /// Users holding funds cannot be deleted; empty wallets and referrals go with them.
    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        let user_id = self.id;
        let wallets = store.wallets.filter(|w| w.user_id == user_id);
        if let Some(funded) = wallets
            .iter()
            .find(|w| w.balance != Decimal::ZERO || w.in_order != Decimal::ZERO)
        {
            return Err(ApiError::Conflict(format!(
                "user {} still holds funds in wallet {}",
                user_id, funded.id
            )));
        }

        let wallet_ids: Vec<Uuid> = wallets.into_iter().map(|w| w.id).collect();
        let referrals = store
            .referrals
            .filter(|r: &Referral| r.referrer_id == user_id || r.referred_id == user_id);

        let mut effects = Vec::new();
        for referral in &referrals {
            effects.extend(referral.plan_delete(store)?);
        }
        let referral_ids: Vec<Uuid> = referrals.into_iter().map(|r| r.id).collect();

        effects.push(Box::new(move |store: &Store| {
            for id in &wallet_ids {
                store.wallets.remove(id);
            }
            for id in &referral_ids {
                store.referrals.remove(id);
            }
        }));
        Ok(effects)
    }
}

impl HasStatus for User {
    type Status = UserStatus;

    fn status(&self) -> UserStatus {
        self.status
    }

    fn set_status(&mut self, status: UserStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::referral::{CreateReferral, CreateReferralReward, ReferralReward};
    use crate::store::{handle_single_delete, store_record, update_record};
    use rust_decimal_macros::dec;

    fn create(store: &Store, email: &str) -> Result<User, ApiError> {
        store_record::<User>(
            store,
            CreateUser {
                email: email.to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                status: None,
            },
        )
    }

    #[test]
    fn test_create_user_defaults_to_active() {
        let store = Store::new();
        let user = create(&store, "ada@example.com").unwrap();
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(store.users.len(), 1);
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let store = Store::new();
        create(&store, "ada@example.com").unwrap();
        let result = create(&store, "ADA@example.com");
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[test]
    fn test_invalid_email_rejected() {
        let store = Store::new();
        assert!(matches!(
            create(&store, "not-an-email"),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_update_email_checks_uniqueness() {
        let store = Store::new();
        create(&store, "ada@example.com").unwrap();
        let bob = create(&store, "bob@example.com").unwrap();

        let result = update_record::<User>(
            &store,
            bob.id,
            UpdateUser {
                email: Some("ada@example.com".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[test]
    fn test_delete_user_removes_referrals_and_their_rewards() {
        let store = Store::new();
        let ada = create(&store, "ada@example.com").unwrap();
        let bob = create(&store, "bob@example.com").unwrap();
        let referral = store_record::<Referral>(
            &store,
            CreateReferral {
                referrer_id: ada.id,
                referred_id: bob.id,
                status: None,
            },
        )
        .unwrap();
        store_record::<ReferralReward>(
            &store,
            CreateReferralReward {
                referral_id: referral.id,
                reward: dec!(25),
                is_claimed: false,
            },
        )
        .unwrap();

        handle_single_delete::<User>(&store, ada.id).unwrap();
        assert!(store.referrals.is_empty());
        assert!(store.referral_rewards.is_empty());
        assert!(store.users.contains(&bob.id));
    }

    #[test]
    fn test_delete_missing_user_is_not_found() {
        let store = Store::new();
        let result = handle_single_delete::<User>(&store, Uuid::new_v4());
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
