//! ICO tokens, their sale phases and user contributions.

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

/// ICO token status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IcoStatus {
    /// Awaiting review.
    Pending,
    /// Sale open.
    Active,
    /// Sale finished.
    Completed,
    /// Rejected by an admin.
    Rejected,
    /// Cancelled.
    Cancelled,
}

/// A token offered through an ICO.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IcoToken {
    /// Identifier.
    pub id: Uuid,
    /// Token name.
    pub name: String,
    /// Token currency code.
    pub currency: String,
    /// Chain the token lives on.
    pub chain: String,
    /// Currency contributions are paid in.
    pub purchase_currency: String,
    /// Wallet family contributions are paid from.
    pub purchase_wallet_type: WalletType,
    /// Total token supply.
    #[schema(value_type = String)]
    pub total_supply: Decimal,
    /// Status.
    pub status: IcoStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create an ICO token.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIcoToken {
    /// Token name.
    pub name: String,
    /// Token currency code.
    pub currency: String,
    /// Chain.
    pub chain: String,
    /// Purchase currency.
    pub purchase_currency: String,
    /// Purchase wallet family.
    pub purchase_wallet_type: WalletType,
    /// Total supply.
    #[schema(value_type = String)]
    pub total_supply: Decimal,
    /// Initial status (default PENDING).
    #[serde(default)]
    pub status: Option<IcoStatus>,
}

/// Payload to update an ICO token.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIcoToken {
    /// Token name.
    pub name: Option<String>,
    /// Chain.
    pub chain: Option<String>,
    /// Total supply.
    #[schema(value_type = Option<String>)]
    pub total_supply: Option<Decimal>,
}

impl Entity for IcoToken {
    const NAME: &'static str = "ICO token";
    type Create = CreateIcoToken;
    type Update = UpdateIcoToken;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.ico_tokens
    }

    fn from_create(id: Uuid, req: CreateIcoToken, now: DateTime<Utc>) -> Result<Self, ApiError> {
        require_positive(req.total_supply, "total supply")?;
        Ok(Self {
            id,
            name: req.name,
            currency: req.currency.trim().to_uppercase(),
            chain: req.chain,
            purchase_currency: req.purchase_currency.trim().to_uppercase(),
            purchase_wallet_type: req.purchase_wallet_type,
            total_supply: req.total_supply,
            status: req.status.unwrap_or(IcoStatus::Pending),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateIcoToken, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(name) = req.name {
            self.name = name;
        }
        if let Some(chain) = req.chain {
            self.chain = chain;
        }
        if let Some(total_supply) = req.total_supply {
            require_positive(total_supply, "total supply")?;
            self.total_supply = total_supply;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        if store
            .ico_tokens
            .any(|t| t.currency == self.currency && t.chain == self.chain)
        {
            return Err(ApiError::Conflict(format!(
                "ICO token {} on {} already exists",
                self.currency, self.chain
            )));
        }
        Ok(Vec::new())
    }

    /// Phases go with the token; tokens with contributions are kept.
    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        let token_id = self.id;
        let phases: Vec<Uuid> = store
            .ico_phases
            .filter(|p| p.token_id == token_id)
            .into_iter()
            .map(|p| p.id)
            .collect();
        if store
            .ico_contributions
            .any(|c| phases.contains(&c.phase_id))
        {
            return Err(ApiError::Conflict(format!(
                "ICO token {} has contributions",
                token_id
            )));
        }
        let cascade: Effect = Box::new(move |store: &Store| {
            for id in &phases {
                store.ico_phases.remove(id);
            }
        });
        Ok(vec![cascade])
    }
}

impl HasStatus for IcoToken {
    type Status = IcoStatus;

    fn status(&self) -> IcoStatus {
        self.status
    }

    fn set_status(&mut self, status: IcoStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// Sale phase status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    /// Not started.
    Pending,
    /// Accepting contributions.
    Active,
    /// Finished.
    Completed,
}

/// A priced sale window of an ICO token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IcoPhase {
    /// Identifier.
    pub id: Uuid,
    /// Token sold.
    pub token_id: Uuid,
    /// Phase name.
    pub name: String,
    /// Price per token in the purchase currency.
    #[schema(value_type = String)]
    pub price: Decimal,
    /// Start of the phase.
    pub start_date: DateTime<Utc>,
    /// End of the phase.
    pub end_date: DateTime<Utc>,
    /// Smallest purchase in tokens.
    #[schema(value_type = String)]
    pub min_purchase: Decimal,
    /// Largest purchase in tokens.
    #[schema(value_type = String)]
    pub max_purchase: Decimal,
    /// Status.
    pub status: PhaseStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create an ICO phase.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIcoPhase {
    /// Token sold.
    pub token_id: Uuid,
    /// Phase name.
    pub name: String,
    /// Price per token.
    #[schema(value_type = String)]
    pub price: Decimal,
    /// Start.
    pub start_date: DateTime<Utc>,
    /// End.
    pub end_date: DateTime<Utc>,
    /// Smallest purchase.
    #[schema(value_type = String)]
    pub min_purchase: Decimal,
    /// Largest purchase.
    #[schema(value_type = String)]
    pub max_purchase: Decimal,
    /// Initial status (default PENDING).
    #[serde(default)]
    pub status: Option<PhaseStatus>,
}

/// Payload to update an ICO phase.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIcoPhase {
    /// Phase name.
    pub name: Option<String>,
    /// Price per token.
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    /// Start.
    pub start_date: Option<DateTime<Utc>>,
    /// End.
    pub end_date: Option<DateTime<Utc>>,
    /// Smallest purchase.
    #[schema(value_type = Option<String>)]
    pub min_purchase: Option<Decimal>,
    /// Largest purchase.
    #[schema(value_type = Option<String>)]
    pub max_purchase: Option<Decimal>,
}

impl IcoPhase {
    fn validate(&self) -> Result<(), ApiError> {
        require_positive(self.price, "price")?;
        require_range(self.min_purchase, self.max_purchase, "purchase")?;
        if self.end_date <= self.start_date {
            return Err(ApiError::InvalidRequest(
                "phase end date must be after its start date".to_string(),
            ));
        }
        Ok(())
    }
}

impl Entity for IcoPhase {
    const NAME: &'static str = "ICO phase";
    type Create = CreateIcoPhase;
    type Update = UpdateIcoPhase;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.ico_phases
    }

    fn from_create(id: Uuid, req: CreateIcoPhase, now: DateTime<Utc>) -> Result<Self, ApiError> {
        let phase = Self {
            id,
            token_id: req.token_id,
            name: req.name,
            price: req.price,
            start_date: req.start_date,
            end_date: req.end_date,
            min_purchase: req.min_purchase,
            max_purchase: req.max_purchase,
            status: req.status.unwrap_or(PhaseStatus::Pending),
            created_at: now,
            updated_at: now,
        };
        phase.validate()?;
        Ok(phase)
    }

    fn apply_update(&mut self, req: UpdateIcoPhase, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(name) = req.name {
            self.name = name;
        }
        if let Some(price) = req.price {
            self.price = price;
        }
        if let Some(start_date) = req.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = req.end_date {
            self.end_date = end_date;
        }
        if let Some(min_purchase) = req.min_purchase {
            self.min_purchase = min_purchase;
        }
        if let Some(max_purchase) = req.max_purchase {
            self.max_purchase = max_purchase;
        }
        self.validate()?;
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        if !store.ico_tokens.contains(&self.token_id) {
            return Err(ApiError::not_found(IcoToken::NAME, self.token_id));
        }
        Ok(Vec::new())
    }

    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        if store.ico_contributions.any(|c| c.phase_id == self.id) {
            return Err(ApiError::Conflict(format!(
                "ICO phase {} has contributions",
                self.id
            )));
        }
        Ok(Vec::new())
    }
}

impl HasStatus for IcoPhase {
    type Status = PhaseStatus;

    fn status(&self) -> PhaseStatus {
        self.status
    }

    fn set_status(&mut self, status: PhaseStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// Contribution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionStatus {
    /// Paid, tokens not yet delivered.
    Pending,
    /// Tokens delivered.
    Completed,
    /// Rejected by an admin.
    Rejected,
}

/// Tokens a user bought in an ICO phase.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IcoContribution {
    /// Identifier.
    pub id: Uuid,
    /// Contributor.
    pub user_id: Uuid,
    /// Phase bought in.
    pub phase_id: Uuid,
    /// Tokens bought.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Status.
    pub status: ContributionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create an ICO contribution.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIcoContribution {
    /// Contributor.
    pub user_id: Uuid,
    /// Phase.
    pub phase_id: Uuid,
    /// Tokens to buy.
    #[schema(value_type = String)]
    pub amount: Decimal,
}

/// Payload to update an ICO contribution.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIcoContribution {
    /// Tokens bought.
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
}

impl Entity for IcoContribution {
    const NAME: &'static str = "ICO contribution";
    type Create = CreateIcoContribution;
    type Update = UpdateIcoContribution;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.ico_contributions
    }

    fn from_create(
        id: Uuid,
        req: CreateIcoContribution,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        require_positive(req.amount, "amount")?;
        Ok(Self {
            id,
            user_id: req.user_id,
            phase_id: req.phase_id,
            amount: req.amount,
            status: ContributionStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(
        &mut self,
        req: UpdateIcoContribution,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if let Some(amount) = req.amount {
            require_non_negative(amount, "amount")?;
            self.amount = amount;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Charges `amount * price` in the token's purchase currency.
    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        store.require_user(self.user_id)?;
        let phase = store
            .ico_phases
            .get(&self.phase_id)
            .ok_or_else(|| ApiError::not_found(IcoPhase::NAME, self.phase_id))?;
        let token = store
            .ico_tokens
            .get(&phase.token_id)
            .ok_or_else(|| ApiError::not_found(IcoToken::NAME, phase.token_id))?;
        if phase.status != PhaseStatus::Active {
            return Err(ApiError::InvalidRequest(format!(
                "ICO phase {} is not accepting contributions",
                phase.id
            )));
        }
        require_within(self.amount, phase.min_purchase, phase.max_purchase)?;

        ledger::plan_charge(
            store,
            self.user_id,
            token.purchase_wallet_type,
            &token.purchase_currency,
            self.amount * phase.price,
            TransactionType::IcoContribution,
            self.id,
            format!("Contribution of {} {} in {}", self.amount, token.currency, phase.name),
        )
    }

    /// Pending contributions are refunded.
    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        ledger::plan_refund(
            store,
            Self::NAME,
            self.id,
            self.status == ContributionStatus::Pending,
        )
    }
}

impl HasStatus for IcoContribution {
    type Status = ContributionStatus;

    fn status(&self) -> ContributionStatus {
        self.status
    }

    fn set_status(&mut self, status: ContributionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::{CreateUser, User};
    use crate::entities::wallets::{CreateWallet, Wallet};
    use crate::store::{handle_single_delete, store_record};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Sale {
        store: Store,
        wallet: Wallet,
        token: IcoToken,
        phase: IcoPhase,
    }

    fn sale() -> Sale {
        let store = Store::new();
        let user = store_record::<User>(
            &store,
            CreateUser {
                email: "ico@example.com".to_string(),
                first_name: "I".to_string(),
                last_name: "C".to_string(),
                status: None,
            },
        )
        .unwrap();
        let wallet = store_record::<Wallet>(
            &store,
            CreateWallet {
                user_id: user.id,
                wallet_type: WalletType::Spot,
                currency: "USDT".to_string(),
                balance: Some(dec!(1000)),
            },
        )
        .unwrap();
        let token = store_record::<IcoToken>(
            &store,
            CreateIcoToken {
                name: "Nova".to_string(),
                currency: "nova".to_string(),
                chain: "ETH".to_string(),
                purchase_currency: "USDT".to_string(),
                purchase_wallet_type: WalletType::Spot,
                total_supply: dec!(1000000),
                status: Some(IcoStatus::Active),
            },
        )
        .unwrap();
        let now = Utc::now();
        let phase = store_record::<IcoPhase>(
            &store,
            CreateIcoPhase {
                token_id: token.id,
                name: "Seed".to_string(),
                price: dec!(0.5),
                start_date: now - Duration::days(1),
                end_date: now + Duration::days(30),
                min_purchase: dec!(10),
                max_purchase: dec!(1000),
                status: Some(PhaseStatus::Active),
            },
        )
        .unwrap();
        Sale {
            store,
            wallet,
            token,
            phase,
        }
    }

    fn contribute(s: &Sale, amount: Decimal) -> Result<IcoContribution, ApiError> {
        store_record::<IcoContribution>(
            &s.store,
            CreateIcoContribution {
                user_id: s.wallet.user_id,
                phase_id: s.phase.id,
                amount,
            },
        )
    }

    #[test]
    fn test_contribution_charges_price_times_amount() {
        let s = sale();
        contribute(&s, dec!(100)).unwrap();
        assert_eq!(s.store.wallets.get(&s.wallet.id).unwrap().balance, dec!(950));
    }

    #[test]
    fn test_delete_pending_contribution_refunds_cost() {
        let s = sale();
        let contribution = contribute(&s, dec!(400)).unwrap();
        handle_single_delete::<IcoContribution>(&s.store, contribution.id).unwrap();
        assert_eq!(s.store.wallets.get(&s.wallet.id).unwrap().balance, dec!(1000));
    }

    #[test]
    fn test_phase_end_must_follow_start() {
        let s = sale();
        let now = Utc::now();
        let result = store_record::<IcoPhase>(
            &s.store,
            CreateIcoPhase {
                token_id: s.token.id,
                name: "Broken".to_string(),
                price: dec!(1),
                start_date: now,
                end_date: now - Duration::hours(1),
                min_purchase: dec!(1),
                max_purchase: dec!(2),
                status: None,
            },
        );
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_token_with_contributions_cannot_be_deleted() {
        let s = sale();
        contribute(&s, dec!(20)).unwrap();
        let result = handle_single_delete::<IcoToken>(&s.store, s.token.id);
        assert!(matches!(result, Err(ApiError::Conflict(_))));
        assert!(s.store.ico_phases.contains(&s.phase.id));
    }

    #[test]
    fn test_token_delete_cascades_phases() {
        let s = sale();
        handle_single_delete::<IcoToken>(&s.store, s.token.id).unwrap();
        assert!(s.store.ico_phases.is_empty());
    }

    #[test]
    fn test_inactive_phase_rejects_contributions() {
        let s = sale();
        s.store
            .ico_phases
            .update(&s.phase.id, |p| p.status = PhaseStatus::Completed);
        assert!(matches!(
            contribute(&s, dec!(20)),
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
