//! Forex plans, durations, investments and trading signals.

use super::{
    InvestmentResult, InvestmentStatus, WalletType, require_positive, require_range,
    require_within,
};
use crate::entities::wallets::TransactionType;
use crate::error::ApiError;
use crate::ledger;
use crate::store::{Effect, Entity, HasStatus, Store, Table};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A forex investment plan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForexPlan {
    /// Identifier.
    pub id: Uuid,
    /// Internal name.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Currency invested.
    pub currency: String,
    /// Wallet family funds come from.
    pub wallet_type: WalletType,
    /// Smallest accepted investment.
    #[schema(value_type = String)]
    pub min_amount: Decimal,
    /// Largest accepted investment.
    #[schema(value_type = String)]
    pub max_amount: Decimal,
    /// Expected profit in percent.
    #[schema(value_type = String)]
    pub profit_percentage: Decimal,
    /// Whether the plan is promoted.
    pub trending: bool,
    /// Whether the plan accepts investments.
    pub status: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a forex plan.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateForexPlan {
    /// Internal name.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Currency invested.
    pub currency: String,
    /// Wallet family.
    pub wallet_type: WalletType,
    /// Smallest accepted investment.
    #[schema(value_type = String)]
    pub min_amount: Decimal,
    /// Largest accepted investment.
    #[schema(value_type = String)]
    pub max_amount: Decimal,
    /// Expected profit in percent.
    #[schema(value_type = String)]
    pub profit_percentage: Decimal,
    /// Whether promoted.
    #[serde(default)]
    pub trending: bool,
}

/// Payload to update a forex plan.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateForexPlan {
    /// Display title.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Smallest accepted investment.
    #[schema(value_type = Option<String>)]
    pub min_amount: Option<Decimal>,
    /// Largest accepted investment.
    #[schema(value_type = Option<String>)]
    pub max_amount: Option<Decimal>,
    /// Expected profit in percent.
    #[schema(value_type = Option<String>)]
    pub profit_percentage: Option<Decimal>,
    /// Whether promoted.
    pub trending: Option<bool>,
}

impl Entity for ForexPlan {
    const NAME: &'static str = "forex plan";
    type Create = CreateForexPlan;
    type Update = UpdateForexPlan;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.forex_plans
    }

    fn from_create(id: Uuid, req: CreateForexPlan, now: DateTime<Utc>) -> Result<Self, ApiError> {
        require_range(req.min_amount, req.max_amount, "amount")?;
        let currency = req.currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(ApiError::InvalidRequest(
                "currency cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            id,
            name: req.name,
            title: req.title,
            description: req.description,
            currency,
            wallet_type: req.wallet_type,
            min_amount: req.min_amount,
            max_amount: req.max_amount,
            profit_percentage: req.profit_percentage,
            trending: req.trending,
            status: true,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateForexPlan, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(title) = req.title {
            self.title = title;
        }
        if req.description.is_some() {
            self.description = req.description;
        }
        if let Some(min_amount) = req.min_amount {
            self.min_amount = min_amount;
        }
        if let Some(max_amount) = req.max_amount {
            self.max_amount = max_amount;
        }
        if let Some(profit) = req.profit_percentage {
            self.profit_percentage = profit;
        }
        if let Some(trending) = req.trending {
            self.trending = trending;
        }
        require_range(self.min_amount, self.max_amount, "amount")?;
        self.updated_at = now;
        Ok(())
    }

    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        if store.forex_investments.any(|i| i.plan_id == self.id) {
            return Err(ApiError::Conflict(format!(
                "forex plan {} still has investments",
                self.id
            )));
        }
        Ok(Vec::new())
    }
}

impl HasStatus for ForexPlan {
    type Status = bool;

    fn status(&self) -> bool {
        self.status
    }

    fn set_status(&mut self, status: bool, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// Unit of a forex duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Timeframe {
    /// Hours.
    Hour,
    /// Days.
    Day,
    /// Weeks.
    Week,
    /// Months.
    Month,
}

/// How long a forex investment runs.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForexDuration {
    /// Identifier.
    pub id: Uuid,
    /// Number of `timeframe` units.
    pub duration: u32,
    /// Unit.
    pub timeframe: Timeframe,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create or replace a forex duration.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateForexDuration {
    /// Number of units.
    pub duration: u32,
    /// Unit.
    pub timeframe: Timeframe,
}

/// Payload to update a forex duration.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateForexDuration {
    /// Number of units.
    pub duration: Option<u32>,
    /// Unit.
    pub timeframe: Option<Timeframe>,
}

impl Entity for ForexDuration {
    const NAME: &'static str = "forex duration";
    type Create = CreateForexDuration;
    type Update = UpdateForexDuration;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.forex_durations
    }

    fn from_create(
        id: Uuid,
        req: CreateForexDuration,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        if req.duration == 0 {
            return Err(ApiError::InvalidRequest(
                "duration must be positive".to_string(),
            ));
        }
        Ok(Self {
            id,
            duration: req.duration,
            timeframe: req.timeframe,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(
        &mut self,
        req: UpdateForexDuration,
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
        if let Some(timeframe) = req.timeframe {
            self.timeframe = timeframe;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        if store.forex_investments.any(|i| i.duration_id == self.id) {
            return Err(ApiError::Conflict(format!(
                "forex duration {} is used by investments",
                self.id
            )));
        }
        Ok(Vec::new())
    }
}

/// Funds a user placed in a forex plan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForexInvestment {
    /// Identifier.
    pub id: Uuid,
    /// Investor.
    pub user_id: Uuid,
    /// Plan.
    pub plan_id: Uuid,
    /// Duration.
    pub duration_id: Uuid,
    /// Invested amount.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Realized profit.
    #[schema(value_type = Option<String>)]
    pub profit: Option<Decimal>,
    /// Outcome once settled.
    pub result: Option<InvestmentResult>,
    /// Status.
    pub status: InvestmentStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a forex investment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateForexInvestment {
    /// Investor.
    pub user_id: Uuid,
    /// Plan.
    pub plan_id: Uuid,
    /// Duration.
    pub duration_id: Uuid,
    /// Amount to invest.
    #[schema(value_type = String)]
    pub amount: Decimal,
}

/// Payload to update a forex investment.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateForexInvestment {
    /// Realized profit.
    #[schema(value_type = Option<String>)]
    pub profit: Option<Decimal>,
    /// Outcome.
    pub result: Option<InvestmentResult>,
}

impl Entity for ForexInvestment {
    const NAME: &'static str = "forex investment";
    type Create = CreateForexInvestment;
    type Update = UpdateForexInvestment;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.forex_investments
    }

    fn from_create(
        id: Uuid,
        req: CreateForexInvestment,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        require_positive(req.amount, "amount")?;
        Ok(Self {
            id,
            user_id: req.user_id,
            plan_id: req.plan_id,
            duration_id: req.duration_id,
            amount: req.amount,
            profit: None,
            result: None,
            status: InvestmentStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(
        &mut self,
        req: UpdateForexInvestment,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if req.profit.is_some() {
            self.profit = req.profit;
        }
        if req.result.is_some() {
            self.result = req.result;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        store.require_user(self.user_id)?;
        let plan = store
            .forex_plans
            .get(&self.plan_id)
            .ok_or_else(|| ApiError::not_found(ForexPlan::NAME, self.plan_id))?;
        if !store.forex_durations.contains(&self.duration_id) {
            return Err(ApiError::not_found(ForexDuration::NAME, self.duration_id));
        }
        if !plan.status {
            return Err(ApiError::InvalidRequest(format!(
                "forex plan {} is disabled",
                plan.id
            )));
        }
        require_within(self.amount, plan.min_amount, plan.max_amount)?;

        ledger::plan_charge(
            store,
            self.user_id,
            plan.wallet_type,
            &plan.currency,
            self.amount,
            TransactionType::ForexInvestment,
            self.id,
            format!("Investment in forex plan {}", plan.title),
        )
    }

    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        ledger::plan_refund(
            store,
            Self::NAME,
            self.id,
            self.status == InvestmentStatus::Active,
        )
    }
}

impl HasStatus for ForexInvestment {
    type Status = InvestmentStatus;

    fn status(&self) -> InvestmentStatus {
        self.status
    }

    fn set_status(&mut self, status: InvestmentStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// A trading signal published to forex investors.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForexSignal {
    /// Identifier.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Image URL.
    pub image: String,
    /// Whether the signal is published.
    pub status: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a forex signal.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateForexSignal {
    /// Title.
    pub title: String,
    /// Image URL.
    pub image: String,
}

/// Payload to update a forex signal.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateForexSignal {
    /// Title.
    pub title: Option<String>,
    /// Image URL.
    pub image: Option<String>,
}

impl Entity for ForexSignal {
    const NAME: &'static str = "forex signal";
    type Create = CreateForexSignal;
    type Update = UpdateForexSignal;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.forex_signals
    }

    fn from_create(
        id: Uuid,
        req: CreateForexSignal,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        if req.title.trim().is_empty() {
            return Err(ApiError::InvalidRequest("title cannot be empty".to_string()));
        }
        Ok(Self {
            id,
            title: req.title,
            image: req.image,
            status: true,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(
        &mut self,
        req: UpdateForexSignal,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if let Some(title) = req.title {
            self.title = title;
        }
        if let Some(image) = req.image {
            self.image = image;
        }
        self.updated_at = now;
        Ok(())
    }
}

impl HasStatus for ForexSignal {
    type Status = bool;

    fn status(&self) -> bool {
        self.status
    }

    fn set_status(&mut self, status: bool, now: DateTime<Utc>) {
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
    use rust_decimal_macros::dec;

    fn setup() -> (Store, Wallet, ForexPlan, ForexDuration) {
        let store = Store::new();
        let user = store_record::<User>(
            &store,
            CreateUser {
                email: "fx@example.com".to_string(),
                first_name: "F".to_string(),
                last_name: "X".to_string(),
                status: None,
            },
        )
        .unwrap();
        let wallet = store_record::<Wallet>(
            &store,
            CreateWallet {
                user_id: user.id,
                wallet_type: WalletType::Fiat,
                currency: "USD".to_string(),
                balance: Some(dec!(500)),
            },
        )
        .unwrap();
        let plan = store_record::<ForexPlan>(
            &store,
            CreateForexPlan {
                name: "starter".to_string(),
                title: "Starter".to_string(),
                description: None,
                currency: "usd".to_string(),
                wallet_type: WalletType::Fiat,
                min_amount: dec!(50),
                max_amount: dec!(400),
                profit_percentage: dec!(5),
                trending: true,
            },
        )
        .unwrap();
        let duration = store_record::<ForexDuration>(
            &store,
            CreateForexDuration {
                duration: 7,
                timeframe: Timeframe::Day,
            },
        )
        .unwrap();
        (store, wallet, plan, duration)
    }

    #[test]
    fn test_forex_investment_round_trip_through_wallet() {
        let (store, wallet, plan, duration) = setup();
        let investment = store_record::<ForexInvestment>(
            &store,
            CreateForexInvestment {
                user_id: wallet.user_id,
                plan_id: plan.id,
                duration_id: duration.id,
                amount: dec!(200),
            },
        )
        .unwrap();
        assert_eq!(store.wallets.get(&wallet.id).unwrap().balance, dec!(300));

        handle_single_delete::<ForexInvestment>(&store, investment.id).unwrap();
        assert_eq!(store.wallets.get(&wallet.id).unwrap().balance, dec!(500));
    }

    #[test]
    fn test_unknown_duration_is_not_found() {
        let (store, wallet, plan, _) = setup();
        let result = store_record::<ForexInvestment>(
            &store,
            CreateForexInvestment {
                user_id: wallet.user_id,
                plan_id: plan.id,
                duration_id: Uuid::new_v4(),
                amount: dec!(100),
            },
        );
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_insufficient_funds() {
        let (store, wallet, plan, duration) = setup();
        store.wallets.update(&wallet.id, |w| w.balance = dec!(60));
        let result = store_record::<ForexInvestment>(
            &store,
            CreateForexInvestment {
                user_id: wallet.user_id,
                plan_id: plan.id,
                duration_id: duration.id,
                amount: dec!(100),
            },
        );
        assert!(matches!(result, Err(ApiError::InsufficientFunds(_))));
        assert!(store.forex_investments.is_empty());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let store = Store::new();
        let result = store_record::<ForexDuration>(
            &store,
            CreateForexDuration {
                duration: 0,
                timeframe: Timeframe::Hour,
            },
        );
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }
}
