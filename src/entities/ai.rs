//! AI investment plans and the investments users place in them.

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

/// An AI investment plan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiInvestmentPlan {
    /// Identifier.
    pub id: Uuid,
    /// Internal name.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Image URL.
    pub image: Option<String>,
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

/// Payload to create an AI investment plan.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAiInvestmentPlan {
    /// Internal name.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Image URL.
    #[serde(default)]
    pub image: Option<String>,
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

/// Payload to update an AI investment plan.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAiInvestmentPlan {
    /// Display title.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Image URL.
    pub image: Option<String>,
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

impl Entity for AiInvestmentPlan {
    const NAME: &'static str = "AI investment plan";
    type Create = CreateAiInvestmentPlan;
    type Update = UpdateAiInvestmentPlan;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.ai_plans
    }

    fn from_create(
        id: Uuid,
        req: CreateAiInvestmentPlan,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        require_range(req.min_amount, req.max_amount, "amount")?;
        Ok(Self {
            id,
            name: req.name,
            title: req.title,
            description: req.description,
            image: req.image,
            min_amount: req.min_amount,
            max_amount: req.max_amount,
            profit_percentage: req.profit_percentage,
            trending: req.trending,
            status: true,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(
        &mut self,
        req: UpdateAiInvestmentPlan,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if let Some(title) = req.title {
            self.title = title;
        }
        if req.description.is_some() {
            self.description = req.description;
        }
        if req.image.is_some() {
            self.image = req.image;
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
        if store.ai_investments.any(|i| i.plan_id == self.id) {
            return Err(ApiError::Conflict(format!(
                "AI investment plan {} still has investments",
                self.id
            )));
        }
        Ok(Vec::new())
    }
}

impl HasStatus for AiInvestmentPlan {
    type Status = bool;

    fn status(&self) -> bool {
        self.status
    }

    fn set_status(&mut self, status: bool, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// Funds a user placed in an AI investment plan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiInvestment {
    /// Identifier.
    pub id: Uuid,
    /// Investor.
    pub user_id: Uuid,
    /// Plan.
    pub plan_id: Uuid,
    /// Traded symbol, `CURRENCY/PAIR`; the pair currency is invested.
    pub symbol: String,
    /// Wallet family funds come from.
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
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

/// Payload to create an AI investment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAiInvestment {
    /// Investor.
    pub user_id: Uuid,
    /// Plan.
    pub plan_id: Uuid,
    /// Traded symbol.
    pub symbol: String,
    /// Wallet family.
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    /// Amount to invest.
    #[schema(value_type = String)]
    pub amount: Decimal,
}

/// Payload to update an AI investment.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAiInvestment {
    /// Realized profit.
    #[schema(value_type = Option<String>)]
    pub profit: Option<Decimal>,
    /// Outcome.
    pub result: Option<InvestmentResult>,
}

/// Currency charged for a `CURRENCY/PAIR` symbol.
pub(crate) fn pair_currency(symbol: &str) -> Result<String, ApiError> {
    match symbol.split_once('/') {
        Some((currency, pair)) if !currency.is_empty() && !pair.is_empty() => {
            Ok(pair.trim().to_uppercase())
        }
        _ => Err(ApiError::InvalidRequest(format!(
            "symbol must look like CURRENCY/PAIR: {}",
            symbol
        ))),
    }
}

impl Entity for AiInvestment {
    const NAME: &'static str = "AI investment";
    type Create = CreateAiInvestment;
    type Update = UpdateAiInvestment;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.ai_investments
    }

    fn from_create(
        id: Uuid,
        req: CreateAiInvestment,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        require_positive(req.amount, "amount")?;
        pair_currency(&req.symbol)?;
        Ok(Self {
            id,
            user_id: req.user_id,
            plan_id: req.plan_id,
            symbol: req.symbol.trim().to_uppercase(),
            wallet_type: req.wallet_type,
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
        req: UpdateAiInvestment,
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

    /// Debits the invested amount from the user's wallet.
    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        store.require_user(self.user_id)?;
        let plan = store
            .ai_plans
            .get(&self.plan_id)
            .ok_or_else(|| ApiError::not_found(AiInvestmentPlan::NAME, self.plan_id))?;
        if !plan.status {
            return Err(ApiError::InvalidRequest(format!(
                "AI investment plan {} is disabled",
                plan.id
            )));
        }
        require_within(self.amount, plan.min_amount, plan.max_amount)?;

        ledger::plan_charge(
            store,
            self.user_id,
            self.wallet_type,
            &pair_currency(&self.symbol)?,
            self.amount,
            TransactionType::AiInvestment,
            self.id,
            format!("Investment in AI plan {}", plan.title),
        )
    }

    /// Active investments are refunded before deletion.
    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        ledger::plan_refund(
            store,
            Self::NAME,
            self.id,
            self.status == InvestmentStatus::Active,
        )
    }
}

impl HasStatus for AiInvestment {
    type Status = InvestmentStatus;

    fn status(&self) -> InvestmentStatus {
        self.status
    }

    fn set_status(&mut self, status: InvestmentStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::{CreateUser, User};
    use crate::entities::wallets::{CreateWallet, Wallet};
    use crate::store::{handle_bulk_delete, handle_single_delete, store_record, update_status};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Store,
        user: User,
        wallet: Wallet,
        plan: AiInvestmentPlan,
    }

    fn fixture() -> Fixture {
        let store = Store::new();
        let user = store_record::<User>(
            &store,
            CreateUser {
                email: "investor@example.com".to_string(),
                first_name: "I".to_string(),
                last_name: "N".to_string(),
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
        let plan = store_record::<AiInvestmentPlan>(
            &store,
            CreateAiInvestmentPlan {
                name: "alpha".to_string(),
                title: "Alpha".to_string(),
                description: None,
                image: None,
                min_amount: dec!(10),
                max_amount: dec!(500),
                profit_percentage: dec!(12),
                trending: false,
            },
        )
        .unwrap();
        Fixture {
            store,
            user,
            wallet,
            plan,
        }
    }

    fn invest(f: &Fixture, amount: Decimal) -> Result<AiInvestment, ApiError> {
        store_record::<AiInvestment>(
            &f.store,
            CreateAiInvestment {
                user_id: f.user.id,
                plan_id: f.plan.id,
                symbol: "BTC/USDT".to_string(),
                wallet_type: WalletType::Spot,
                amount,
            },
        )
    }

    fn balance(f: &Fixture) -> Decimal {
        f.store.wallets.get(&f.wallet.id).unwrap().balance
    }

    #[test]
    fn test_investment_debits_wallet() {
        let f = fixture();
        let investment = invest(&f, dec!(100)).unwrap();
        assert_eq!(investment.status, InvestmentStatus::Active);
        assert_eq!(balance(&f), dec!(900));
        assert_eq!(f.store.transactions.len(), 1);
    }

    #[test]
    fn test_investment_outside_plan_limits_rejected() {
        let f = fixture();
        assert!(matches!(
            invest(&f, dec!(5)),
            Err(ApiError::InvalidRequest(_))
        ));
        assert_eq!(balance(&f), dec!(1000));
    }

    #[test]
    fn test_delete_active_investment_refunds() {
        let f = fixture();
        let investment = invest(&f, dec!(250)).unwrap();

        handle_single_delete::<AiInvestment>(&f.store, investment.id).unwrap();
        assert_eq!(balance(&f), dec!(1000));
        assert!(f.store.ai_investments.is_empty());
    }

    #[test]
    fn test_delete_completed_investment_does_not_refund() {
        let f = fixture();
        let investment = invest(&f, dec!(250)).unwrap();
        update_status::<AiInvestment>(&f.store, &[investment.id], InvestmentStatus::Completed)
            .unwrap();

        handle_single_delete::<AiInvestment>(&f.store, investment.id).unwrap();
        assert_eq!(balance(&f), dec!(750));
        assert!(f.store.transactions.is_empty());
    }

    #[test]
    fn test_bulk_delete_is_atomic_when_refund_fails() {
        let f = fixture();
        let first = invest(&f, dec!(100)).unwrap();
        let second = invest(&f, dec!(100)).unwrap();

        // Losing the originating transaction makes the second refund impossible.
        let origin = f
            .store
            .transactions
            .find(|t| t.reference_id == Some(second.id))
            .unwrap();
        f.store.transactions.remove(&origin.id);

        let result = handle_bulk_delete::<AiInvestment>(&f.store, &[first.id, second.id]);
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(f.store.ai_investments.len(), 2);
        assert_eq!(balance(&f), dec!(800));
    }

    #[test]
    fn test_plan_with_investments_cannot_be_deleted() {
        let f = fixture();
        invest(&f, dec!(50)).unwrap();
        let result = handle_single_delete::<AiInvestmentPlan>(&f.store, f.plan.id);
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[test]
    fn test_pair_currency() {
        assert_eq!(pair_currency("btc/usdt").unwrap(), "USDT");
        assert!(pair_currency("BTCUSDT").is_err());
    }
}
