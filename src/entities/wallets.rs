//! Wallets and their transaction history.

use super::{WalletType, require_non_negative};
use crate::error::ApiError;
use crate::store::{Effect, Entity, HasStatus, Store, Table};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A balance of one currency held by a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Identifier.
    pub id: Uuid,
    /// Owner.
    pub user_id: Uuid,
    /// Wallet family.
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    /// Currency code.
    pub currency: String,
    /// Available balance.
    #[schema(value_type = String)]
    pub balance: Decimal,
    /// Balance reserved by open orders.
    #[schema(value_type = String)]
    pub in_order: Decimal,
    /// Whether the wallet is enabled.
    pub status: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a wallet.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWallet {
    /// Owner.
    pub user_id: Uuid,
    /// Wallet family.
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    /// Currency code.
    pub currency: String,
    /// Opening balance.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub balance: Option<Decimal>,
}

/// Payload to update a wallet.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWallet {
    /// New available balance.
    #[schema(value_type = Option<String>)]
    pub balance: Option<Decimal>,
}

impl Entity for Wallet {
    const NAME: &'static str = "wallet";
    type Create = CreateWallet;
    type Update = UpdateWallet;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.wallets
    }

    fn from_create(id: Uuid, req: CreateWallet, now: DateTime<Utc>) -> Result<Self, ApiError> {
        let currency = req.currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(ApiError::InvalidRequest(
                "currency cannot be empty".to_string(),
            ));
        }
        let balance = req.balance.unwrap_or(Decimal::ZERO);
        require_non_negative(balance, "balance")?;

        Ok(Self {
            id,
            user_id: req.user_id,
            wallet_type: req.wallet_type,
            currency,
            balance,
            in_order: Decimal::ZERO,
            status: true,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateWallet, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(balance) = req.balance {
            require_non_negative(balance, "balance")?;
            self.balance = balance;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        store.require_user(self.user_id)?;
        if crate::ledger::find_wallet(store, self.user_id, self.wallet_type, &self.currency)
            .is_some()
        {
            return Err(ApiError::Conflict(format!(
                "user {} already has a {} {} wallet",
                self.user_id, self.wallet_type, self.currency
            )));
        }
        Ok(Vec::new())
    }

    fn plan_delete(&self, _store: &Store) -> Result<Vec<Effect>, ApiError> {
        if self.in_order > Decimal::ZERO {
            return Err(ApiError::Conflict(format!(
                "wallet {} has {} reserved by open orders",
                self.id, self.in_order
            )));
        }
        Ok(Vec::new())
    }
}

impl HasStatus for Wallet {
    type Status = bool;

    fn status(&self) -> bool {
        self.status
    }

    fn set_status(&mut self, status: bool, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// Kind of wallet movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// External deposit.
    Deposit,
    /// External withdrawal.
    Withdraw,
    /// Funds moved into an AI investment.
    AiInvestment,
    /// Funds moved into a forex investment.
    ForexInvestment,
    /// Payment for an ICO contribution.
    IcoContribution,
    /// Funds locked in a staking pool.
    Staking,
    /// Funds moved into a P2P offer.
    P2pOfferTransfer,
    /// Compensation for a deleted record.
    Refund,
    /// Trade settlement on an exchange market.
    Trade,
    /// Fee charged by the platform.
    Fee,
}

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Awaiting processing.
    Pending,
    /// Settled.
    Completed,
    /// Failed.
    Failed,
    /// Cancelled.
    Cancelled,
    /// Refunded to the wallet.
    Refunded,
}

/// A wallet movement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Identifier.
    pub id: Uuid,
    /// Owner.
    pub user_id: Uuid,
    /// Wallet the movement applies to.
    pub wallet_id: Uuid,
    /// Movement kind.
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Amount moved.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Fee charged.
    #[schema(value_type = String)]
    pub fee: Decimal,
    /// Status.
    pub status: TransactionStatus,
    /// Record this movement belongs to (investment, contribution, offer...).
    pub reference_id: Option<Uuid>,
    /// Human readable description.
    pub description: Option<String>,
    /// Free-form metadata.
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a transaction.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransaction {
    /// Owner.
    pub user_id: Uuid,
    /// Wallet.
    pub wallet_id: Uuid,
    /// Movement kind.
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Amount.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Fee.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub fee: Option<Decimal>,
    /// Status (default PENDING).
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    /// Referenced record.
    #[serde(default)]
    pub reference_id: Option<Uuid>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Metadata.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

/// Payload to update a transaction.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransaction {
    /// Fee.
    #[schema(value_type = Option<String>)]
    pub fee: Option<Decimal>,
    /// Description.
    pub description: Option<String>,
    /// Metadata.
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

impl Transaction {
    /// Builds a completed transaction generated by the platform itself.
    #[must_use]
    pub fn completed(
        wallet: &Wallet,
        tx_type: TransactionType,
        amount: Decimal,
        reference_id: Option<Uuid>,
        description: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: wallet.user_id,
            wallet_id: wallet.id,
            tx_type,
            amount,
            fee: Decimal::ZERO,
            status: TransactionStatus::Completed,
            reference_id,
            description: Some(description),
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for Transaction {
    const NAME: &'static str = "transaction";
    type Create = CreateTransaction;
    type Update = UpdateTransaction;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.transactions
    }

    fn from_create(
        id: Uuid,
        req: CreateTransaction,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        require_non_negative(req.amount, "amount")?;
        let fee = req.fee.unwrap_or(Decimal::ZERO);
        require_non_negative(fee, "fee")?;

        Ok(Self {
            id,
            user_id: req.user_id,
            wallet_id: req.wallet_id,
            tx_type: req.tx_type,
            amount: req.amount,
            fee,
            status: req.status.unwrap_or(TransactionStatus::Pending),
            reference_id: req.reference_id,
            description: req.description,
            metadata: req.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(
        &mut self,
        req: UpdateTransaction,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if let Some(fee) = req.fee {
            require_non_negative(fee, "fee")?;
            self.fee = fee;
        }
        if req.description.is_some() {
            self.description = req.description;
        }
        if req.metadata.is_some() {
            self.metadata = req.metadata;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Records only; admin-created transactions do not move balances.
    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        let wallet = store
            .wallets
            .get(&self.wallet_id)
            .ok_or_else(|| ApiError::not_found(Wallet::NAME, self.wallet_id))?;
        if wallet.user_id != self.user_id {
            return Err(ApiError::InvalidRequest(format!(
                "wallet {} does not belong to user {}",
                self.wallet_id, self.user_id
            )));
        }
        Ok(Vec::new())
    }
}

impl HasStatus for Transaction {
    type Status = TransactionStatus;

    fn status(&self) -> TransactionStatus {
        self.status
    }

    fn set_status(&mut self, status: TransactionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::{CreateUser, User};
    use crate::store::{handle_single_delete, store_record};
    use rust_decimal_macros::dec;

    fn user(store: &Store) -> User {
        store_record::<User>(
            store,
            CreateUser {
                email: "trader@example.com".to_string(),
                first_name: "Tess".to_string(),
                last_name: "Trader".to_string(),
                status: None,
            },
        )
        .unwrap()
    }

    fn wallet_req(user_id: Uuid) -> CreateWallet {
        CreateWallet {
            user_id,
            wallet_type: WalletType::Spot,
            currency: "usdt".to_string(),
            balance: Some(dec!(100)),
        }
    }

    #[test]
    fn test_create_wallet_normalizes_currency() {
        let store = Store::new();
        let user = user(&store);
        let wallet = store_record::<Wallet>(&store, wallet_req(user.id)).unwrap();
        assert_eq!(wallet.currency, "USDT");
        assert_eq!(wallet.balance, dec!(100));
        assert!(wallet.status);
    }

    #[test]
    fn test_wallet_requires_existing_user() {
        let store = Store::new();
        let result = store_record::<Wallet>(&store, wallet_req(Uuid::new_v4()));
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_wallet_is_conflict() {
        let store = Store::new();
        let user = user(&store);
        store_record::<Wallet>(&store, wallet_req(user.id)).unwrap();
        let result = store_record::<Wallet>(&store, wallet_req(user.id));
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[test]
    fn test_wallet_with_reserved_funds_cannot_be_deleted() {
        let store = Store::new();
        let user = user(&store);
        let wallet = store_record::<Wallet>(&store, wallet_req(user.id)).unwrap();
        store.wallets.update(&wallet.id, |w| w.in_order = dec!(5));

        let result = handle_single_delete::<Wallet>(&store, wallet.id);
        assert!(matches!(result, Err(ApiError::Conflict(_))));
        assert!(store.wallets.contains(&wallet.id));
    }

    #[test]
    fn test_transaction_wallet_must_belong_to_user() {
        let store = Store::new();
        let owner = user(&store);
        let wallet = store_record::<Wallet>(&store, wallet_req(owner.id)).unwrap();

        let result = store_record::<Transaction>(
            &store,
            CreateTransaction {
                user_id: Uuid::new_v4(),
                wallet_id: wallet.id,
                tx_type: TransactionType::Deposit,
                amount: dec!(10),
                fee: None,
                status: None,
                reference_id: None,
                description: None,
                metadata: None,
            },
        );
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_wallet_serializes_type_field() {
        let store = Store::new();
        let user = user(&store);
        let wallet = store_record::<Wallet>(&store, wallet_req(user.id)).unwrap();
        let json = serde_json::to_value(&wallet).unwrap();
        assert_eq!(json["type"], "SPOT");
        assert_eq!(json["inOrder"], "0");
    }
}
