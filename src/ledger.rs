//! Wallet bookkeeping.
//!
//! Every function here either reads the store and returns planned
//! [`Effect`]s, or is itself infallible. Callers hold the store guard from
//! planning through [`Store::apply`], so a checked balance cannot change
//! underneath a planned debit.

use crate::entities::WalletType;
use crate::entities::wallets::{Transaction, TransactionType, Wallet};
use crate::error::ApiError;
use crate::store::{Effect, Entity, Store};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

/// Looks up a user's wallet by family and currency.
#[must_use]
pub fn find_wallet(
    store: &Store,
    user_id: Uuid,
    wallet_type: WalletType,
    currency: &str,
) -> Option<Wallet> {
    store.wallets.find(|w| {
        w.user_id == user_id && w.wallet_type == wallet_type && w.currency == currency
    })
}

/// Like [`find_wallet`] but fails when the wallet is missing.
///
/// # Errors
/// Returns `NotFound` describing the wallet.
pub fn require_wallet(
    store: &Store,
    user_id: Uuid,
    wallet_type: WalletType,
    currency: &str,
) -> Result<Wallet, ApiError> {
    find_wallet(store, user_id, wallet_type, currency).ok_or_else(|| {
        ApiError::NotFound(format!(
            "{} {} wallet of user {} not found",
            wallet_type, currency, user_id
        ))
    })
}

/// Fails unless the wallet's available balance covers `amount`.
///
/// # Errors
/// Returns `InsufficientFunds`.
pub fn ensure_available(wallet: &Wallet, amount: Decimal) -> Result<(), ApiError> {
    if wallet.balance < amount {
        return Err(ApiError::InsufficientFunds(format!(
            "{} {} wallet holds {}, {} required",
            wallet.wallet_type, wallet.currency, wallet.balance, amount
        )));
    }
    Ok(())
}

/// Adds to the available balance.
pub fn credit(store: &Store, wallet_id: Uuid, amount: Decimal) {
    store.wallets.update(&wallet_id, |w| {
        w.balance += amount;
        w.updated_at = Utc::now();
    });
}

/// Subtracts from the available balance. Callers check availability first.
pub fn debit(store: &Store, wallet_id: Uuid, amount: Decimal) {
    store.wallets.update(&wallet_id, |w| {
        w.balance -= amount;
        w.updated_at = Utc::now();
    });
}

/// Moves funds from the available balance to `in_order`.
pub fn reserve(store: &Store, wallet_id: Uuid, amount: Decimal) {
    store.wallets.update(&wallet_id, |w| {
        w.balance -= amount;
        w.in_order += amount;
        w.updated_at = Utc::now();
    });
}

/// Moves funds from `in_order` back to the available balance.
///
/// Never releases more than is reserved.
pub fn release(store: &Store, wallet_id: Uuid, amount: Decimal) {
    store.wallets.update(&wallet_id, |w| {
        let amount = amount.min(w.in_order);
        w.in_order -= amount;
        w.balance += amount;
        w.updated_at = Utc::now();
    });
}

/// Spends reserved funds (they leave the wallet).
pub fn consume_reserved(store: &Store, wallet_id: Uuid, amount: Decimal) {
    store.wallets.update(&wallet_id, |w| {
        let amount = amount.min(w.in_order);
        w.in_order -= amount;
        w.updated_at = Utc::now();
    });
}

/// Plans a debit of `amount` from a user's wallet together with the
/// transaction recording it under `reference_id`.
///
/// # Errors
/// Returns `NotFound` if the wallet is missing and `InsufficientFunds` if its
/// balance is too low.
#[allow(clippy::too_many_arguments)]
pub fn plan_charge(
    store: &Store,
    user_id: Uuid,
    wallet_type: WalletType,
    currency: &str,
    amount: Decimal,
    tx_type: TransactionType,
    reference_id: Uuid,
    description: String,
) -> Result<Vec<Effect>, ApiError> {
    let wallet = require_wallet(store, user_id, wallet_type, currency)?;
    ensure_available(&wallet, amount)?;

    let wallet_id = wallet.id;
    let tx = Transaction::completed(&wallet, tx_type, amount, Some(reference_id), description);
    Ok(vec![
        Box::new(move |store: &Store| debit(store, wallet_id, amount)) as Effect,
        record(tx),
    ])
}

/// Plans inserting a transaction row.
pub fn record(tx: Transaction) -> Effect {
    Box::new(move |store: &Store| {
        store.transactions.insert(tx.id, tx);
    })
}

/// Plans removing every transaction that references `reference_id`.
#[must_use]
pub fn plan_drop_references(store: &Store, reference_id: Uuid) -> Vec<Effect> {
    let ids: Vec<Uuid> = store
        .transactions
        .filter(|t| t.reference_id == Some(reference_id))
        .into_iter()
        .map(|t| t.id)
        .collect();
    if ids.is_empty() {
        return Vec::new();
    }
    let effect: Effect = Box::new(move |store: &Store| {
        for id in &ids {
            store.transactions.remove(id);
        }
    });
    vec![effect]
}

/// Plans the compensation for deleting a record that was paid for from a
/// wallet.
///
/// When `refundable`, the originating transaction (the one whose
/// `reference_id` is the record) is located, its amount is credited back to
/// the wallet it was charged from and a REFUND transaction is recorded.
/// Either way the record's own transactions are removed with it.
///
/// # Errors
/// Returns `NotFound` if a refundable record has no originating transaction
/// or its wallet no longer exists.
pub fn plan_refund(
    store: &Store,
    model: &str,
    reference_id: Uuid,
    refundable: bool,
) -> Result<Vec<Effect>, ApiError> {
    let mut effects = Vec::new();

    if refundable {
        let origin = store
            .transactions
            .find(|t| t.reference_id == Some(reference_id) && t.tx_type != TransactionType::Refund)
            .ok_or_else(|| {
                ApiError::NotFound(format!("transaction for {} {} not found", model, reference_id))
            })?;
        let wallet = store
            .wallets
            .get(&origin.wallet_id)
            .ok_or_else(|| ApiError::not_found(Wallet::NAME, origin.wallet_id))?;

        debug!(
            "Planning refund of {} to wallet {} for {} {}",
            origin.amount, wallet.id, model, reference_id
        );
        let wallet_id = wallet.id;
        let amount = origin.amount;
        effects.push(Box::new(move |store: &Store| credit(store, wallet_id, amount)) as Effect);
        effects.extend(plan_drop_references(store, reference_id));
        effects.push(record(Transaction::completed(
            &wallet,
            TransactionType::Refund,
            amount,
            None,
            format!("Refund for deleted {} {}", model, reference_id),
        )));
    } else {
        effects.extend(plan_drop_references(store, reference_id));
    }

    Ok(effects)
}

/// Plans crediting `amount` straight back to a user's wallet, recording a
/// REFUND transaction.
///
/// # Errors
/// Returns `NotFound` if the wallet is missing.
pub fn plan_credit_back(
    store: &Store,
    user_id: Uuid,
    wallet_type: WalletType,
    currency: &str,
    amount: Decimal,
    description: String,
) -> Result<Vec<Effect>, ApiError> {
    let wallet = require_wallet(store, user_id, wallet_type, currency)?;
    let wallet_id = wallet.id;
    Ok(vec![
        Box::new(move |store: &Store| credit(store, wallet_id, amount)) as Effect,
        record(Transaction::completed(
            &wallet,
            TransactionType::Refund,
            amount,
            None,
            description,
        )),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::User;
    use crate::entities::users::UserStatus;
    use rust_decimal_macros::dec;

    fn seed_wallet(store: &Store, balance: Decimal) -> Wallet {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "w@example.com".to_string(),
            first_name: "W".to_string(),
            last_name: "W".to_string(),
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };
        store.users.insert(user.id, user.clone());
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id: user.id,
            wallet_type: WalletType::Spot,
            currency: "USDT".to_string(),
            balance,
            in_order: Decimal::ZERO,
            status: true,
            created_at: now,
            updated_at: now,
        };
        store.wallets.insert(wallet.id, wallet.clone());
        wallet
    }

    #[test]
    fn test_reserve_release_consume() {
        let store = Store::new();
        let wallet = seed_wallet(&store, dec!(100));

        reserve(&store, wallet.id, dec!(40));
        let w = store.wallets.get(&wallet.id).unwrap();
        assert_eq!((w.balance, w.in_order), (dec!(60), dec!(40)));

        consume_reserved(&store, wallet.id, dec!(15));
        release(&store, wallet.id, dec!(100));
        let w = store.wallets.get(&wallet.id).unwrap();
        assert_eq!((w.balance, w.in_order), (dec!(85), Decimal::ZERO));
    }

    #[test]
    fn test_plan_charge_checks_balance() {
        let store = Store::new();
        let wallet = seed_wallet(&store, dec!(10));

        let result = plan_charge(
            &store,
            wallet.user_id,
            WalletType::Spot,
            "USDT",
            dec!(11),
            TransactionType::Staking,
            Uuid::new_v4(),
            "stake".to_string(),
        );
        assert!(matches!(result, Err(ApiError::InsufficientFunds(_))));
        assert_eq!(store.wallets.get(&wallet.id).unwrap().balance, dec!(10));
    }

    #[test]
    fn test_charge_then_refund_restores_balance() {
        let store = Store::new();
        let wallet = seed_wallet(&store, dec!(50));
        let reference = Uuid::new_v4();

        let effects = plan_charge(
            &store,
            wallet.user_id,
            WalletType::Spot,
            "USDT",
            dec!(20),
            TransactionType::AiInvestment,
            reference,
            "invest".to_string(),
        )
        .unwrap();
        store.apply(effects);
        assert_eq!(store.wallets.get(&wallet.id).unwrap().balance, dec!(30));
        assert_eq!(store.transactions.len(), 1);

        let effects = plan_refund(&store, "investment", reference, true).unwrap();
        store.apply(effects);
        assert_eq!(store.wallets.get(&wallet.id).unwrap().balance, dec!(50));

        let remaining = store.transactions.values();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].tx_type, TransactionType::Refund);
    }

    #[test]
    fn test_refund_without_origin_is_not_found() {
        let store = Store::new();
        seed_wallet(&store, dec!(50));
        let result = plan_refund(&store, "investment", Uuid::new_v4(), true);
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_non_refundable_only_drops_references() {
        let store = Store::new();
        let wallet = seed_wallet(&store, dec!(50));
        let reference = Uuid::new_v4();
        store.apply(vec![record(Transaction::completed(
            &wallet,
            TransactionType::Staking,
            dec!(5),
            Some(reference),
            "stake".to_string(),
        ))]);

        let effects = plan_refund(&store, "staking log", reference, false).unwrap();
        store.apply(effects);
        assert!(store.transactions.is_empty());
        assert_eq!(store.wallets.get(&wallet.id).unwrap().balance, dec!(50));
    }
}
