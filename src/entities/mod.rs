//! Persisted records of the platform, grouped by product module.

pub mod ai;
pub mod forex;
pub mod ico;
pub mod markets;
pub mod p2p;
pub mod referral;
pub mod staking;
pub mod users;
pub mod wallets;

use crate::error::ApiError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Wallet family a balance is held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletType {
    /// Fiat wallet.
    Fiat,
    /// Exchange spot wallet.
    Spot,
    /// Ecosystem (native chain) wallet, used by ecosystem markets.
    Eco,
    /// Futures margin wallet.
    Futures,
}

impl std::fmt::Display for WalletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fiat => write!(f, "FIAT"),
            Self::Spot => write!(f, "SPOT"),
            Self::Eco => write!(f, "ECO"),
            Self::Futures => write!(f, "FUTURES"),
        }
    }
}

/// Outcome of a settled investment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentResult {
    /// Investment made a profit.
    Win,
    /// Investment made a loss.
    Loss,
    /// Investment broke even.
    Draw,
}

/// Lifecycle of AI and forex investments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentStatus {
    /// Funds are invested.
    Active,
    /// Investment settled.
    Completed,
    /// Cancelled by the user or an admin.
    Cancelled,
    /// Rejected by an admin.
    Rejected,
}

/// Fails unless `value > 0`.
///
/// # Errors
/// Returns `InvalidRequest` naming the field.
pub fn require_positive(value: Decimal, field: &str) -> Result<(), ApiError> {
    if value <= Decimal::ZERO {
        return Err(ApiError::InvalidRequest(format!(
            "{} must be positive",
            field
        )));
    }
    Ok(())
}

/// Fails if `value < 0`.
///
/// # Errors
/// Returns `InvalidRequest` naming the field.
pub fn require_non_negative(value: Decimal, field: &str) -> Result<(), ApiError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ApiError::InvalidRequest(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

/// Fails unless `0 <= min <= max`.
///
/// # Errors
/// Returns `InvalidRequest` naming the field pair.
pub fn require_range(min: Decimal, max: Decimal, field: &str) -> Result<(), ApiError> {
    require_non_negative(min, field)?;
    if min > max {
        return Err(ApiError::InvalidRequest(format!(
            "minimum {} cannot exceed maximum",
            field
        )));
    }
    Ok(())
}

/// Fails unless `min <= amount <= max`.
///
/// # Errors
/// Returns `InvalidRequest` describing the bounds.
pub fn require_within(amount: Decimal, min: Decimal, max: Decimal) -> Result<(), ApiError> {
    if amount < min || amount > max {
        return Err(ApiError::InvalidRequest(format!(
            "amount {} must be between {} and {}",
            amount, min, max
        )));
    }
    Ok(())
}
