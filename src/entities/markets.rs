//! Ecosystem (spot) and futures market listings.
//!
//! The rows here are the admin-facing listing; the live order books are kept
//! by the matching engine and synchronised from the API layer.

use super::{require_non_negative, require_range};
use crate::config::{MarketConfig, MarketKind};
use crate::error::ApiError;
use crate::store::{Entity, HasStatus, Store, Table};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Builds the `CURRENCY/PAIR` symbol.
#[must_use]
pub fn symbol_of(currency: &str, pair: &str) -> String {
    format!("{}/{}", currency, pair)
}

fn normalize_code(code: &str, field: &str) -> Result<String, ApiError> {
    let code = code.trim().to_uppercase();
    if code.is_empty() || code.contains('/') {
        return Err(ApiError::InvalidRequest(format!("invalid {}: {:?}", field, code)));
    }
    Ok(code)
}

/// A spot market traded against ecosystem wallets.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EcosystemMarket {
    /// Identifier.
    pub id: Uuid,
    /// Base currency.
    pub currency: String,
    /// Quote currency.
    pub pair: String,
    /// Highlighted as trending.
    pub is_trending: bool,
    /// Highlighted as hot.
    pub is_hot: bool,
    /// Fee rate charged to takers.
    #[schema(value_type = String)]
    pub taker_fee: Decimal,
    /// Fee rate charged to makers.
    #[schema(value_type = String)]
    pub maker_fee: Decimal,
    /// Smallest order amount.
    #[schema(value_type = String)]
    pub min_amount: Decimal,
    /// Whether trading is enabled.
    pub status: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to list a spot market.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEcosystemMarket {
    /// Base currency.
    pub currency: String,
    /// Quote currency.
    pub pair: String,
    /// Trending flag.
    #[serde(default)]
    pub is_trending: bool,
    /// Hot flag.
    #[serde(default)]
    pub is_hot: bool,
    /// Taker fee rate.
    #[schema(value_type = String)]
    pub taker_fee: Decimal,
    /// Maker fee rate.
    #[schema(value_type = String)]
    pub maker_fee: Decimal,
    /// Smallest order amount.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub min_amount: Option<Decimal>,
}

/// Payload to update a spot market.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMarket {
    /// Trending flag.
    pub is_trending: Option<bool>,
    /// Hot flag.
    pub is_hot: Option<bool>,
    /// Taker fee rate.
    #[schema(value_type = Option<String>)]
    pub taker_fee: Option<Decimal>,
    /// Maker fee rate.
    #[schema(value_type = Option<String>)]
    pub maker_fee: Option<Decimal>,
    /// Smallest order amount.
    #[schema(value_type = Option<String>)]
    pub min_amount: Option<Decimal>,
    /// Largest leverage (futures only).
    pub max_leverage: Option<u32>,
}

impl EcosystemMarket {
    /// `CURRENCY/PAIR`.
    #[must_use]
    pub fn symbol(&self) -> String {
        symbol_of(&self.currency, &self.pair)
    }

    /// Seeds a listing from configuration.
    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            currency: config.currency.to_uppercase(),
            pair: config.pair.to_uppercase(),
            is_trending: false,
            is_hot: false,
            taker_fee: config.taker_fee,
            maker_fee: config.maker_fee,
            min_amount: config.min_amount,
            status: true,
            created_at: now,
            updated_at: now,
        }
    }
}

fn validate_fees(taker: Decimal, maker: Decimal, min_amount: Decimal) -> Result<(), ApiError> {
    require_range(Decimal::ZERO, taker, "taker fee")?;
    require_non_negative(maker, "maker fee")?;
    require_non_negative(min_amount, "min amount")?;
    if taker >= Decimal::ONE || maker >= Decimal::ONE {
        return Err(ApiError::InvalidRequest(
            "fee rates must be below 1".to_string(),
        ));
    }
    Ok(())
}

impl Entity for EcosystemMarket {
    const NAME: &'static str = "ecosystem market";
    type Create = CreateEcosystemMarket;
    type Update = UpdateMarket;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.ecosystem_markets
    }

    fn from_create(
        id: Uuid,
        req: CreateEcosystemMarket,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        let min_amount = req.min_amount.unwrap_or(Decimal::ZERO);
        validate_fees(req.taker_fee, req.maker_fee, min_amount)?;
        Ok(Self {
            id,
            currency: normalize_code(&req.currency, "currency")?,
            pair: normalize_code(&req.pair, "pair")?,
            is_trending: req.is_trending,
            is_hot: req.is_hot,
            taker_fee: req.taker_fee,
            maker_fee: req.maker_fee,
            min_amount,
            status: true,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateMarket, now: DateTime<Utc>) -> Result<(), ApiError> {
        if req.max_leverage.is_some() {
            return Err(ApiError::InvalidRequest(
                "spot markets have no leverage".to_string(),
            ));
        }
        if let Some(flag) = req.is_trending {
            self.is_trending = flag;
        }
        if let Some(flag) = req.is_hot {
            self.is_hot = flag;
        }
        if let Some(fee) = req.taker_fee {
            self.taker_fee = fee;
        }
        if let Some(fee) = req.maker_fee {
            self.maker_fee = fee;
        }
        if let Some(min_amount) = req.min_amount {
            self.min_amount = min_amount;
        }
        validate_fees(self.taker_fee, self.maker_fee, self.min_amount)?;
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<crate::store::Effect>, ApiError> {
        if store
            .ecosystem_markets
            .any(|m| m.currency == self.currency && m.pair == self.pair)
        {
            return Err(ApiError::Conflict(format!(
                "ecosystem market {} already exists",
                self.symbol()
            )));
        }
        Ok(Vec::new())
    }
}

impl HasStatus for EcosystemMarket {
    type Status = bool;

    fn status(&self) -> bool {
        self.status
    }

    fn set_status(&mut self, status: bool, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// A perpetual futures market settled in the pair currency.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FuturesMarket {
    /// Identifier.
    pub id: Uuid,
    /// Base currency.
    pub currency: String,
    /// Quote (margin) currency.
    pub pair: String,
    /// Highlighted as trending.
    pub is_trending: bool,
    /// Highlighted as hot.
    pub is_hot: bool,
    /// Fee rate charged to takers.
    #[schema(value_type = String)]
    pub taker_fee: Decimal,
    /// Fee rate charged to makers.
    #[schema(value_type = String)]
    pub maker_fee: Decimal,
    /// Smallest order amount.
    #[schema(value_type = String)]
    pub min_amount: Decimal,
    /// Largest leverage accepted.
    pub max_leverage: u32,
    /// Whether trading is enabled.
    pub status: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to list a futures market.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFuturesMarket {
    /// Base currency.
    pub currency: String,
    /// Quote currency.
    pub pair: String,
    /// Trending flag.
    #[serde(default)]
    pub is_trending: bool,
    /// Hot flag.
    #[serde(default)]
    pub is_hot: bool,
    /// Taker fee rate.
    #[schema(value_type = String)]
    pub taker_fee: Decimal,
    /// Maker fee rate.
    #[schema(value_type = String)]
    pub maker_fee: Decimal,
    /// Smallest order amount.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub min_amount: Option<Decimal>,
    /// Largest leverage.
    pub max_leverage: u32,
}

impl FuturesMarket {
    /// `CURRENCY/PAIR`.
    #[must_use]
    pub fn symbol(&self) -> String {
        symbol_of(&self.currency, &self.pair)
    }

    /// Seeds a listing from configuration.
    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            currency: config.currency.to_uppercase(),
            pair: config.pair.to_uppercase(),
            is_trending: false,
            is_hot: false,
            taker_fee: config.taker_fee,
            maker_fee: config.maker_fee,
            min_amount: config.min_amount,
            max_leverage: config.max_leverage,
            status: true,
            created_at: now,
            updated_at: now,
        }
    }
}

fn validate_leverage(max_leverage: u32) -> Result<(), ApiError> {
    if max_leverage == 0 {
        return Err(ApiError::InvalidRequest(
            "max leverage must be at least 1".to_string(),
        ));
    }
    Ok(())
}

impl Entity for FuturesMarket {
    const NAME: &'static str = "futures market";
    type Create = CreateFuturesMarket;
    type Update = UpdateMarket;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.futures_markets
    }

    fn from_create(
        id: Uuid,
        req: CreateFuturesMarket,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        let min_amount = req.min_amount.unwrap_or(Decimal::ZERO);
        validate_fees(req.taker_fee, req.maker_fee, min_amount)?;
        validate_leverage(req.max_leverage)?;
        Ok(Self {
            id,
            currency: normalize_code(&req.currency, "currency")?,
            pair: normalize_code(&req.pair, "pair")?,
            is_trending: req.is_trending,
            is_hot: req.is_hot,
            taker_fee: req.taker_fee,
            maker_fee: req.maker_fee,
            min_amount,
            max_leverage: req.max_leverage,
            status: true,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateMarket, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(flag) = req.is_trending {
            self.is_trending = flag;
        }
        if let Some(flag) = req.is_hot {
            self.is_hot = flag;
        }
        if let Some(fee) = req.taker_fee {
            self.taker_fee = fee;
        }
        if let Some(fee) = req.maker_fee {
            self.maker_fee = fee;
        }
        if let Some(min_amount) = req.min_amount {
            self.min_amount = min_amount;
        }
        if let Some(max_leverage) = req.max_leverage {
            validate_leverage(max_leverage)?;
            self.max_leverage = max_leverage;
        }
        validate_fees(self.taker_fee, self.maker_fee, self.min_amount)?;
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<crate::store::Effect>, ApiError> {
        if store
            .futures_markets
            .any(|m| m.currency == self.currency && m.pair == self.pair)
        {
            return Err(ApiError::Conflict(format!(
                "futures market {} already exists",
                self.symbol()
            )));
        }
        Ok(Vec::new())
    }
}

impl HasStatus for FuturesMarket {
    type Status = bool;

    fn status(&self) -> bool {
        self.status
    }

    fn set_status(&mut self, status: bool, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// Inserts the configured markets into the store, skipping ones already listed.
pub fn seed_from_config(store: &Store, markets: &[MarketConfig]) {
    for market in markets {
        match market.kind {
            MarketKind::Ecosystem => {
                let row = EcosystemMarket::from_config(market);
                if !store
                    .ecosystem_markets
                    .any(|m| m.currency == row.currency && m.pair == row.pair)
                {
                    store.ecosystem_markets.insert(row.id, row);
                }
            }
            MarketKind::Futures => {
                let row = FuturesMarket::from_config(market);
                if !store
                    .futures_markets
                    .any(|m| m.currency == row.currency && m.pair == row.pair)
                {
                    store.futures_markets.insert(row.id, row);
                }
            }
        }
    }
}
