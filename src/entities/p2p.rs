//! Peer-to-peer offers, trades and everything hanging off a trade.

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

// ============================================================================
// Offers
// ============================================================================

/// Offer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    /// Awaiting approval.
    Pending,
    /// Open for trades.
    Active,
    /// Fully traded.
    Completed,
    /// Withdrawn.
    Cancelled,
}

impl OfferStatus {
    /// Whether the offer's locked funds were already settled or returned.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Funds a user offers to sell to other users.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct P2pOffer {
    /// Identifier.
    pub id: Uuid,
    /// Seller.
    pub user_id: Uuid,
    /// Wallet family the funds are locked from.
    pub wallet_type: WalletType,
    /// Currency sold.
    pub currency: String,
    /// Amount still available.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Unit price.
    #[schema(value_type = String)]
    pub price: Decimal,
    /// Smallest trade.
    #[schema(value_type = String)]
    pub min_trade: Decimal,
    /// Largest trade.
    #[schema(value_type = String)]
    pub max_trade: Decimal,
    /// Accepted payment method.
    pub payment_method: String,
    /// Status.
    pub status: OfferStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create an offer.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateP2pOffer {
    /// Seller.
    pub user_id: Uuid,
    /// Wallet family.
    pub wallet_type: WalletType,
    /// Currency sold.
    pub currency: String,
    /// Amount offered.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Unit price.
    #[schema(value_type = String)]
    pub price: Decimal,
    /// Smallest trade.
    #[schema(value_type = String)]
    pub min_trade: Decimal,
    /// Largest trade.
    #[schema(value_type = String)]
    pub max_trade: Decimal,
    /// Payment method.
    pub payment_method: String,
    /// Initial status (default PENDING).
    #[serde(default)]
    pub status: Option<OfferStatus>,
}

/// Payload to update an offer.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateP2pOffer {
    /// Unit price.
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    /// Smallest trade.
    #[schema(value_type = Option<String>)]
    pub min_trade: Option<Decimal>,
    /// Largest trade.
    #[schema(value_type = Option<String>)]
    pub max_trade: Option<Decimal>,
    /// Payment method.
    pub payment_method: Option<String>,
}

impl Entity for P2pOffer {
    const NAME: &'static str = "P2P offer";
    type Create = CreateP2pOffer;
    type Update = UpdateP2pOffer;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.p2p_offers
    }

    fn from_create(id: Uuid, req: CreateP2pOffer, now: DateTime<Utc>) -> Result<Self, ApiError> {
        require_positive(req.amount, "amount")?;
        require_positive(req.price, "price")?;
        require_range(req.min_trade, req.max_trade, "trade")?;
        Ok(Self {
            id,
            user_id: req.user_id,
            wallet_type: req.wallet_type,
            currency: req.currency.trim().to_uppercase(),
            amount: req.amount,
            price: req.price,
            min_trade: req.min_trade,
            max_trade: req.max_trade,
            payment_method: req.payment_method,
            status: req.status.unwrap_or(OfferStatus::Pending),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateP2pOffer, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(price) = req.price {
            require_positive(price, "price")?;
            self.price = price;
        }
        if let Some(min_trade) = req.min_trade {
            self.min_trade = min_trade;
        }
        if let Some(max_trade) = req.max_trade {
            self.max_trade = max_trade;
        }
        if let Some(payment_method) = req.payment_method {
            self.payment_method = payment_method;
        }
        require_range(self.min_trade, self.max_trade, "trade")?;
        self.updated_at = now;
        Ok(())
    }

    /// Locks the offered amount by moving it out of the seller's wallet.
    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        store.require_user(self.user_id)?;
        ledger::plan_charge(
            store,
            self.user_id,
            self.wallet_type,
            &self.currency,
            self.amount,
            TransactionType::P2pOfferTransfer,
            self.id,
            format!("Funds locked in P2P offer {}", self.id),
        )
    }

    /// Open offers give their remaining amount back to the seller.
    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        if store
            .p2p_trades
            .any(|t| t.offer_id == self.id && !t.status.is_closed())
        {
            return Err(ApiError::Conflict(format!(
                "P2P offer {} has open trades",
                self.id
            )));
        }

        // Cancelled and refunded trades still hold amounts taken from the offer.
        let unreturned: Decimal = store
            .p2p_trades
            .filter(|t| t.offer_id == self.id && t.status.returns_to_offer())
            .iter()
            .map(|t| t.amount)
            .sum();
        let refund = self.amount + unreturned;

        let mut effects = ledger::plan_drop_references(store, self.id);
        if !self.status.is_closed() && refund > Decimal::ZERO {
            effects.extend(ledger::plan_credit_back(
                store,
                self.user_id,
                self.wallet_type,
                &self.currency,
                refund,
                format!("Refund for deleted P2P offer {}", self.id),
            )?);
        }
        Ok(effects)
    }
}

impl HasStatus for P2pOffer {
    type Status = OfferStatus;

    fn status(&self) -> OfferStatus {
        self.status
    }

    fn set_status(&mut self, status: OfferStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

// ============================================================================
// Trades
// ============================================================================

/// Trade status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// Awaiting payment.
    Pending,
    /// Buyer marked the trade as paid.
    Paid,
    /// A dispute is open.
    DisputeOpen,
    /// An admin is reviewing the escrow.
    EscrowReview,
    /// Cancelled.
    Cancelled,
    /// Settled.
    Completed,
    /// Escrow returned to the offer.
    Refunded,
}

impl TradeStatus {
    /// Whether the trade no longer holds offer funds.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Refunded)
    }

    /// Whether the traded amount goes back to the offer instead of the buyer.
    #[must_use]
    pub fn returns_to_offer(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }
}

fn trade_total(amount: Decimal, price: Decimal) -> Result<Decimal, ApiError> {
    amount
        .checked_mul(price)
        .ok_or_else(|| ApiError::InvalidRequest("P2P trade total overflows".to_string()))
}

/// A purchase against an offer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct P2pTrade {
    /// Identifier.
    pub id: Uuid,
    /// Offer traded against.
    pub offer_id: Uuid,
    /// Buyer.
    pub user_id: Uuid,
    /// Seller (offer owner).
    pub seller_id: Uuid,
    /// Amount bought.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Unit price at trade time.
    #[schema(value_type = String)]
    pub price: Decimal,
    /// `amount * price`.
    #[schema(value_type = String)]
    pub total: Decimal,
    /// Status.
    pub status: TradeStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a trade.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateP2pTrade {
    /// Offer.
    pub offer_id: Uuid,
    /// Buyer.
    pub user_id: Uuid,
    /// Amount to buy.
    #[schema(value_type = String)]
    pub amount: Decimal,
}

/// Payload to update a trade.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateP2pTrade {
    /// Unit price.
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
}

impl Entity for P2pTrade {
    const NAME: &'static str = "P2P trade";
    type Create = CreateP2pTrade;
    type Update = UpdateP2pTrade;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.p2p_trades
    }

    fn from_create(id: Uuid, req: CreateP2pTrade, now: DateTime<Utc>) -> Result<Self, ApiError> {
        require_positive(req.amount, "amount")?;
        Ok(Self {
            id,
            offer_id: req.offer_id,
            user_id: req.user_id,
            seller_id: Uuid::nil(),
            amount: req.amount,
            price: Decimal::ZERO,
            total: Decimal::ZERO,
            status: TradeStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateP2pTrade, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(price) = req.price {
            require_positive(price, "price")?;
            self.total = trade_total(self.amount, price)?;
            self.price = price;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Takes the amount out of the offer and holds it in escrow.
    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        let offer = store
            .p2p_offers
            .get(&self.offer_id)
            .ok_or_else(|| ApiError::not_found(P2pOffer::NAME, self.offer_id))?;
        store.require_user(self.user_id)?;
        if offer.status != OfferStatus::Active {
            return Err(ApiError::InvalidRequest(format!(
                "P2P offer {} is not active",
                offer.id
            )));
        }
        if offer.user_id == self.user_id {
            return Err(ApiError::InvalidRequest(
                "buyer cannot trade against their own offer".to_string(),
            ));
        }
        require_within(self.amount, offer.min_trade, offer.max_trade)?;
        if self.amount > offer.amount {
            return Err(ApiError::InvalidRequest(format!(
                "P2P offer {} only has {} left",
                offer.id, offer.amount
            )));
        }

        self.seller_id = offer.user_id;
        self.price = offer.price;
        self.total = trade_total(self.amount, offer.price)?;

        let offer_id = offer.id;
        let amount = self.amount;
        let escrow = P2pEscrow {
            id: Uuid::new_v4(),
            trade_id: self.id,
            amount,
            status: EscrowStatus::Held,
            created_at: self.created_at,
            updated_at: self.created_at,
        };
        let effect: Effect = Box::new(move |store: &Store| {
            store.p2p_offers.update(&offer_id, |o| {
                o.amount -= amount;
                o.updated_at = Utc::now();
            });
            store.p2p_escrows.insert(escrow.id, escrow);
        });
        Ok(vec![effect])
    }

    /// Undelivered trades return their amount to the offer; escrow, disputes
    /// and reviews go with the trade.
    fn plan_delete(&self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        let trade_id = self.id;
        let escrows: Vec<Uuid> = store
            .p2p_escrows
            .filter(|e| e.trade_id == trade_id)
            .into_iter()
            .map(|e| e.id)
            .collect();
        let disputes: Vec<Uuid> = store
            .p2p_disputes
            .filter(|d| d.trade_id == trade_id)
            .into_iter()
            .map(|d| d.id)
            .collect();
        let reviews: Vec<Uuid> = store
            .p2p_reviews
            .filter(|r| r.trade_id == trade_id)
            .into_iter()
            .map(|r| r.id)
            .collect();
        let restore =
            (self.status != TradeStatus::Completed).then_some((self.offer_id, self.amount));

        let effect: Effect = Box::new(move |store: &Store| {
            if let Some((offer_id, amount)) = restore {
                store.p2p_offers.update(&offer_id, |o| {
                    o.amount += amount;
                    o.updated_at = Utc::now();
                });
            }
            for id in &escrows {
                store.p2p_escrows.remove(id);
            }
            for id in &disputes {
                store.p2p_disputes.remove(id);
            }
            for id in &reviews {
                store.p2p_reviews.remove(id);
            }
        });
        Ok(vec![effect])
    }
}

impl HasStatus for P2pTrade {
    type Status = TradeStatus;

    fn status(&self) -> TradeStatus {
        self.status
    }

    fn set_status(&mut self, status: TradeStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

fn require_trade(store: &Store, trade_id: Uuid) -> Result<P2pTrade, ApiError> {
    store
        .p2p_trades
        .get(&trade_id)
        .ok_or_else(|| ApiError::not_found(P2pTrade::NAME, trade_id))
}

// ============================================================================
// Escrow
// ============================================================================

/// Escrow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    /// Not yet funded.
    Pending,
    /// Funds held.
    Held,
    /// Released to the buyer.
    Released,
    /// Returned to the seller.
    Refunded,
}

/// Funds held for a trade.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct P2pEscrow {
    /// Identifier.
    pub id: Uuid,
    /// Trade.
    pub trade_id: Uuid,
    /// Held amount.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Status.
    pub status: EscrowStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create an escrow.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateP2pEscrow {
    /// Trade.
    pub trade_id: Uuid,
    /// Amount.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Initial status (default PENDING).
    #[serde(default)]
    pub status: Option<EscrowStatus>,
}

/// Payload to update an escrow.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateP2pEscrow {
    /// Amount.
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
}

impl Entity for P2pEscrow {
    const NAME: &'static str = "P2P escrow";
    type Create = CreateP2pEscrow;
    type Update = UpdateP2pEscrow;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.p2p_escrows
    }

    fn from_create(id: Uuid, req: CreateP2pEscrow, now: DateTime<Utc>) -> Result<Self, ApiError> {
        require_non_negative(req.amount, "amount")?;
        Ok(Self {
            id,
            trade_id: req.trade_id,
            amount: req.amount,
            status: req.status.unwrap_or(EscrowStatus::Pending),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateP2pEscrow, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(amount) = req.amount {
            require_non_negative(amount, "amount")?;
            self.amount = amount;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        require_trade(store, self.trade_id)?;
        Ok(Vec::new())
    }
}

impl HasStatus for P2pEscrow {
    type Status = EscrowStatus;

    fn status(&self) -> EscrowStatus {
        self.status
    }

    fn set_status(&mut self, status: EscrowStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

// ============================================================================
// Disputes
// ============================================================================

/// Dispute status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    /// Raised, not yet picked up.
    Pending,
    /// Under review.
    InProgress,
    /// Closed with a resolution.
    Resolved,
}

/// A complaint about a trade.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct P2pDispute {
    /// Identifier.
    pub id: Uuid,
    /// Trade.
    pub trade_id: Uuid,
    /// Party who raised it.
    pub raised_by: Uuid,
    /// Complaint.
    pub reason: String,
    /// Outcome.
    pub resolution: Option<String>,
    /// Status.
    pub status: DisputeStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a dispute.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateP2pDispute {
    /// Trade.
    pub trade_id: Uuid,
    /// Party raising it.
    pub raised_by: Uuid,
    /// Complaint.
    pub reason: String,
}

/// Payload to update a dispute.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateP2pDispute {
    /// Complaint.
    pub reason: Option<String>,
    /// Outcome.
    pub resolution: Option<String>,
}

impl Entity for P2pDispute {
    const NAME: &'static str = "P2P dispute";
    type Create = CreateP2pDispute;
    type Update = UpdateP2pDispute;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.p2p_disputes
    }

    fn from_create(id: Uuid, req: CreateP2pDispute, now: DateTime<Utc>) -> Result<Self, ApiError> {
        if req.reason.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "reason cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            id,
            trade_id: req.trade_id,
            raised_by: req.raised_by,
            reason: req.reason,
            resolution: None,
            status: DisputeStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateP2pDispute, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(reason) = req.reason {
            self.reason = reason;
        }
        if req.resolution.is_some() {
            self.resolution = req.resolution;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        let trade = require_trade(store, self.trade_id)?;
        if self.raised_by != trade.user_id && self.raised_by != trade.seller_id {
            return Err(ApiError::InvalidRequest(format!(
                "user {} is not a party of trade {}",
                self.raised_by, trade.id
            )));
        }
        Ok(Vec::new())
    }
}

impl HasStatus for P2pDispute {
    type Status = DisputeStatus;

    fn status(&self) -> DisputeStatus {
        self.status
    }

    fn set_status(&mut self, status: DisputeStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

// ============================================================================
// Reviews
// ============================================================================

/// Feedback one trade party leaves about the other.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct P2pReview {
    /// Identifier.
    pub id: Uuid,
    /// Trade reviewed.
    pub trade_id: Uuid,
    /// Author.
    pub reviewer_id: Uuid,
    /// Subject.
    pub reviewed_id: Uuid,
    /// Rating from 1 to 5.
    pub rating: u8,
    /// Comment.
    pub comment: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Payload to create a review.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateP2pReview {
    /// Trade.
    pub trade_id: Uuid,
    /// Author.
    pub reviewer_id: Uuid,
    /// Subject.
    pub reviewed_id: Uuid,
    /// Rating.
    pub rating: u8,
    /// Comment.
    #[serde(default)]
    pub comment: Option<String>,
}

/// Payload to update a review.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateP2pReview {
    /// Rating.
    pub rating: Option<u8>,
    /// Comment.
    pub comment: Option<String>,
}

fn validate_rating(rating: u8) -> Result<(), ApiError> {
    if !(1..=5).contains(&rating) {
        return Err(ApiError::InvalidRequest(format!(
            "rating must be between 1 and 5, got {}",
            rating
        )));
    }
    Ok(())
}

impl Entity for P2pReview {
    const NAME: &'static str = "P2P review";
    type Create = CreateP2pReview;
    type Update = UpdateP2pReview;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(store: &Store) -> &Table<Self> {
        &store.p2p_reviews
    }

    fn from_create(id: Uuid, req: CreateP2pReview, now: DateTime<Utc>) -> Result<Self, ApiError> {
        validate_rating(req.rating)?;
        if req.reviewer_id == req.reviewed_id {
            return Err(ApiError::InvalidRequest(
                "users cannot review themselves".to_string(),
            ));
        }
        Ok(Self {
            id,
            trade_id: req.trade_id,
            reviewer_id: req.reviewer_id,
            reviewed_id: req.reviewed_id,
            rating: req.rating,
            comment: req.comment,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_update(&mut self, req: UpdateP2pReview, now: DateTime<Utc>) -> Result<(), ApiError> {
        if let Some(rating) = req.rating {
            validate_rating(rating)?;
            self.rating = rating;
        }
        if req.comment.is_some() {
            self.comment = req.comment;
        }
        self.updated_at = now;
        Ok(())
    }

    fn plan_create(&mut self, store: &Store) -> Result<Vec<Effect>, ApiError> {
        let trade = require_trade(store, self.trade_id)?;
        let parties = [trade.user_id, trade.seller_id];
        if !parties.contains(&self.reviewer_id) || !parties.contains(&self.reviewed_id) {
            return Err(ApiError::InvalidRequest(format!(
                "reviewer and reviewed user must be parties of trade {}",
                trade.id
            )));
        }
        if store
            .p2p_reviews
            .any(|r| r.trade_id == self.trade_id && r.reviewer_id == self.reviewer_id)
        {
            return Err(ApiError::Conflict(format!(
                "user {} already reviewed trade {}",
                self.reviewer_id, self.trade_id
            )));
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::{CreateUser, User};
    use crate::entities::wallets::{CreateWallet, Wallet};
    use crate::store::{handle_single_delete, store_record, update_status};
    use rust_decimal_macros::dec;

    struct Market {
        store: Store,
        seller_wallet: Wallet,
        buyer: User,
        offer: P2pOffer,
    }

    fn user(store: &Store, email: &str) -> User {
        store_record::<User>(
            store,
            CreateUser {
                email: email.to_string(),
                first_name: "P".to_string(),
                last_name: "P".to_string(),
                status: None,
            },
        )
        .unwrap()
    }

    fn market() -> Market {
        let store = Store::new();
        let seller = user(&store, "seller@example.com");
        let buyer = user(&store, "buyer@example.com");
        let seller_wallet = store_record::<Wallet>(
            &store,
            CreateWallet {
                user_id: seller.id,
                wallet_type: WalletType::Spot,
                currency: "BTC".to_string(),
                balance: Some(dec!(2)),
            },
        )
        .unwrap();
        let offer = store_record::<P2pOffer>(
            &store,
            CreateP2pOffer {
                user_id: seller.id,
                wallet_type: WalletType::Spot,
                currency: "BTC".to_string(),
                amount: dec!(1.5),
                price: dec!(60000),
                min_trade: dec!(0.01),
                max_trade: dec!(1),
                payment_method: "SEPA".to_string(),
                status: Some(OfferStatus::Active),
            },
        )
        .unwrap();
        Market {
            store,
            seller_wallet,
            buyer,
            offer,
        }
    }

    fn trade(m: &Market, amount: Decimal) -> Result<P2pTrade, ApiError> {
        store_record::<P2pTrade>(
            &m.store,
            CreateP2pTrade {
                offer_id: m.offer.id,
                user_id: m.buyer.id,
                amount,
            },
        )
    }

    fn seller_balance(m: &Market) -> Decimal {
        m.store.wallets.get(&m.seller_wallet.id).unwrap().balance
    }

    #[test]
    fn test_offer_locks_funds() {
        let m = market();
        assert_eq!(seller_balance(&m), dec!(0.5));
    }

    #[test]
    fn test_delete_open_offer_refunds_remaining_amount() {
        let m = market();
        handle_single_delete::<P2pOffer>(&m.store, m.offer.id).unwrap();
        assert_eq!(seller_balance(&m), dec!(2));
        assert!(m.store.p2p_offers.is_empty());
    }

    #[test]
    fn test_delete_cancelled_offer_does_not_refund() {
        let m = market();
        update_status::<P2pOffer>(&m.store, &[m.offer.id], OfferStatus::Cancelled).unwrap();
        handle_single_delete::<P2pOffer>(&m.store, m.offer.id).unwrap();
        assert_eq!(seller_balance(&m), dec!(0.5));
    }

    #[test]
    fn test_trade_fills_derived_fields_and_escrow() {
        let m = market();
        let trade = trade(&m, dec!(0.5)).unwrap();
        assert_eq!(trade.seller_id, m.offer.user_id);
        assert_eq!(trade.total, dec!(30000));
        assert_eq!(m.store.p2p_offers.get(&m.offer.id).unwrap().amount, dec!(1));

        let escrows = m.store.p2p_escrows.values();
        assert_eq!(escrows.len(), 1);
        assert_eq!(escrows[0].status, EscrowStatus::Held);
        assert_eq!(escrows[0].amount, dec!(0.5));
    }

    #[test]
    fn test_trade_against_own_offer_rejected() {
        let m = market();
        let result = store_record::<P2pTrade>(
            &m.store,
            CreateP2pTrade {
                offer_id: m.offer.id,
                user_id: m.offer.user_id,
                amount: dec!(0.1),
            },
        );
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_trade_above_max_rejected() {
        let m = market();
        assert!(matches!(
            trade(&m, dec!(1.2)),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_offer_with_open_trade_cannot_be_deleted() {
        let m = market();
        trade(&m, dec!(0.2)).unwrap();
        let result = handle_single_delete::<P2pOffer>(&m.store, m.offer.id);
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[test]
    fn test_delete_trade_restores_offer_and_cascades() {
        let m = market();
        let t = trade(&m, dec!(0.2)).unwrap();
        store_record::<P2pDispute>(
            &m.store,
            CreateP2pDispute {
                trade_id: t.id,
                raised_by: m.buyer.id,
                reason: "No payment received".to_string(),
            },
        )
        .unwrap();

        handle_single_delete::<P2pTrade>(&m.store, t.id).unwrap();
        assert_eq!(m.store.p2p_offers.get(&m.offer.id).unwrap().amount, dec!(1.5));
        assert!(m.store.p2p_escrows.is_empty());
        assert!(m.store.p2p_disputes.is_empty());
    }

    #[test]
    fn test_cancelled_trade_amount_returns_to_seller() {
        let m = market();
        let t = trade(&m, dec!(0.5)).unwrap();
        update_status::<P2pTrade>(&m.store, &[t.id], TradeStatus::Cancelled).unwrap();

        handle_single_delete::<P2pTrade>(&m.store, t.id).unwrap();
        assert_eq!(m.store.p2p_offers.get(&m.offer.id).unwrap().amount, dec!(1.5));

        handle_single_delete::<P2pOffer>(&m.store, m.offer.id).unwrap();
        assert_eq!(seller_balance(&m), dec!(2));
    }

    #[test]
    fn test_offer_delete_refunds_refunded_trades_still_on_record() {
        let m = market();
        let t = trade(&m, dec!(0.5)).unwrap();
        update_status::<P2pTrade>(&m.store, &[t.id], TradeStatus::Refunded).unwrap();

        handle_single_delete::<P2pOffer>(&m.store, m.offer.id).unwrap();
        assert_eq!(seller_balance(&m), dec!(2));

        handle_single_delete::<P2pTrade>(&m.store, t.id).unwrap();
        assert_eq!(seller_balance(&m), dec!(2));
    }

    #[test]
    fn test_completed_trade_delete_keeps_offer_amount() {
        let m = market();
        let t = trade(&m, dec!(0.5)).unwrap();
        update_status::<P2pTrade>(&m.store, &[t.id], TradeStatus::Completed).unwrap();

        handle_single_delete::<P2pTrade>(&m.store, t.id).unwrap();
        assert_eq!(m.store.p2p_offers.get(&m.offer.id).unwrap().amount, dec!(1));
    }

    #[test]
    fn test_trade_total_overflow_rejected() {
        let store = Store::new();
        let seller = user(&store, "whale@example.com");
        let buyer = user(&store, "buyer@example.com");
        let huge = Decimal::from(10u64.pow(15));
        store_record::<Wallet>(
            &store,
            CreateWallet {
                user_id: seller.id,
                wallet_type: WalletType::Spot,
                currency: "BTC".to_string(),
                balance: Some(huge),
            },
        )
        .unwrap();
        let offer = store_record::<P2pOffer>(
            &store,
            CreateP2pOffer {
                user_id: seller.id,
                wallet_type: WalletType::Spot,
                currency: "BTC".to_string(),
                amount: huge,
                price: huge,
                min_trade: dec!(1),
                max_trade: huge,
                payment_method: "SEPA".to_string(),
                status: Some(OfferStatus::Active),
            },
        )
        .unwrap();

        let result = store_record::<P2pTrade>(
            &store,
            CreateP2pTrade {
                offer_id: offer.id,
                user_id: buyer.id,
                amount: huge,
            },
        );
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert_eq!(store.p2p_offers.get(&offer.id).unwrap().amount, huge);
    }

    #[test]
    fn test_review_rules() {
        let m = market();
        let t = trade(&m, dec!(0.2)).unwrap();
        let review = |rating: u8, reviewer: Uuid, reviewed: Uuid| {
            store_record::<P2pReview>(
                &m.store,
                CreateP2pReview {
                    trade_id: t.id,
                    reviewer_id: reviewer,
                    reviewed_id: reviewed,
                    rating,
                    comment: None,
                },
            )
        };

        assert!(matches!(
            review(6, m.buyer.id, t.seller_id),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(matches!(
            review(5, m.buyer.id, m.buyer.id),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(review(5, m.buyer.id, t.seller_id).is_ok());
        assert!(matches!(
            review(4, m.buyer.id, t.seller_id),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn test_dispute_must_come_from_a_party() {
        let m = market();
        let t = trade(&m, dec!(0.2)).unwrap();
        let result = store_record::<P2pDispute>(
            &m.store,
            CreateP2pDispute {
                trade_id: t.id,
                raised_by: Uuid::new_v4(),
                reason: "Scam".to_string(),
            },
        );
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }
}
