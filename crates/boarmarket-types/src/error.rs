//! Error types for the BoarMarket marketplace.
//!
//! All errors use the `MK_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 2xx: Funds / holdings errors
//! - 3xx: Pricing errors
//! - 4xx: Lifecycle errors (claim, cancel, reprice)
//! - 9xx: Storage / general / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{HolderId, ItemKey};

/// Central error enum for all BoarMarket operations.
#[derive(Debug, Error)]
pub enum MarketError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// The referenced order is not resting in the book.
    #[error("MK_ERR_100: Order not found for holder {holder} on {item}")]
    OrderNotFound { holder: HolderId, item: ItemKey },

    /// The order failed shape validation (zero quantity, missing edition, ...).
    #[error("MK_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// The holder already has the maximum number of resting orders.
    #[error("MK_ERR_102: Resting order limit reached ({max})")]
    MaxOrdersReached { max: usize },

    /// The item is not part of the catalog.
    #[error("MK_ERR_103: Unknown item: {0}")]
    UnknownItem(ItemKey),

    /// A buy asked for more units than one order may carry.
    #[error("MK_ERR_104: Quantity {quantity} exceeds maximum {max}")]
    QuantityTooHigh { quantity: u64, max: u64 },

    // =================================================================
    // Funds / Holdings Errors (2xx)
    // =================================================================
    /// Not enough currency to pay for the operation.
    #[error("MK_ERR_200: Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// Not enough units of the item held to offer them.
    #[error("MK_ERR_201: Insufficient holdings: need {needed}, have {held}")]
    InsufficientHoldings { needed: u64, held: u64 },

    /// The holder does not own the edition they tried to offer.
    #[error("MK_ERR_202: Edition #{0} is not held")]
    EditionNotHeld(u64),

    /// Receiving the goods would exceed the item's inventory cap.
    #[error("MK_ERR_203: No room: cap {cap}, held {held}, incoming {incoming}")]
    NoRoom { cap: u64, held: u64, incoming: u64 },

    /// A bid for an edition the buyer already owns or is selling.
    #[error("MK_ERR_204: Edition #{0} is already yours")]
    EditionAlreadyOwned(u64),

    // =================================================================
    // Pricing Errors (3xx)
    // =================================================================
    /// Not enough resting orders to fill a market order.
    #[error("MK_ERR_300: Insufficient liquidity: wanted {wanted}, available {available}")]
    InsufficientLiquidity { wanted: u64, available: u64 },

    /// The quote went stale between estimate and commit.
    #[error("MK_ERR_301: Price changed: new total {new_total}")]
    PriceChanged { new_total: Decimal },

    /// Limit price is outside the allowed band around the reference price.
    #[error("MK_ERR_302: Price {price} outside allowed range [{min}, {max}]")]
    PriceOutOfRange {
        price: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Unit price exceeds the absolute ceiling.
    #[error("MK_ERR_303: Price {price} exceeds maximum {max}")]
    PriceTooHigh { price: Decimal, max: Decimal },

    /// No live resting order offers the requested edition.
    #[error("MK_ERR_304: Edition #{0} is not available")]
    EditionUnavailable(u64),

    /// A bid for an edition number that has not been minted yet.
    #[error("MK_ERR_305: Edition #{edition} does not exist (highest is #{highest})")]
    EditionNotMinted { edition: u64, highest: u64 },

    // =================================================================
    // Lifecycle Errors (4xx)
    // =================================================================
    /// The order has no filled-but-unclaimed quantity.
    #[error("MK_ERR_400: Nothing to claim")]
    NothingToClaim,

    /// Filled quantity must be claimed before cancelling or repricing.
    #[error("MK_ERR_401: Claim {outstanding} filled unit(s) first")]
    MustClaimFirst { outstanding: u64 },

    // =================================================================
    // Storage / General / Internal (9xx)
    // =================================================================
    /// Persistence layer failure (document or ledger).
    #[error("MK_ERR_900: Storage error: {0}")]
    Storage(String),

    /// Serialization / deserialization error.
    #[error("MK_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, bad values, etc.).
    #[error("MK_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Unrecoverable internal error.
    #[error("MK_ERR_903: Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    /// Whether this is a business rejection returned to the caller as a
    /// typed outcome, as opposed to a storage or programming failure.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::Storage(_) | Self::Serialization(_) | Self::Configuration(_) | Self::Internal(_)
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, MarketError>;

impl From<std::io::Error> for MarketError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
