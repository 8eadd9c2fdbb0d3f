//! Typed outcomes returned by marketplace operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ItemKey, OrderRef, OrderSide, QuoteId};

/// Result of a market (insta) buy or sell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub item: ItemKey,
    /// Side of the caller: `Buy` for an insta-buy, `Sell` for an insta-sell.
    pub side: OrderSide,
    pub filled_quantity: u64,
    /// Total cost (buy) or total proceeds (sell).
    pub total: Decimal,
    /// Edition numbers that changed hands.
    pub editions: Vec<u64>,
}

/// Result of claiming a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReport {
    pub order_ref: OrderRef,
    pub claimed_quantity: u64,
    /// Currency credited (sell orders only).
    pub proceeds: Decimal,
    /// Filled units still waiting to be claimed (capped goods claims).
    pub still_claimable: u64,
    /// Whether the order was finished and removed from the book.
    pub removed: bool,
}

/// Result of cancelling a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReport {
    pub order_ref: OrderRef,
    /// Unfilled units returned (goods for sells, refunded units for buys).
    pub returned_quantity: u64,
    /// Currency refunded (buy orders only).
    pub refund: Decimal,
}

/// Result of repricing a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepriceReport {
    /// The order's new identity (`listed_at` is re-stamped).
    pub order_ref: OrderRef,
    /// Currency charged (positive) or credited (negative) to the holder.
    pub charged: Decimal,
}

/// Price estimate for a market operation; the first half of quote/commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub item: ItemKey,
    pub side: OrderSide,
    pub quantity: u64,
    pub edition: Option<u64>,
    pub total: Decimal,
    pub quoted_at: DateTime<Utc>,
}
