//! Order types for the BoarMarket order book.
//!
//! An [`Order`] is a resting limit order. Fills and claims are tracked on the
//! order itself; the counter-party's goods or currency wait there until the
//! holder claims them.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EditionStamp, HolderId, ItemKey};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A resting limit order.
///
/// Invariants: `claimed_quantity <= filled_quantity <= quantity` and
/// `editions.len() == edition_timestamps.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub holder: HolderId,
    pub quantity: u64,
    pub unit_price: Decimal,
    /// Edition numbers attached to this order (empty for plain goods).
    #[serde(default)]
    pub editions: Vec<u64>,
    /// Acquisition timestamps, parallel to `editions`.
    #[serde(default)]
    pub edition_timestamps: Vec<DateTime<Utc>>,
    pub listed_at: DateTime<Utc>,
    #[serde(default)]
    pub filled_quantity: u64,
    #[serde(default)]
    pub claimed_quantity: u64,
}

impl Order {
    /// A fresh, unfilled order.
    #[must_use]
    pub fn new(
        holder: HolderId,
        quantity: u64,
        unit_price: Decimal,
        editions: Vec<EditionStamp>,
        listed_at: DateTime<Utc>,
    ) -> Self {
        let (editions, edition_timestamps) = editions
            .into_iter()
            .map(|e| (e.number, e.obtained_at))
            .unzip();
        Self {
            holder,
            quantity,
            unit_price,
            editions,
            edition_timestamps,
            listed_at,
            filled_quantity: 0,
            claimed_quantity: 0,
        }
    }

    /// Units not yet matched by a counter-party.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.quantity - self.filled_quantity
    }

    /// Units matched but not yet collected by the holder.
    #[must_use]
    pub fn claimable(&self) -> u64 {
        self.filled_quantity - self.claimed_quantity
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    /// Whether the order is completely finished (filled and collected).
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.is_filled() && self.claimed_quantity == self.quantity
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.listed_at + ttl < now
    }

    /// Visible to matching and price discovery: unfilled and unexpired.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !self.is_filled() && !self.is_expired(now, ttl)
    }

    /// The edition a unique-edition order is for.
    #[must_use]
    pub fn edition(&self) -> Option<u64> {
        self.editions.first().copied()
    }

    /// Edition stamps in order.
    pub fn edition_stamps(&self) -> impl Iterator<Item = EditionStamp> + '_ {
        self.editions
            .iter()
            .zip(&self.edition_timestamps)
            .map(|(&number, &obtained_at)| EditionStamp {
                number,
                obtained_at,
            })
    }

    /// Remove and return up to `n` editions from the front.
    pub fn take_front_editions(&mut self, n: usize) -> Vec<EditionStamp> {
        let n = n.min(self.editions.len());
        self.editions
            .drain(..n)
            .zip(self.edition_timestamps.drain(..n))
            .map(|(number, obtained_at)| EditionStamp {
                number,
                obtained_at,
            })
            .collect()
    }

    pub fn push_editions(&mut self, stamps: impl IntoIterator<Item = EditionStamp>) {
        for stamp in stamps {
            self.editions.push(stamp.number);
            self.edition_timestamps.push(stamp.obtained_at);
        }
    }

    /// Whether this order is the one identified by `(holder, listed_at)`.
    #[must_use]
    pub fn is_identified_by(&self, holder: &HolderId, listed_at: DateTime<Utc>) -> bool {
        self.holder == *holder && self.listed_at == listed_at
    }

    #[must_use]
    pub fn cost_of(&self, units: u64) -> Decimal {
        self.unit_price * Decimal::from(units)
    }
}

/// Reference to a resting order, handed back by placement and used by
/// claim/cancel/reprice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRef {
    pub item: ItemKey,
    pub side: OrderSide,
    pub holder: HolderId,
    pub listed_at: DateTime<Utc>,
}

impl std::fmt::Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} by {} @ {}",
            self.side,
            self.item,
            self.holder,
            self.listed_at.timestamp_millis()
        )
    }
}

/// One holder's order together with where it rests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    pub order_ref: OrderRef,
    pub order: Order,
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy(holder: &str, quantity: u64, unit_price: Decimal) -> Self {
        Self::new(
            HolderId::new(holder),
            quantity,
            unit_price,
            Vec::new(),
            Utc::now(),
        )
    }
}
