//! Ledger value types.
//!
//! The marketplace never owns holders' balances. Matching computes a
//! [`Settlement`] per affected holder and the engine applies it to the
//! ledger collaborator after the document has been saved.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{HolderId, ItemKey};

/// One numbered unit together with when it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionStamp {
    pub number: u64,
    pub obtained_at: DateTime<Utc>,
}

/// A holder's stock of one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub quantity: u64,
    /// Held editions, ascending by number.
    #[serde(default)]
    pub editions: Vec<EditionStamp>,
}

impl Holding {
    #[must_use]
    pub fn holds_edition(&self, number: u64) -> bool {
        self.editions.iter().any(|e| e.number == number)
    }

    #[must_use]
    pub fn edition(&self, number: u64) -> Option<EditionStamp> {
        self.editions.iter().find(|e| e.number == number).copied()
    }

    /// The `n` highest-numbered editions, which are the ones offered first.
    #[must_use]
    pub fn newest_editions(&self, n: usize) -> Vec<EditionStamp> {
        let start = self.editions.len().saturating_sub(n);
        self.editions[start..].to_vec()
    }

    /// Apply an adjustment in place. Quantities saturate at zero.
    pub fn apply(&mut self, adjustment: &HoldingAdjustment) {
        self.quantity = self.quantity.saturating_add_signed(adjustment.quantity);
        self.editions
            .retain(|e| !adjustment.lost.contains(&e.number));
        self.editions.extend(adjustment.gained.iter().copied());
        self.editions.sort_by_key(|e| e.number);
    }
}

/// Change to one holder's stock of one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingAdjustment {
    pub quantity: i64,
    #[serde(default)]
    pub gained: Vec<EditionStamp>,
    #[serde(default)]
    pub lost: Vec<u64>,
}

impl HoldingAdjustment {
    #[must_use]
    pub fn gain(units: u64, editions: Vec<EditionStamp>) -> Self {
        Self {
            quantity: to_signed(units),
            gained: editions,
            lost: Vec::new(),
        }
    }

    #[must_use]
    pub fn lose(units: u64, editions: Vec<u64>) -> Self {
        Self {
            quantity: -to_signed(units),
            gained: Vec::new(),
            lost: editions,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantity == 0 && self.gained.is_empty() && self.lost.is_empty()
    }
}

fn to_signed(units: u64) -> i64 {
    i64::try_from(units).unwrap_or(i64::MAX)
}

/// Ledger side effects of one operation for one holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub holder: HolderId,
    pub item: ItemKey,
    /// Currency change (negative = debit).
    pub balance_delta: Decimal,
    pub holding: HoldingAdjustment,
}

impl Settlement {
    #[must_use]
    pub fn new(holder: HolderId, item: ItemKey) -> Self {
        Self {
            holder,
            item,
            balance_delta: Decimal::ZERO,
            holding: HoldingAdjustment::default(),
        }
    }

    #[must_use]
    pub fn with_balance(mut self, delta: Decimal) -> Self {
        self.balance_delta = delta;
        self
    }

    #[must_use]
    pub fn with_holding(mut self, holding: HoldingAdjustment) -> Self {
        self.holding = holding;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balance_delta.is_zero() && self.holding.is_empty()
    }

    /// The settlement that undoes this one. `lost_stamps` are the stamps of
    /// the editions this settlement removed, as they were before it applied.
    #[must_use]
    pub fn inverse(&self, lost_stamps: Vec<EditionStamp>) -> Self {
        Self {
            holder: self.holder.clone(),
            item: self.item.clone(),
            balance_delta: -self.balance_delta,
            holding: HoldingAdjustment {
                quantity: -self.holding.quantity,
                gained: lost_stamps,
                lost: self.holding.gained.iter().map(|e| e.number).collect(),
            },
        }
    }
}

/// Read-only view of the caller's ledger state, loaded before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wallet {
    pub balance: Decimal,
    pub holding: Holding,
    /// Highest edition of the item minted so far, when the ledger tracks it.
    pub highest_edition: Option<u64>,
}
