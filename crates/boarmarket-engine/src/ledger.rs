//! The ledger collaborator: holders' currency balances and item holdings.
//!
//! The marketplace does not own balances. It reads the caller's state
//! before validating, checks the resulting [`Settlement`]s against the
//! ledger before saving the document, and applies them afterwards. Every
//! call for a holder is made while that holder's queue lane is held.
//!
//! ## Settlement protocol
//!
//! ```text
//! check(all settlements)     nothing written, rejects overdraft / over-removal
//! apply(s) -> inverse(s)     both parts or neither
//! apply(inverse(s))          used by the engine to unwind a failed batch
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use boarmarket_types::{
    EditionStamp, HolderId, Holding, HoldingAdjustment, ItemKey, MarketError, Result, Settlement,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{debug, error};

/// Per-holder currency and holdings store.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn balance(&self, holder: &HolderId) -> Result<Decimal>;

    async fn adjust_balance(&self, holder: &HolderId, delta: Decimal) -> Result<()>;

    async fn holding(&self, holder: &HolderId, item: &ItemKey) -> Result<Holding>;

    async fn adjust_holding(
        &self,
        holder: &HolderId,
        item: &ItemKey,
        adjustment: &HoldingAdjustment,
    ) -> Result<()>;

    /// Highest edition of `item` minted so far. `None` when the ledger does
    /// not track minting, which disables the check against it.
    async fn highest_edition(&self, _item: &ItemKey) -> Result<Option<u64>> {
        Ok(None)
    }

    /// Verify that `settlements`, applied in order, would all succeed.
    /// Nothing is written.
    ///
    /// # Errors
    /// `InsufficientFunds`, `InsufficientHoldings` or `EditionNotHeld` for
    /// the first settlement that would fail.
    async fn check(&self, settlements: &[Settlement]) -> Result<()> {
        let mut balances: BTreeMap<HolderId, Decimal> = BTreeMap::new();
        let mut holdings: BTreeMap<(HolderId, ItemKey), Holding> = BTreeMap::new();
        for settlement in settlements {
            if !settlement.balance_delta.is_zero() {
                if !balances.contains_key(&settlement.holder) {
                    let current = self.balance(&settlement.holder).await?;
                    balances.insert(settlement.holder.clone(), current);
                }
                if let Some(balance) = balances.get_mut(&settlement.holder) {
                    check_balance(*balance, settlement.balance_delta)?;
                    *balance += settlement.balance_delta;
                }
            }
            if !settlement.holding.is_empty() {
                let key = (settlement.holder.clone(), settlement.item.clone());
                if !holdings.contains_key(&key) {
                    let current = self.holding(&settlement.holder, &settlement.item).await?;
                    holdings.insert(key.clone(), current);
                }
                if let Some(holding) = holdings.get_mut(&key) {
                    check_holding(holding, &settlement.holding)?;
                    holding.apply(&settlement.holding);
                }
            }
        }
        Ok(())
    }

    /// Apply one settlement and return the settlement that undoes it.
    ///
    /// If the holding step fails after the balance moved, the balance is
    /// moved back before the error is returned.
    async fn apply(&self, settlement: &Settlement) -> Result<Settlement> {
        let lost_stamps = if settlement.holding.lost.is_empty() {
            Vec::new()
        } else {
            let holding = self.holding(&settlement.holder, &settlement.item).await?;
            lost_editions(&holding, &settlement.holding)
        };
        let delta = settlement.balance_delta;
        if !delta.is_zero() {
            self.adjust_balance(&settlement.holder, delta).await?;
        }
        if !settlement.holding.is_empty() {
            if let Err(e) = self
                .adjust_holding(&settlement.holder, &settlement.item, &settlement.holding)
                .await
            {
                if !delta.is_zero() {
                    if let Err(undo) = self.adjust_balance(&settlement.holder, -delta).await {
                        error!(holder = %settlement.holder, error = %undo, "Balance rollback failed");
                    }
                }
                return Err(e);
            }
        }
        Ok(settlement.inverse(lost_stamps))
    }
}

fn check_balance(balance: Decimal, delta: Decimal) -> Result<()> {
    if balance + delta < Decimal::ZERO {
        return Err(MarketError::InsufficientFunds {
            needed: -delta,
            available: balance,
        });
    }
    Ok(())
}

fn check_holding(holding: &Holding, adjustment: &HoldingAdjustment) -> Result<()> {
    if adjustment.quantity < 0 && holding.quantity < adjustment.quantity.unsigned_abs() {
        return Err(MarketError::InsufficientHoldings {
            needed: adjustment.quantity.unsigned_abs(),
            held: holding.quantity,
        });
    }
    if let Some(missing) = adjustment.lost.iter().find(|n| !holding.holds_edition(**n)) {
        return Err(MarketError::EditionNotHeld(*missing));
    }
    Ok(())
}

fn lost_editions(holding: &Holding, adjustment: &HoldingAdjustment) -> Vec<EditionStamp> {
    adjustment
        .lost
        .iter()
        .filter_map(|n| holding.edition(*n))
        .collect()
}

/// Lets several engines, or an engine and its caller, share one ledger.
#[async_trait]
impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    async fn balance(&self, holder: &HolderId) -> Result<Decimal> {
        (**self).balance(holder).await
    }

    async fn adjust_balance(&self, holder: &HolderId, delta: Decimal) -> Result<()> {
        (**self).adjust_balance(holder, delta).await
    }

    async fn holding(&self, holder: &HolderId, item: &ItemKey) -> Result<Holding> {
        (**self).holding(holder, item).await
    }

    async fn adjust_holding(
        &self,
        holder: &HolderId,
        item: &ItemKey,
        adjustment: &HoldingAdjustment,
    ) -> Result<()> {
        (**self).adjust_holding(holder, item, adjustment).await
    }

    async fn highest_edition(&self, item: &ItemKey) -> Result<Option<u64>> {
        (**self).highest_edition(item).await
    }

    async fn check(&self, settlements: &[Settlement]) -> Result<()> {
        (**self).check(settlements).await
    }

    async fn apply(&self, settlement: &Settlement) -> Result<Settlement> {
        (**self).apply(settlement).await
    }
}

#[derive(Debug, Default, Clone)]
struct Account {
    balance: Decimal,
    holdings: HashMap<ItemKey, Holding>,
}

/// In-process ledger.
///
/// Refuses to take a balance below zero or remove goods that are not held.
/// A settlement is applied under one account lock, so it lands whole or not
/// at all.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: DashMap<HolderId, Account>,
    minted: DashMap<ItemKey, u64>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit currency outside of any trade.
    pub fn deposit(&self, holder: &HolderId, amount: Decimal) {
        self.accounts.entry(holder.clone()).or_default().balance += amount;
    }

    /// Hand a holder goods outside of any trade, minting the editions.
    pub fn grant(&self, holder: &HolderId, item: &ItemKey, quantity: u64, editions: Vec<EditionStamp>) {
        if let Some(top) = editions.iter().map(|e| e.number).max() {
            let mut highest = self.minted.entry(item.clone()).or_default();
            *highest = (*highest).max(top);
        }
        self.accounts
            .entry(holder.clone())
            .or_default()
            .holdings
            .entry(item.clone())
            .or_default()
            .apply(&HoldingAdjustment::gain(quantity, editions));
    }

    /// Sum of all balances.
    #[must_use]
    pub fn total_balance(&self) -> Decimal {
        self.accounts.iter().map(|a| a.balance).sum()
    }

    /// Sum of all holders' quantity of `item`.
    #[must_use]
    pub fn total_quantity(&self, item: &ItemKey) -> u64 {
        self.accounts
            .iter()
            .filter_map(|a| a.holdings.get(item).map(|h| h.quantity))
            .sum()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn balance(&self, holder: &HolderId) -> Result<Decimal> {
        Ok(self
            .accounts
            .get(holder)
            .map_or(Decimal::ZERO, |a| a.balance))
    }

    async fn adjust_balance(&self, holder: &HolderId, delta: Decimal) -> Result<()> {
        let mut account = self.accounts.entry(holder.clone()).or_default();
        check_balance(account.balance, delta)?;
        account.balance += delta;
        debug!(%holder, %delta, balance = %account.balance, "Balance adjusted");
        Ok(())
    }

    async fn holding(&self, holder: &HolderId, item: &ItemKey) -> Result<Holding> {
        Ok(self
            .accounts
            .get(holder)
            .and_then(|a| a.holdings.get(item).cloned())
            .unwrap_or_default())
    }

    async fn adjust_holding(
        &self,
        holder: &HolderId,
        item: &ItemKey,
        adjustment: &HoldingAdjustment,
    ) -> Result<()> {
        let mut account = self.accounts.entry(holder.clone()).or_default();
        let holding = account.holdings.entry(item.clone()).or_default();
        check_holding(holding, adjustment)?;
        holding.apply(adjustment);
        debug!(%holder, %item, quantity = holding.quantity, "Holding adjusted");
        Ok(())
    }

    async fn highest_edition(&self, item: &ItemKey) -> Result<Option<u64>> {
        Ok(self.minted.get(item).map(|highest| *highest))
    }

    async fn apply(&self, settlement: &Settlement) -> Result<Settlement> {
        let mut entry = self.accounts.entry(settlement.holder.clone()).or_default();
        let account = &mut *entry;
        check_balance(account.balance, settlement.balance_delta)?;
        let holding = account.holdings.entry(settlement.item.clone()).or_default();
        check_holding(holding, &settlement.holding)?;

        let lost_stamps = lost_editions(holding, &settlement.holding);
        holding.apply(&settlement.holding);
        account.balance += settlement.balance_delta;
        debug!(
            holder = %settlement.holder,
            item = %settlement.item,
            delta = %settlement.balance_delta,
            quantity = settlement.holding.quantity,
            "Settlement applied"
        );
        Ok(settlement.inverse(lost_stamps))
    }
}
