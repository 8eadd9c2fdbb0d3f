//! Resting order lifecycle: claim, cancel, reprice, and retiring an item.
//!
//! Claim and cancel treat inventory caps differently. A claim delivers as
//! much as fits and leaves the rest claimable. A cancel destroys the order,
//! so it either returns everything or fails with `NoRoom`.

use std::collections::BTreeMap;

use boarmarket_types::{
    CancelReport, ClaimReport, EditionStamp, HolderId, HoldingAdjustment, ItemKey, MarketConfig,
    MarketError, Order, OrderRef, OrderSide, RepriceReport, Result, Settlement, Wallet,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{
    Execution, MarketDocument, OrderBook, matcher::as_len, placement::check_price,
    price_discovery,
};

/// Find the caller's order. Someone else's order is reported as not found.
fn locate_own(
    doc: &MarketDocument,
    holder: &HolderId,
    order_ref: &OrderRef,
) -> Result<usize> {
    let not_found = || MarketError::OrderNotFound {
        holder: holder.clone(),
        item: order_ref.item.clone(),
    };
    if order_ref.holder != *holder {
        return Err(not_found());
    }
    doc.book(&order_ref.item)
        .ok_or_else(not_found)?
        .locate(order_ref)
}

fn require_claimed(order: &Order) -> Result<()> {
    match order.claimable() {
        0 => Ok(()),
        outstanding => Err(MarketError::MustClaimFirst { outstanding }),
    }
}

/// Collect filled units of an order.
///
/// Sell orders pay out `claimable * unit_price`. Buy orders deliver goods,
/// truncated to the holder's inventory room; the remainder stays claimable.
///
/// # Errors
/// `NothingToClaim` when nothing is filled-but-unclaimed, `NoRoom` when a
/// capped holder has no room at all.
pub fn claim(
    doc: &mut MarketDocument,
    config: &MarketConfig,
    wallet: &Wallet,
    holder: &HolderId,
    order_ref: &OrderRef,
    now: DateTime<Utc>,
) -> Result<Execution<ClaimReport>> {
    let capability = config.catalog.capability(&order_ref.item)?;
    let index = locate_own(doc, holder, order_ref)?;
    let side = order_ref.side;
    let book = doc.book_mut(&order_ref.item);
    let claimable = book.orders(side)[index].claimable();
    if claimable == 0 {
        return Err(MarketError::NothingToClaim);
    }

    let settlement = Settlement::new(holder.clone(), order_ref.item.clone());
    let (claimed, proceeds, settlement) = match side {
        OrderSide::Sell => {
            let proceeds = book.orders(side)[index].cost_of(claimable);
            (claimable, proceeds, settlement.with_balance(proceeds))
        }
        OrderSide::Buy => {
            let held = wallet.holding.quantity;
            let units = match capability.room(held) {
                Some(0) => {
                    return Err(MarketError::NoRoom {
                        cap: capability.inventory_cap.unwrap_or_default(),
                        held,
                        incoming: claimable,
                    });
                }
                Some(room) => claimable.min(room),
                None => claimable,
            };
            let order = &mut book.orders_mut(side)[index];
            let editions = if capability.carries_editions {
                order.take_front_editions(as_len(units))
            } else {
                Vec::new()
            };
            (
                units,
                Decimal::ZERO,
                settlement.with_holding(HoldingAdjustment::gain(units, editions)),
            )
        }
    };

    let order = &mut book.orders_mut(side)[index];
    order.claimed_quantity += claimed;
    let still_claimable = order.claimable();
    let removed = order.is_settled();
    if removed {
        book.remove(side, index);
        price_discovery::refresh_side(book, side, &capability, None, now, config.order_ttl());
    }
    if still_claimable > 0 {
        warn!(%holder, item = %order_ref.item, still_claimable, "Claim truncated by inventory cap");
    }
    info!(%holder, order = %order_ref, claimed, %proceeds, removed, "Order claimed");

    Ok(Execution::new(
        ClaimReport {
            order_ref: order_ref.clone(),
            claimed_quantity: claimed,
            proceeds,
            still_claimable,
            removed,
        },
        vec![settlement],
    ))
}

/// Withdraw a resting order and return its unfilled remainder.
///
/// # Errors
/// `MustClaimFirst` while filled units are unclaimed; `NoRoom` if returned
/// goods would exceed the holder's cap (the order is left intact).
pub fn cancel(
    doc: &mut MarketDocument,
    config: &MarketConfig,
    wallet: &Wallet,
    holder: &HolderId,
    order_ref: &OrderRef,
    now: DateTime<Utc>,
) -> Result<Execution<CancelReport>> {
    let capability = config.catalog.capability(&order_ref.item)?;
    let index = locate_own(doc, holder, order_ref)?;
    let side = order_ref.side;
    let book = doc.book_mut(&order_ref.item);
    let order = &book.orders(side)[index];
    require_claimed(order)?;

    let remaining = order.remaining();
    let settlement = Settlement::new(holder.clone(), order_ref.item.clone());
    let (refund, settlement) = match side {
        OrderSide::Buy => {
            let refund = order.cost_of(remaining);
            (refund, settlement.with_balance(refund))
        }
        OrderSide::Sell => {
            capability.ensure_room(wallet.holding.quantity, remaining)?;
            let editions = order.edition_stamps().collect();
            (
                Decimal::ZERO,
                settlement.with_holding(HoldingAdjustment::gain(remaining, editions)),
            )
        }
    };

    book.remove(side, index);
    price_discovery::refresh_side(book, side, &capability, None, now, config.order_ttl());
    info!(%holder, order = %order_ref, remaining, %refund, "Order cancelled");

    Ok(Execution::new(
        CancelReport {
            order_ref: order_ref.clone(),
            returned_quantity: remaining,
            refund,
        },
        vec![settlement],
    ))
}

/// Change a resting order's unit price.
///
/// Buy orders pay (or are refunded) `(new - old) * remaining`; sell orders
/// carry no charge. The order is re-stamped to `now` and queues behind
/// other orders at its new price.
///
/// # Errors
/// `MustClaimFirst`, the price checks of placement, and `InsufficientFunds`
/// when a buy cannot cover the increase.
pub fn reprice(
    doc: &mut MarketDocument,
    config: &MarketConfig,
    wallet: &Wallet,
    holder: &HolderId,
    order_ref: &OrderRef,
    new_price: Decimal,
    now: DateTime<Utc>,
) -> Result<Execution<RepriceReport>> {
    let capability = config.catalog.capability(&order_ref.item)?;
    let index = locate_own(doc, holder, order_ref)?;
    let side = order_ref.side;
    let order = &doc
        .book(&order_ref.item)
        .ok_or_else(|| MarketError::Internal("book vanished after locate".to_string()))?
        .orders(side)[index];
    require_claimed(order)?;
    check_price(config, &capability, doc.book(&order_ref.item), side, new_price, now)?;

    let charged = match side {
        OrderSide::Buy => (new_price - order.unit_price) * Decimal::from(order.remaining()),
        OrderSide::Sell => Decimal::ZERO,
    };
    if charged > wallet.balance {
        return Err(MarketError::InsufficientFunds {
            needed: charged,
            available: wallet.balance,
        });
    }

    let book = doc.book_mut(&order_ref.item);
    let mut order = book.remove(side, index);
    order.unit_price = new_price;
    order.listed_at = book.fresh_listing_time(side, holder, now);
    let new_ref = book.order_ref(side, &order);
    book.insert(side, order);
    price_discovery::refresh(book, &capability, now, config.order_ttl());
    info!(%holder, from = %order_ref, to = %new_ref, price = %new_price, %charged, "Order repriced");

    let settlement =
        Settlement::new(holder.clone(), order_ref.item.clone()).with_balance(-charged);
    Ok(Execution::new(
        RepriceReport {
            order_ref: new_ref,
            charged,
        },
        vec![settlement],
    ))
}

/// Everything an order still owes its holder, ignoring inventory caps.
fn unwind(item: &ItemKey, side: OrderSide, order: &Order) -> Settlement {
    let settlement = Settlement::new(order.holder.clone(), item.clone());
    let editions = |units: u64| -> Vec<EditionStamp> {
        if units > 0 {
            order.edition_stamps().collect()
        } else {
            Vec::new()
        }
    };
    match side {
        // Unfilled currency back, filled goods delivered.
        OrderSide::Buy => settlement
            .with_balance(order.cost_of(order.remaining()))
            .with_holding(HoldingAdjustment::gain(
                order.claimable(),
                editions(order.claimable()),
            )),
        // Unfilled goods back, filled proceeds paid.
        OrderSide::Sell => settlement
            .with_balance(order.cost_of(order.claimable()))
            .with_holding(HoldingAdjustment::gain(
                order.remaining(),
                editions(order.remaining()),
            )),
    }
}

fn merge(into: &mut Settlement, from: Settlement) {
    into.balance_delta += from.balance_delta;
    into.holding.quantity += from.holding.quantity;
    into.holding.gained.extend(from.holding.gained);
    into.holding.lost.extend(from.holding.lost);
}

/// Remove an item's book and hand every order's value back to its holder.
/// Used when an item leaves the catalog.
pub fn retire_item(doc: &mut MarketDocument, item: &ItemKey) -> Execution<Vec<OrderRef>> {
    let Some(mut book) = doc.remove_book(item) else {
        return Execution::new(Vec::new(), Vec::new());
    };
    let refs = collect_refs(&book);
    let mut per_holder: BTreeMap<HolderId, Settlement> = BTreeMap::new();
    for (side, order) in book.drain_all() {
        let settlement = unwind(item, side, &order);
        match per_holder.get_mut(&order.holder) {
            Some(existing) => merge(existing, settlement),
            None => {
                per_holder.insert(order.holder.clone(), settlement);
            }
        }
    }
    info!(%item, orders = refs.len(), holders = per_holder.len(), "Item retired");
    Execution::new(
        refs,
        per_holder
            .into_values()
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

fn collect_refs(book: &OrderBook) -> Vec<OrderRef> {
    [OrderSide::Buy, OrderSide::Sell]
        .into_iter()
        .flat_map(|side| book.orders(side).iter().map(move |o| book.order_ref(side, o)))
        .collect()
}
