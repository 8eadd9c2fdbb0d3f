//! Market ("insta") buys and sells, and the quote/commit protocol on top.
//!
//! A market order walks the opposite side of the book best-first, taking
//! `min(still needed, order remaining)` from each live order until the
//! requested quantity is gathered. The walk is planned against an immutable
//! view first; the document is only touched once every check has passed.
//!
//! ## Unique editions
//!
//! For unique-edition items there is no walk: the single live order whose
//! `editions[0]` is the requested edition is filled for exactly one unit.
//!
//! ## Self-Trade Prevention
//!
//! Orders resting under the caller's own holder id are skipped.

use boarmarket_types::{
    EditionStamp, FillReport, HolderId, HoldingAdjustment, ItemCapability, ItemKey, MarketConfig,
    MarketError, OrderSide, Quote, QuoteId, Result, Settlement, Wallet,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::{MarketDocument, OrderBook, placement::check_buy_quantity, price_discovery};

/// A pure operation's result: the caller-facing outcome plus the ledger
/// changes to apply after the document is saved.
#[derive(Debug, Clone)]
pub struct Execution<T> {
    pub outcome: T,
    pub settlements: Vec<Settlement>,
}

impl<T> Execution<T> {
    #[must_use]
    pub fn new(outcome: T, settlements: Vec<Settlement>) -> Self {
        Self {
            outcome,
            settlements,
        }
    }
}

/// An immediate buy or sell against resting orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketOrder {
    pub holder: HolderId,
    pub item: ItemKey,
    pub quantity: u64,
    /// Requested edition; required for unique-edition items, absent otherwise.
    pub edition: Option<u64>,
}

#[derive(Debug)]
struct Leg {
    index: usize,
    units: u64,
}

#[derive(Debug)]
struct FillPlan {
    legs: Vec<Leg>,
    total: Decimal,
}

pub(crate) fn as_len(units: u64) -> usize {
    usize::try_from(units).unwrap_or(usize::MAX)
}

fn validate(request: &MarketOrder, capability: &ItemCapability) -> Result<()> {
    if request.quantity == 0 {
        return Err(MarketError::InvalidOrder {
            reason: "Quantity must be positive".to_string(),
        });
    }
    match (capability.unique_editions, request.edition) {
        (true, None) => Err(MarketError::InvalidOrder {
            reason: format!("{} requires an edition number", request.item),
        }),
        (true, Some(_)) if request.quantity != 1 => Err(MarketError::InvalidOrder {
            reason: "Unique editions trade one at a time".to_string(),
        }),
        (false, Some(_)) => Err(MarketError::InvalidOrder {
            reason: format!("{} has no unique editions", request.item),
        }),
        _ => Ok(()),
    }
}

/// Plan fills against the `resting` side without mutating anything.
fn plan_fills(
    book: Option<&OrderBook>,
    resting: OrderSide,
    request: &MarketOrder,
    capability: &ItemCapability,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<FillPlan> {
    let orders = book.map(|b| b.orders(resting)).unwrap_or_default();

    if let Some(edition) = request.edition.filter(|_| capability.unique_editions) {
        let (index, order) = orders
            .iter()
            .enumerate()
            .find(|(_, o)| {
                o.edition() == Some(edition) && o.is_live(now, ttl) && o.holder != request.holder
            })
            .ok_or(MarketError::EditionUnavailable(edition))?;
        return Ok(FillPlan {
            legs: vec![Leg { index, units: 1 }],
            total: order.unit_price,
        });
    }

    let mut legs = Vec::new();
    let mut gathered = 0u64;
    let mut total = Decimal::ZERO;
    let mut skipped_own = 0usize;
    for (index, order) in orders.iter().enumerate() {
        if gathered == request.quantity {
            break;
        }
        if !order.is_live(now, ttl) {
            continue;
        }
        if order.holder == request.holder {
            skipped_own += 1;
            continue;
        }
        let units = (request.quantity - gathered).min(order.remaining());
        gathered += units;
        total += order.cost_of(units);
        legs.push(Leg { index, units });
    }

    if skipped_own > 0 {
        warn!(
            holder = %request.holder,
            item = %request.item,
            skipped = skipped_own,
            "Self-trade prevented: skipped own resting orders"
        );
    }
    if gathered < request.quantity {
        return Err(MarketError::InsufficientLiquidity {
            wanted: request.quantity,
            available: gathered,
        });
    }
    Ok(FillPlan { legs, total })
}

// =================================================================
// Quote / commit
// =================================================================

/// Price a market operation against the current book. Read-only.
///
/// # Errors
/// Same liquidity and edition errors a real execution would return.
pub fn quote(
    doc: &MarketDocument,
    config: &MarketConfig,
    side: OrderSide,
    request: &MarketOrder,
    now: DateTime<Utc>,
) -> Result<Quote> {
    let capability = config.catalog.capability(&request.item)?;
    validate(request, &capability)?;
    if side == OrderSide::Buy {
        check_buy_quantity(config, request.quantity)?;
    }
    let plan = plan_fills(
        doc.book(&request.item),
        side.opposite(),
        request,
        &capability,
        now,
        config.order_ttl(),
    )?;
    debug!(
        holder = %request.holder,
        item = %request.item,
        %side,
        quantity = request.quantity,
        total = %plan.total,
        "Quoted market order"
    );
    Ok(Quote {
        id: QuoteId::new(),
        item: request.item.clone(),
        side,
        quantity: request.quantity,
        edition: request.edition,
        total: plan.total,
        quoted_at: now,
    })
}

/// Execute a quote, re-validating it against the current book. A buy
/// commits if the total has not risen, a sell if it has not fallen.
///
/// # Errors
/// `PriceChanged` when the book moved against the caller, plus every error
/// of [`market_buy`] / [`market_sell`].
pub fn commit_quote(
    doc: &mut MarketDocument,
    config: &MarketConfig,
    wallet: &Wallet,
    holder: &HolderId,
    quote: &Quote,
    now: DateTime<Utc>,
) -> Result<Execution<FillReport>> {
    let request = MarketOrder {
        holder: holder.clone(),
        item: quote.item.clone(),
        quantity: quote.quantity,
        edition: quote.edition,
    };
    debug!(%holder, quote = %quote.id, "Committing quote");
    match quote.side {
        OrderSide::Buy => market_buy(doc, config, wallet, &request, quote.total, now),
        OrderSide::Sell => market_sell(doc, config, wallet, &request, quote.total, now),
    }
}

// =================================================================
// Execution
// =================================================================

/// Buy `quantity` units immediately, paying at most `ceiling` in total.
///
/// # Errors
/// - `QuantityTooHigh` over the per-buy quantity limit
/// - `InsufficientLiquidity` / `EditionUnavailable` if the book cannot fill
/// - `PriceChanged` if the fill would cost more than `ceiling`
/// - `InsufficientFunds` if the buyer cannot pay the actual total
/// - `NoRoom` if the goods would exceed the buyer's inventory cap
pub fn market_buy(
    doc: &mut MarketDocument,
    config: &MarketConfig,
    wallet: &Wallet,
    request: &MarketOrder,
    ceiling: Decimal,
    now: DateTime<Utc>,
) -> Result<Execution<FillReport>> {
    let capability = config.catalog.capability(&request.item)?;
    validate(request, &capability)?;
    check_buy_quantity(config, request.quantity)?;
    let ttl = config.order_ttl();
    let plan = plan_fills(
        doc.book(&request.item),
        OrderSide::Sell,
        request,
        &capability,
        now,
        ttl,
    )?;

    if plan.total > ceiling {
        return Err(MarketError::PriceChanged {
            new_total: plan.total,
        });
    }
    if wallet.balance < plan.total {
        return Err(MarketError::InsufficientFunds {
            needed: plan.total,
            available: wallet.balance,
        });
    }
    capability.ensure_room(wallet.holding.quantity, request.quantity)?;

    // All checks passed: apply the fills.
    let book = doc.book_mut(&request.item);
    let mut received: Vec<EditionStamp> = Vec::new();
    let mut fully_matched = None;
    for leg in &plan.legs {
        let order = &mut book.orders_mut(OrderSide::Sell)[leg.index];
        order.filled_quantity += leg.units;
        if capability.unique_editions {
            received.extend(order.edition_stamps());
        } else if capability.carries_editions {
            received.extend(order.take_front_editions(as_len(leg.units)));
        }
        if order.is_filled() {
            fully_matched = Some(order.unit_price);
        }
        debug!(
            buyer = %request.holder,
            seller = %order.holder,
            units = leg.units,
            price = %order.unit_price,
            "Filled sell order"
        );
    }
    price_discovery::refresh_side(book, OrderSide::Sell, &capability, fully_matched, now, ttl);

    let editions: Vec<u64> = received.iter().map(|e| e.number).collect();
    info!(
        holder = %request.holder,
        item = %request.item,
        quantity = request.quantity,
        total = %plan.total,
        "Market buy filled"
    );

    let settlement = Settlement::new(request.holder.clone(), request.item.clone())
        .with_balance(-plan.total)
        .with_holding(HoldingAdjustment::gain(request.quantity, received));
    Ok(Execution::new(
        FillReport {
            item: request.item.clone(),
            side: OrderSide::Buy,
            filled_quantity: request.quantity,
            total: plan.total,
            editions,
        },
        vec![settlement],
    ))
}

/// Sell `quantity` units immediately, receiving at least `floor` in total.
///
/// # Errors
/// - `InsufficientHoldings` / `EditionNotHeld` if the seller lacks the goods
/// - `InsufficientLiquidity` / `EditionUnavailable` if the book cannot fill
/// - `PriceChanged` if the fill would pay less than `floor`
pub fn market_sell(
    doc: &mut MarketDocument,
    config: &MarketConfig,
    wallet: &Wallet,
    request: &MarketOrder,
    floor: Decimal,
    now: DateTime<Utc>,
) -> Result<Execution<FillReport>> {
    let capability = config.catalog.capability(&request.item)?;
    validate(request, &capability)?;
    if wallet.holding.quantity < request.quantity {
        return Err(MarketError::InsufficientHoldings {
            needed: request.quantity,
            held: wallet.holding.quantity,
        });
    }
    let mut offered: Vec<EditionStamp> = match request.edition {
        Some(edition) => vec![
            wallet
                .holding
                .edition(edition)
                .ok_or(MarketError::EditionNotHeld(edition))?,
        ],
        None if capability.carries_editions => {
            wallet.holding.newest_editions(as_len(request.quantity))
        }
        None => Vec::new(),
    };

    let ttl = config.order_ttl();
    let plan = plan_fills(
        doc.book(&request.item),
        OrderSide::Buy,
        request,
        &capability,
        now,
        ttl,
    )?;
    if plan.total < floor {
        return Err(MarketError::PriceChanged {
            new_total: plan.total,
        });
    }

    let editions: Vec<u64> = offered.iter().map(|e| e.number).collect();
    let book = doc.book_mut(&request.item);
    let mut fully_matched = None;
    for leg in &plan.legs {
        let order = &mut book.orders_mut(OrderSide::Buy)[leg.index];
        order.filled_quantity += leg.units;
        let take = as_len(leg.units).min(offered.len());
        let delivered: Vec<EditionStamp> = offered.drain(..take).collect();
        if capability.unique_editions {
            // The placeholder stamp is replaced by the seller's.
            order.editions.clear();
            order.edition_timestamps.clear();
        }
        order.push_editions(delivered);
        if order.is_filled() {
            fully_matched = Some(order.unit_price);
        }
        debug!(
            seller = %request.holder,
            buyer = %order.holder,
            units = leg.units,
            price = %order.unit_price,
            "Filled buy order"
        );
    }
    price_discovery::refresh_side(book, OrderSide::Buy, &capability, fully_matched, now, ttl);

    info!(
        holder = %request.holder,
        item = %request.item,
        quantity = request.quantity,
        total = %plan.total,
        "Market sell filled"
    );

    let settlement = Settlement::new(request.holder.clone(), request.item.clone())
        .with_balance(plan.total)
        .with_holding(HoldingAdjustment::lose(request.quantity, editions.clone()));
    Ok(Execution::new(
        FillReport {
            item: request.item.clone(),
            side: OrderSide::Sell,
            filled_quantity: request.quantity,
            total: plan.total,
            editions,
        },
        vec![settlement],
    ))
}

#[cfg(test)]
mod tests {
    use boarmarket_types::{Holding, ItemType, Order};

    use super::*;

    fn cfg() -> MarketConfig {
        MarketConfig::for_tests()
    }

    fn gift() -> ItemKey {
        ItemKey::new(ItemType::Powerup, "gift")
    }

    fn golden() -> ItemKey {
        ItemKey::new(ItemType::Collectible, "golden")
    }

    fn rich() -> Wallet {
        Wallet {
            balance: Decimal::new(1_000, 0),
            holding: Holding::default(),
            highest_edition: None,
        }
    }

    fn request(holder: &str, item: ItemKey, quantity: u64) -> MarketOrder {
        MarketOrder {
            holder: HolderId::new(holder),
            item,
            quantity,
            edition: None,
        }
    }

    fn seed_sells(doc: &mut MarketDocument, orders: &[(&str, u64, i64)]) {
        let book = doc.book_mut(&gift());
        for (holder, qty, price) in orders {
            book.insert(OrderSide::Sell, Order::dummy(holder, *qty, Decimal::new(*price, 0)));
        }
    }

    #[test]
    fn buy_walks_cheapest_first() {
        let mut doc = MarketDocument::new();
        seed_sells(&mut doc, &[("a", 5, 4), ("b", 10, 5)]);
        let exec = market_buy(
            &mut doc,
            &cfg(),
            &rich(),
            &request("buyer", gift(), 8),
            Decimal::new(35, 0),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(exec.outcome.total, Decimal::new(35, 0));
        assert_eq!(exec.settlements[0].balance_delta, Decimal::new(-35, 0));

        let book = doc.book(&gift()).unwrap();
        let sells = book.orders(OrderSide::Sell);
        assert_eq!(sells[0].filled_quantity, 5);
        assert_eq!(sells[1].filled_quantity, 3);
        let best = book.best_price(OrderSide::Sell);
        assert_eq!(best.current_best_price, Decimal::new(5, 0));
        assert_eq!(best.previous_best_price, Decimal::new(4, 0));
    }

    #[test]
    fn insufficient_liquidity_leaves_book_untouched() {
        let mut doc = MarketDocument::new();
        seed_sells(&mut doc, &[("a", 2, 4)]);
        let before = doc.clone();
        let err = market_buy(
            &mut doc,
            &cfg(),
            &rich(),
            &request("buyer", gift(), 3),
            Decimal::new(100, 0),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MarketError::InsufficientLiquidity {
                wanted: 3,
                available: 2
            }
        ));
        assert_eq!(doc, before);
    }

    #[test]
    fn stale_ceiling_is_price_changed() {
        let mut doc = MarketDocument::new();
        seed_sells(&mut doc, &[("a", 2, 6)]);
        let before = doc.clone();
        let err = market_buy(
            &mut doc,
            &cfg(),
            &rich(),
            &request("buyer", gift(), 2),
            Decimal::new(10, 0),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::PriceChanged { new_total } if new_total == Decimal::new(12, 0)));
        assert_eq!(doc, before);
    }

    #[test]
    fn buyer_must_afford_total() {
        let mut doc = MarketDocument::new();
        seed_sells(&mut doc, &[("a", 2, 6)]);
        let poor = Wallet {
            balance: Decimal::new(11, 0),
            holding: Holding::default(),
            highest_edition: None,
        };
        let err = market_buy(
            &mut doc,
            &cfg(),
            &poor,
            &request("buyer", gift(), 2),
            Decimal::new(12, 0),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientFunds { .. }));
    }

    #[test]
    fn own_orders_are_skipped() {
        let mut doc = MarketDocument::new();
        seed_sells(&mut doc, &[("buyer", 5, 1), ("a", 5, 2)]);
        let exec = market_buy(
            &mut doc,
            &cfg(),
            &rich(),
            &request("buyer", gift(), 5),
            Decimal::new(10, 0),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(exec.outcome.total, Decimal::new(10, 0));
        let sells = doc.book(&gift()).unwrap().orders(OrderSide::Sell);
        assert_eq!(sells[0].filled_quantity, 0);
    }

    #[test]
    fn expired_orders_are_invisible() {
        let mut doc = MarketDocument::new();
        seed_sells(&mut doc, &[("a", 5, 1)]);
        let later = Utc::now() + cfg().order_ttl() + Duration::seconds(1);
        let err = market_buy(
            &mut doc,
            &cfg(),
            &rich(),
            &request("buyer", gift(), 1),
            Decimal::new(10, 0),
            later,
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientLiquidity { available: 0, .. }));
    }

    #[test]
    fn unique_buy_needs_matching_edition() {
        let mut doc = MarketDocument::new();
        let now = Utc::now();
        doc.book_mut(&golden()).insert(
            OrderSide::Sell,
            Order::new(
                HolderId::new("seller"),
                1,
                Decimal::new(20, 0),
                vec![EditionStamp {
                    number: 7,
                    obtained_at: now,
                }],
                now,
            ),
        );
        let mut req = request("buyer", golden(), 1);
        req.edition = Some(9);
        let err = market_buy(&mut doc, &cfg(), &rich(), &req, Decimal::new(50, 0), now)
            .unwrap_err();
        assert!(matches!(err, MarketError::EditionUnavailable(9)));

        req.edition = Some(7);
        let exec = market_buy(&mut doc, &cfg(), &rich(), &req, Decimal::new(20, 0), now).unwrap();
        assert_eq!(exec.outcome.editions, vec![7]);
        let book = doc.book(&golden()).unwrap();
        assert_eq!(book.best_price(OrderSide::Sell).current_best_price, Decimal::ZERO);
        assert_eq!(book.best_price(OrderSide::Sell).previous_best_price, Decimal::new(20, 0));
    }

    #[test]
    fn oversized_market_buy_rejected() {
        let mut doc = MarketDocument::new();
        seed_sells(&mut doc, &[("a", 2_000, 1)]);
        let before = doc.clone();
        let err = market_buy(
            &mut doc,
            &cfg(),
            &rich(),
            &request("buyer", gift(), 1_001),
            Decimal::new(1_001, 0),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::QuantityTooHigh { quantity: 1_001, .. }));
        assert_eq!(doc, before);
    }

    #[test]
    fn sell_requires_holdings() {
        let mut doc = MarketDocument::new();
        let err = market_sell(
            &mut doc,
            &cfg(),
            &rich(),
            &request("seller", gift(), 1),
            Decimal::ZERO,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientHoldings { needed: 1, held: 0 }));
    }

    #[test]
    fn quote_then_commit() {
        let mut doc = MarketDocument::new();
        seed_sells(&mut doc, &[("a", 3, 2)]);
        let now = Utc::now();
        let req = request("buyer", gift(), 2);
        let quote = quote(&doc, &cfg(), OrderSide::Buy, &req, now).unwrap();
        assert_eq!(quote.total, Decimal::new(4, 0));
        assert_eq!(doc.book(&gift()).unwrap().orders(OrderSide::Sell)[0].filled_quantity, 0);

        let exec = commit_quote(&mut doc, &cfg(), &rich(), &req.holder, &quote, now).unwrap();
        assert_eq!(exec.outcome.total, quote.total);
    }
}
