//! Limit order placement: the hard gate every resting order passes.
//!
//! Checks run in a fixed order and the document is untouched until the last
//! one passes:
//!
//! 1. Quantity is positive, and for buys no more than the buy limit
//! 2. Edition shape matches the item (unique items: one unit, one edition)
//! 3. Unit price is positive, under the ceiling for sells, and inside the
//!    band around the book's live reference price
//! 4. The holder is below the resting-order limit
//! 5. A unique-edition bid names a minted edition the bidder neither holds
//!    nor is selling
//! 6. The holder can cover the offer (currency for buys, goods for sells)

use boarmarket_types::{
    EditionStamp, HolderId, HoldingAdjustment, ItemCapability, ItemKey, MarketConfig, MarketError,
    Order, OrderRef, OrderSide, Result, Settlement, Wallet,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::{Execution, MarketDocument, OrderBook, matcher::as_len, price_discovery};

/// A resting order to be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOrder {
    pub holder: HolderId,
    pub item: ItemKey,
    pub side: OrderSide,
    pub quantity: u64,
    pub unit_price: Decimal,
    /// Edition offered or wanted; unique-edition items only.
    pub edition: Option<u64>,
}

/// Validate a unit price for an order resting on `side` of `book` at `now`.
///
/// Buys are bounded only by the band and the buyer's funds.
///
/// # Errors
/// `InvalidOrder` for non-positive prices, `PriceTooHigh` for a sell over
/// the absolute ceiling, `PriceOutOfRange` outside
/// `[reference / RANGE, reference * RANGE]`.
pub fn check_price(
    config: &MarketConfig,
    capability: &ItemCapability,
    book: Option<&OrderBook>,
    side: OrderSide,
    price: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(MarketError::InvalidOrder {
            reason: "Price must be positive".to_string(),
        });
    }
    if side == OrderSide::Sell && price > config.max_unit_price {
        return Err(MarketError::PriceTooHigh {
            price,
            max: config.max_unit_price,
        });
    }
    let reference = book.and_then(|b| {
        price_discovery::reference_price(b, side, capability, now, config.order_ttl())
    });
    if let Some(reference) = reference {
        let min = reference / config.price_range;
        let max = reference * config.price_range;
        if price < min || price > max {
            return Err(MarketError::PriceOutOfRange { price, min, max });
        }
    }
    Ok(())
}

/// Largest quantity a single buy may ask for.
pub(crate) fn check_buy_quantity(config: &MarketConfig, quantity: u64) -> Result<()> {
    if quantity > config.max_buy_quantity {
        return Err(MarketError::QuantityTooHigh {
            quantity,
            max: config.max_buy_quantity,
        });
    }
    Ok(())
}

fn check_shape(
    config: &MarketConfig,
    request: &LimitOrder,
    capability: &ItemCapability,
) -> Result<()> {
    if request.quantity == 0 {
        return Err(MarketError::InvalidOrder {
            reason: "Quantity must be positive".to_string(),
        });
    }
    if request.side == OrderSide::Buy {
        check_buy_quantity(config, request.quantity)?;
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

/// A bid for a unique edition must name one that exists and that the bidder
/// neither holds nor has on offer, or it could never fill.
fn check_edition_bid(doc: &MarketDocument, request: &LimitOrder, wallet: &Wallet) -> Result<()> {
    let (OrderSide::Buy, Some(edition)) = (request.side, request.edition) else {
        return Ok(());
    };
    if let Some(highest) = wallet.highest_edition.filter(|highest| edition > *highest) {
        return Err(MarketError::EditionNotMinted { edition, highest });
    }
    let selling = doc.book(&request.item).is_some_and(|book| {
        book.orders(OrderSide::Sell)
            .iter()
            .any(|o| o.holder == request.holder && o.edition() == Some(edition))
    });
    if selling || wallet.holding.holds_edition(edition) {
        return Err(MarketError::EditionAlreadyOwned(edition));
    }
    Ok(())
}

/// Resources withheld from the holder while the order rests.
fn withhold(
    request: &LimitOrder,
    capability: &ItemCapability,
    wallet: &Wallet,
    listed_at: DateTime<Utc>,
) -> Result<(Vec<EditionStamp>, Settlement)> {
    let settlement = Settlement::new(request.holder.clone(), request.item.clone());
    match request.side {
        OrderSide::Buy => {
            let cost = request.unit_price * Decimal::from(request.quantity);
            if wallet.balance < cost {
                return Err(MarketError::InsufficientFunds {
                    needed: cost,
                    available: wallet.balance,
                });
            }
            // A unique bid names its edition up front; the stamp is
            // replaced by the seller's when it fills.
            let wanted = request
                .edition
                .map(|number| EditionStamp {
                    number,
                    obtained_at: listed_at,
                })
                .into_iter()
                .collect();
            Ok((wanted, settlement.with_balance(-cost)))
        }
        OrderSide::Sell => {
            if wallet.holding.quantity < request.quantity {
                return Err(MarketError::InsufficientHoldings {
                    needed: request.quantity,
                    held: wallet.holding.quantity,
                });
            }
            let offered = match request.edition {
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
            let numbers = offered.iter().map(|e| e.number).collect();
            Ok((
                offered,
                settlement.with_holding(HoldingAdjustment::lose(request.quantity, numbers)),
            ))
        }
    }
}

/// Place a resting limit order.
///
/// # Errors
/// Any check failure listed in the module docs; the document is unchanged.
pub fn place_limit_order(
    doc: &mut MarketDocument,
    config: &MarketConfig,
    wallet: &Wallet,
    request: &LimitOrder,
    now: DateTime<Utc>,
) -> Result<Execution<OrderRef>> {
    let capability = config.catalog.capability(&request.item)?;
    check_shape(config, request, &capability)?;
    check_price(
        config,
        &capability,
        doc.book(&request.item),
        request.side,
        request.unit_price,
        now,
    )?;

    let resting = doc.resting_count(&request.holder);
    if resting >= config.max_orders_per_holder {
        return Err(MarketError::MaxOrdersReached {
            max: config.max_orders_per_holder,
        });
    }
    check_edition_bid(doc, request, wallet)?;

    let listed_at = doc
        .book(&request.item)
        .map_or(now, |b| b.fresh_listing_time(request.side, &request.holder, now));
    let (editions, settlement) = withhold(request, &capability, wallet, listed_at)?;

    let order = Order::new(
        request.holder.clone(),
        request.quantity,
        request.unit_price,
        editions,
        listed_at,
    );
    let book = doc.book_mut(&request.item);
    let order_ref = book.order_ref(request.side, &order);
    book.insert(request.side, order);
    price_discovery::refresh(book, &capability, now, config.order_ttl());

    info!(
        holder = %request.holder,
        item = %request.item,
        side = %request.side,
        quantity = request.quantity,
        price = %request.unit_price,
        "Limit order placed"
    );
    Ok(Execution::new(order_ref, vec![settlement]))
}
