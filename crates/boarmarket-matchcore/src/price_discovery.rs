//! Best-price tracking.
//!
//! After any structural change to one side of a book (insert, remove, fill)
//! the side's [`BestPrice`](crate::orderbook::BestPrice) is recomputed from
//! the sorted list. Expired and fully filled orders are invisible here, the
//! same as for matching.
//!
//! Unique-edition books never carry a current best: every edition is its own
//! sub-market. They only record the price of the last completed trade, which
//! anchors the limit price band.

use boarmarket_types::{HolderId, ItemCapability, Order, OrderSide};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::OrderBook;

/// First live order on `side`, or `None` for unique-edition books.
fn live_best<'a>(
    book: &'a OrderBook,
    side: OrderSide,
    capability: &ItemCapability,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Option<&'a Order> {
    if capability.unique_editions {
        return None;
    }
    book.orders(side).iter().find(|o| o.is_live(now, ttl))
}

/// Recompute one side's tracker.
///
/// `fully_matched` is the price of the last order on this side that a trade
/// filled completely, if any. Running this twice with the same arguments
/// leaves the tracker unchanged.
pub fn refresh_side(
    book: &mut OrderBook,
    side: OrderSide,
    capability: &ItemCapability,
    fully_matched: Option<Decimal>,
    now: DateTime<Utc>,
    ttl: Duration,
) {
    let best = live_best(book, side, capability, now, ttl).map(|o| (o.unit_price, o.holder.clone()));

    let tracker = book.best_price_mut(side);
    if let Some(price) = fully_matched {
        tracker.previous_best_price = price;
    }
    let (price, holder) = best.unwrap_or((Decimal::ZERO, HolderId::none()));
    tracker.current_best_price = price;
    tracker.current_best_holder = holder;
}

/// Recompute both sides without recording a trade.
pub fn refresh(
    book: &mut OrderBook,
    capability: &ItemCapability,
    now: DateTime<Utc>,
    ttl: Duration,
) {
    refresh_side(book, OrderSide::Buy, capability, None, now, ttl);
    refresh_side(book, OrderSide::Sell, capability, None, now, ttl);
}

/// Reference price bounding a new limit order on `side`, as seen at `now`.
///
/// Prefers the opposite side's best live price, then the opposite side's
/// last matched price, then this side's last matched price. The live best
/// is read from the orders rather than the stored tracker, which may still
/// point at an order that has since expired. `None` when the book has no
/// live price and no price history.
#[must_use]
pub fn reference_price(
    book: &OrderBook,
    side: OrderSide,
    capability: &ItemCapability,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Option<Decimal> {
    let opposite = book.best_price(side.opposite());
    let own = book.best_price(side);
    [
        live_best(book, side.opposite(), capability, now, ttl).map(|o| o.unit_price),
        Some(opposite.previous_best_price),
        Some(own.previous_best_price),
    ]
    .into_iter()
    .flatten()
    .find(|p| !p.is_zero())
}

#[cfg(test)]
mod tests {
    use boarmarket_types::{ItemKey, ItemType, Order};

    use super::*;

    const TTL_DAYS: i64 = 7;

    fn fungible() -> ItemCapability {
        ItemCapability::default()
    }

    fn unique() -> ItemCapability {
        ItemCapability {
            unique_editions: true,
            carries_editions: true,
            inventory_cap: None,
        }
    }

    fn book_with(prices: &[(&str, i64)]) -> OrderBook {
        let mut book = OrderBook::new(ItemKey::new(ItemType::Powerup, "gift"));
        for (holder, price) in prices {
            book.insert(OrderSide::Sell, Order::dummy(holder, 1, Decimal::new(*price, 0)));
        }
        book
    }

    #[test]
    fn best_is_first_live_entry() {
        let mut book = book_with(&[("a", 7), ("b", 5)]);
        refresh(&mut book, &fungible(), Utc::now(), Duration::days(TTL_DAYS));
        let best = book.best_price(OrderSide::Sell);
        assert_eq!(best.current_best_price, Decimal::new(5, 0));
        assert_eq!(best.current_best_holder.as_str(), "b");
    }

    #[test]
    fn expired_and_filled_entries_are_skipped() {
        let mut book = book_with(&[("a", 5), ("b", 6), ("c", 7)]);
        let now = Utc::now();
        book.orders_mut(OrderSide::Sell)[0].listed_at = now - Duration::days(TTL_DAYS + 1);
        book.orders_mut(OrderSide::Sell)[1].filled_quantity = 1;
        refresh(&mut book, &fungible(), now, Duration::days(TTL_DAYS));
        let best = book.best_price(OrderSide::Sell);
        assert_eq!(best.current_best_price, Decimal::new(7, 0));
        assert_eq!(best.current_best_holder.as_str(), "c");
    }

    #[test]
    fn empty_side_resets_to_zero() {
        let mut book = book_with(&[("a", 5)]);
        let now = Utc::now();
        refresh(&mut book, &fungible(), now, Duration::days(TTL_DAYS));
        book.remove(OrderSide::Sell, 0);
        refresh(&mut book, &fungible(), now, Duration::days(TTL_DAYS));
        let best = book.best_price(OrderSide::Sell);
        assert_eq!(best.current_best_price, Decimal::ZERO);
        assert!(best.current_best_holder.is_none());
    }

    #[test]
    fn refresh_is_idempotent() {
        let mut book = book_with(&[("a", 5), ("b", 9)]);
        let now = Utc::now();
        refresh_side(&mut book, OrderSide::Sell, &fungible(), Some(Decimal::new(4, 0)), now, Duration::days(TTL_DAYS));
        let once = book.clone();
        refresh_side(&mut book, OrderSide::Sell, &fungible(), Some(Decimal::new(4, 0)), now, Duration::days(TTL_DAYS));
        assert_eq!(book, once);
    }

    #[test]
    fn unique_books_only_track_previous() {
        let mut book = book_with(&[("a", 20)]);
        refresh_side(
            &mut book,
            OrderSide::Sell,
            &unique(),
            Some(Decimal::new(20, 0)),
            Utc::now(),
            Duration::days(TTL_DAYS),
        );
        let best = book.best_price(OrderSide::Sell);
        assert_eq!(best.current_best_price, Decimal::ZERO);
        assert_eq!(best.previous_best_price, Decimal::new(20, 0));
    }

    #[test]
    fn reference_prefers_opposite_side() {
        let mut book = book_with(&[("a", 8)]);
        let now = Utc::now();
        let ttl = Duration::days(TTL_DAYS);
        refresh(&mut book, &fungible(), now, ttl);
        assert_eq!(
            reference_price(&book, OrderSide::Buy, &fungible(), now, ttl),
            Some(Decimal::new(8, 0))
        );
        assert_eq!(reference_price(&book, OrderSide::Sell, &fungible(), now, ttl), None);

        book.best_price_mut(OrderSide::Sell).previous_best_price = Decimal::new(3, 0);
        assert_eq!(
            reference_price(&book, OrderSide::Sell, &fungible(), now, ttl),
            Some(Decimal::new(3, 0))
        );
    }

    #[test]
    fn reference_ignores_expired_best() {
        let mut book = book_with(&[("a", 100)]);
        let now = Utc::now();
        let ttl = Duration::days(TTL_DAYS);
        refresh(&mut book, &fungible(), now, ttl);
        assert_eq!(book.best_price(OrderSide::Sell).current_best_price, Decimal::new(100, 0));

        let later = now + ttl + Duration::seconds(1);
        assert_eq!(reference_price(&book, OrderSide::Buy, &fungible(), later, ttl), None);

        book.best_price_mut(OrderSide::Sell).previous_best_price = Decimal::new(40, 0);
        assert_eq!(
            reference_price(&book, OrderSide::Buy, &fungible(), later, ttl),
            Some(Decimal::new(40, 0))
        );
    }
}
