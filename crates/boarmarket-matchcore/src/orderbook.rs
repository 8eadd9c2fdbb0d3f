//! The order book for a single item.
//!
//! Each side is a plain `Vec<Order>` kept sorted best-first:
//! - **Buys**: highest unit price first
//! - **Sells**: lowest unit price first
//!
//! Sorting is stable, so orders at the same price keep arrival order (time
//! priority). The vectors are persisted as-is inside the market document.

use boarmarket_types::{HolderId, ItemKey, MarketError, Order, OrderRef, OrderSide, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best-price tracker for one side of a book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPrice {
    /// Price of the best live order, or zero when the side is empty.
    pub current_best_price: Decimal,
    /// Price last fully matched on this side.
    pub previous_best_price: Decimal,
    /// Holder of the best live order, or empty.
    pub current_best_holder: HolderId,
}

/// The order book for a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    pub item: ItemKey,
    #[serde(default)]
    buy_orders: Vec<Order>,
    #[serde(default)]
    sell_orders: Vec<Order>,
    #[serde(default)]
    last_buy: BestPrice,
    #[serde(default)]
    last_sell: BestPrice,
}

impl OrderBook {
    /// Create a new empty order book for the given item.
    #[must_use]
    pub fn new(item: ItemKey) -> Self {
        Self {
            item,
            buy_orders: Vec::new(),
            sell_orders: Vec::new(),
            last_buy: BestPrice::default(),
            last_sell: BestPrice::default(),
        }
    }

    // =================================================================
    // Access
    // =================================================================

    /// Orders on one side, best first.
    #[must_use]
    pub fn orders(&self, side: OrderSide) -> &[Order] {
        match side {
            OrderSide::Buy => &self.buy_orders,
            OrderSide::Sell => &self.sell_orders,
        }
    }

    pub(crate) fn orders_mut(&mut self, side: OrderSide) -> &mut Vec<Order> {
        match side {
            OrderSide::Buy => &mut self.buy_orders,
            OrderSide::Sell => &mut self.sell_orders,
        }
    }

    #[must_use]
    pub fn best_price(&self, side: OrderSide) -> &BestPrice {
        match side {
            OrderSide::Buy => &self.last_buy,
            OrderSide::Sell => &self.last_sell,
        }
    }

    pub(crate) fn best_price_mut(&mut self, side: OrderSide) -> &mut BestPrice {
        match side {
            OrderSide::Buy => &mut self.last_buy,
            OrderSide::Sell => &mut self.last_sell,
        }
    }

    // =================================================================
    // Insertion / removal
    // =================================================================

    /// Insert an order at its sorted position (behind equal prices).
    pub fn insert(&mut self, side: OrderSide, order: Order) {
        self.orders_mut(side).push(order);
        self.resort(side);
    }

    /// Restore best-first order after a price change. Stable.
    pub fn resort(&mut self, side: OrderSide) {
        let orders = self.orders_mut(side);
        match side {
            OrderSide::Buy => orders.sort_by(|a, b| b.unit_price.cmp(&a.unit_price)),
            OrderSide::Sell => orders.sort_by(|a, b| a.unit_price.cmp(&b.unit_price)),
        }
    }

    /// Index of the order identified by `(holder, listed_at)`.
    #[must_use]
    pub fn position(
        &self,
        side: OrderSide,
        holder: &HolderId,
        listed_at: DateTime<Utc>,
    ) -> Option<usize> {
        self.orders(side)
            .iter()
            .position(|o| o.is_identified_by(holder, listed_at))
    }

    /// Locate a referenced order.
    ///
    /// # Errors
    /// Returns `OrderNotFound` if no such order rests in this book.
    pub fn locate(&self, order_ref: &OrderRef) -> Result<usize> {
        self.position(order_ref.side, &order_ref.holder, order_ref.listed_at)
            .ok_or_else(|| MarketError::OrderNotFound {
                holder: order_ref.holder.clone(),
                item: self.item.clone(),
            })
    }

    /// Remove and return the order at `index`.
    pub fn remove(&mut self, side: OrderSide, index: usize) -> Order {
        self.orders_mut(side).remove(index)
    }

    /// A `listed_at` for a new order that does not collide with another
    /// order of the same holder on the same side.
    #[must_use]
    pub fn fresh_listing_time(
        &self,
        side: OrderSide,
        holder: &HolderId,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let mut stamp = now;
        while self.position(side, holder, stamp).is_some() {
            stamp += Duration::milliseconds(1);
        }
        stamp
    }

    /// Reference for an order resting on `side` at `listed_at`.
    #[must_use]
    pub fn order_ref(&self, side: OrderSide, order: &Order) -> OrderRef {
        OrderRef {
            item: self.item.clone(),
            side,
            holder: order.holder.clone(),
            listed_at: order.listed_at,
        }
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Number of orders a holder has resting in this book (both sides).
    #[must_use]
    pub fn count_for(&self, holder: &HolderId) -> usize {
        self.buy_orders
            .iter()
            .chain(&self.sell_orders)
            .filter(|o| o.holder == *holder)
            .count()
    }

    /// Total number of orders currently in the book.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.buy_orders.len() + self.sell_orders.len()
    }

    /// Returns `true` if the book has no orders on either side.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buy_orders.is_empty() && self.sell_orders.is_empty()
    }

    /// Drain all orders (used when retiring an item).
    pub fn drain_all(&mut self) -> Vec<(OrderSide, Order)> {
        let buys = self.buy_orders.drain(..).map(|o| (OrderSide::Buy, o));
        let sells = self.sell_orders.drain(..).map(|o| (OrderSide::Sell, o));
        buys.chain(sells).collect()
    }
}

#[cfg(test)]
mod tests {
    use boarmarket_types::ItemType;

    use super::*;

    fn book() -> OrderBook {
        OrderBook::new(ItemKey::new(ItemType::Powerup, "gift"))
    }

    fn order(holder: &str, price: i64) -> Order {
        Order::dummy(holder, 1, Decimal::new(price, 0))
    }

    #[test]
    fn buys_sort_highest_first() {
        let mut book = book();
        book.insert(OrderSide::Buy, order("a", 90));
        book.insert(OrderSide::Buy, order("b", 100));
        book.insert(OrderSide::Buy, order("c", 95));
        let prices: Vec<Decimal> = book
            .orders(OrderSide::Buy)
            .iter()
            .map(|o| o.unit_price)
            .collect();
        assert_eq!(
            prices,
            vec![Decimal::new(100, 0), Decimal::new(95, 0), Decimal::new(90, 0)]
        );
    }

    #[test]
    fn sells_sort_lowest_first_with_time_priority() {
        let mut book = book();
        book.insert(OrderSide::Sell, order("a", 10));
        book.insert(OrderSide::Sell, order("b", 5));
        book.insert(OrderSide::Sell, order("c", 10));
        let holders: Vec<&str> = book
            .orders(OrderSide::Sell)
            .iter()
            .map(|o| o.holder.as_str())
            .collect();
        assert_eq!(holders, vec!["b", "a", "c"]);
    }

    #[test]
    fn locate_and_remove() {
        let mut book = book();
        let o = order("a", 10);
        let listed_at = o.listed_at;
        book.insert(OrderSide::Sell, o.clone());
        let order_ref = book.order_ref(OrderSide::Sell, &o);
        let idx = book.locate(&order_ref).unwrap();
        let removed = book.remove(OrderSide::Sell, idx);
        assert_eq!(removed.listed_at, listed_at);
        assert!(book.is_empty());
        assert!(matches!(
            book.locate(&order_ref),
            Err(MarketError::OrderNotFound { .. })
        ));
    }

    #[test]
    fn fresh_listing_time_avoids_collisions() {
        let mut book = book();
        let o = order("a", 10);
        let now = o.listed_at;
        book.insert(OrderSide::Buy, o);
        let next = book.fresh_listing_time(OrderSide::Buy, &HolderId::new("a"), now);
        assert_eq!(next, now + Duration::milliseconds(1));
        let other = book.fresh_listing_time(OrderSide::Buy, &HolderId::new("b"), now);
        assert_eq!(other, now);
    }

    #[test]
    fn count_for_spans_both_sides() {
        let mut book = book();
        book.insert(OrderSide::Buy, order("a", 10));
        book.insert(OrderSide::Sell, order("a", 12));
        book.insert(OrderSide::Sell, order("b", 12));
        assert_eq!(book.count_for(&HolderId::new("a")), 2);
        assert_eq!(book.order_count(), 3);
        assert_eq!(book.drain_all().len(), 3);
        assert!(book.is_empty());
    }

    #[test]
    fn empty_book_trackers_are_zero() {
        let book = book();
        assert_eq!(book.best_price(OrderSide::Buy).current_best_price, Decimal::ZERO);
        assert!(book.best_price(OrderSide::Sell).current_best_holder.is_none());
    }
}
