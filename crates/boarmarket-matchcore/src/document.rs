//! The persisted marketplace document: one order book per catalog item.

use std::collections::BTreeMap;

use boarmarket_types::{HolderId, ItemCatalog, ItemId, ItemKey, ItemType, OrderSide, OrderView};
use serde::{Deserialize, Serialize};

use crate::OrderBook;

/// All order books, grouped by item type then item id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketDocument {
    books: BTreeMap<ItemType, BTreeMap<ItemId, OrderBook>>,
}

impl MarketDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A document with an empty book for every catalog item.
    #[must_use]
    pub fn for_catalog(catalog: &ItemCatalog) -> Self {
        let mut doc = Self::new();
        for spec in catalog.iter() {
            doc.book_mut(&spec.key());
        }
        doc
    }

    #[must_use]
    pub fn book(&self, item: &ItemKey) -> Option<&OrderBook> {
        self.books.get(&item.item_type)?.get(&item.item_id)
    }

    /// The book for `item`, created empty on first use.
    pub fn book_mut(&mut self, item: &ItemKey) -> &mut OrderBook {
        self.books
            .entry(item.item_type)
            .or_default()
            .entry(item.item_id.clone())
            .or_insert_with(|| OrderBook::new(item.clone()))
    }

    /// Detach a book from the document.
    pub fn remove_book(&mut self, item: &ItemKey) -> Option<OrderBook> {
        let by_id = self.books.get_mut(&item.item_type)?;
        let book = by_id.remove(&item.item_id);
        if by_id.is_empty() {
            self.books.remove(&item.item_type);
        }
        book
    }

    pub fn books(&self) -> impl Iterator<Item = &OrderBook> {
        self.books.values().flat_map(BTreeMap::values)
    }

    /// Resting orders of `holder` across every book, including expired ones.
    #[must_use]
    pub fn resting_count(&self, holder: &HolderId) -> usize {
        self.books().map(|b| b.count_for(holder)).sum()
    }

    /// Every order `holder` has in the document.
    #[must_use]
    pub fn holder_orders(&self, holder: &HolderId) -> Vec<OrderView> {
        let mut views = Vec::new();
        for book in self.books() {
            for side in [OrderSide::Buy, OrderSide::Sell] {
                views.extend(
                    book.orders(side)
                        .iter()
                        .filter(|o| o.holder == *holder)
                        .map(|o| OrderView {
                            order_ref: book.order_ref(side, o),
                            order: o.clone(),
                        }),
                );
            }
        }
        views
    }
}

#[cfg(test)]
mod tests {
    use boarmarket_types::{MarketConfig, Order};
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn catalog_books_created_empty() {
        let cfg = MarketConfig::for_tests();
        let doc = MarketDocument::for_catalog(&cfg.catalog);
        assert_eq!(doc.books().count(), cfg.catalog.len());
        assert!(doc.books().all(OrderBook::is_empty));
    }

    #[test]
    fn holder_orders_span_books() {
        let mut doc = MarketDocument::new();
        let gift = ItemKey::new(ItemType::Powerup, "gift");
        let common = ItemKey::new(ItemType::Collectible, "common");
        doc.book_mut(&gift)
            .insert(OrderSide::Buy, Order::dummy("alice", 2, Decimal::ONE));
        doc.book_mut(&common)
            .insert(OrderSide::Sell, Order::dummy("alice", 1, Decimal::TEN));
        doc.book_mut(&common)
            .insert(OrderSide::Sell, Order::dummy("bob", 1, Decimal::TEN));

        let alice = HolderId::new("alice");
        assert_eq!(doc.resting_count(&alice), 2);
        let views = doc.holder_orders(&alice);
        assert_eq!(views.len(), 2);
        assert!(views.iter().any(|v| v.order_ref.item == gift));
        assert!(views.iter().any(|v| v.order_ref.side == OrderSide::Sell));
    }

    #[test]
    fn remove_book_detaches() {
        let mut doc = MarketDocument::new();
        let gift = ItemKey::new(ItemType::Powerup, "gift");
        doc.book_mut(&gift);
        assert!(doc.remove_book(&gift).is_some());
        assert!(doc.book(&gift).is_none());
        assert!(doc.remove_book(&gift).is_none());
    }

    #[test]
    fn document_serde_roundtrip() {
        let mut doc = MarketDocument::new();
        let gift = ItemKey::new(ItemType::Powerup, "gift");
        doc.book_mut(&gift)
            .insert(OrderSide::Sell, Order::dummy("bob", 3, Decimal::new(25, 1)));
        let json = serde_json::to_string(&doc).unwrap();
        let back: MarketDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
