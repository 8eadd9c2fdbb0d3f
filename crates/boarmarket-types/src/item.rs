//! Item types and the capability catalog.
//!
//! Type-specific behavior (unique editions, inventory caps) is resolved by
//! looking up an [`ItemSpec`] in the [`ItemCatalog`], so matching code never
//! branches on item type names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ItemId, MarketError, Result};

/// The closed set of tradeable item families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// Numbered collectibles (may carry edition numbers).
    Collectible,
    /// Consumable powerups (plain fungible counts, often capped).
    Powerup,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collectible => write!(f, "collectible"),
            Self::Powerup => write!(f, "powerup"),
        }
    }
}

/// Fully qualified item reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ItemKey {
    pub item_type: ItemType,
    pub item_id: ItemId,
}

impl ItemKey {
    #[must_use]
    pub fn new(item_type: ItemType, item_id: impl Into<String>) -> Self {
        Self {
            item_type,
            item_id: ItemId::new(item_id),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.item_type, self.item_id)
    }
}

/// Static description of one catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub item_type: ItemType,
    pub item_id: ItemId,
    /// Every unit is a distinct edition; orders are for exactly one edition.
    #[serde(default)]
    pub unique_editions: bool,
    /// Units are fungible but carry edition numbers that travel with them.
    #[serde(default)]
    pub carries_editions: bool,
    /// Maximum units a holder may own at once.
    #[serde(default)]
    pub inventory_cap: Option<u64>,
}

impl ItemSpec {
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey {
            item_type: self.item_type,
            item_id: self.item_id.clone(),
        }
    }

    #[must_use]
    pub fn capability(&self) -> ItemCapability {
        ItemCapability {
            unique_editions: self.unique_editions,
            carries_editions: self.carries_editions || self.unique_editions,
            inventory_cap: self.inventory_cap,
        }
    }
}

/// Behavior flags consulted by the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemCapability {
    pub unique_editions: bool,
    pub carries_editions: bool,
    pub inventory_cap: Option<u64>,
}

impl ItemCapability {
    /// Room left under the cap for a holder currently owning `held` units.
    #[must_use]
    pub fn room(&self, held: u64) -> Option<u64> {
        self.inventory_cap.map(|cap| cap.saturating_sub(held))
    }

    /// Checks that `incoming` units fit under the cap.
    pub fn ensure_room(&self, held: u64, incoming: u64) -> Result<()> {
        match self.inventory_cap {
            Some(cap) if held.saturating_add(incoming) > cap => Err(MarketError::NoRoom {
                cap,
                held,
                incoming,
            }),
            _ => Ok(()),
        }
    }
}

/// The set of tradeable items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemCatalog {
    items: Vec<ItemSpec>,
}

impl ItemCatalog {
    #[must_use]
    pub fn new(items: Vec<ItemSpec>) -> Self {
        Self { items }
    }

    /// Look up an item's spec.
    ///
    /// # Errors
    /// Returns `UnknownItem` if the item is not listed.
    pub fn spec(&self, item: &ItemKey) -> Result<&ItemSpec> {
        self.items
            .iter()
            .find(|s| s.item_type == item.item_type && s.item_id == item.item_id)
            .ok_or_else(|| MarketError::UnknownItem(item.clone()))
    }

    pub fn capability(&self, item: &ItemKey) -> Result<ItemCapability> {
        self.spec(item).map(ItemSpec::capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemSpec> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ItemCatalog {
        ItemCatalog::new(vec![
            ItemSpec {
                item_type: ItemType::Powerup,
                item_id: ItemId::new("enhancer"),
                unique_editions: false,
                carries_editions: false,
                inventory_cap: Some(5),
            },
            ItemSpec {
                item_type: ItemType::Collectible,
                item_id: ItemId::new("golden"),
                unique_editions: true,
                carries_editions: false,
                inventory_cap: None,
            },
        ])
    }

    #[test]
    fn unique_implies_editions() {
        let cap = catalog()
            .capability(&ItemKey::new(ItemType::Collectible, "golden"))
            .unwrap();
        assert!(cap.unique_editions);
        assert!(cap.carries_editions);
    }

    #[test]
    fn unknown_item_rejected() {
        let err = catalog()
            .capability(&ItemKey::new(ItemType::Collectible, "nope"))
            .unwrap_err();
        assert!(matches!(err, MarketError::UnknownItem(_)));
    }

    #[test]
    fn cap_room() {
        let cap = catalog()
            .capability(&ItemKey::new(ItemType::Powerup, "enhancer"))
            .unwrap();
        assert_eq!(cap.room(3), Some(2));
        assert_eq!(cap.room(9), Some(0));
        assert!(cap.ensure_room(3, 2).is_ok());
        assert!(matches!(
            cap.ensure_room(3, 3),
            Err(MarketError::NoRoom { cap: 5, held: 3, incoming: 3 })
        ));
    }

    #[test]
    fn huge_incoming_does_not_overflow() {
        let cap = catalog()
            .capability(&ItemKey::new(ItemType::Powerup, "enhancer"))
            .unwrap();
        assert!(matches!(
            cap.ensure_room(u64::MAX, u64::MAX),
            Err(MarketError::NoRoom { .. })
        ));
        let uncapped = ItemCapability::default();
        assert!(uncapped.ensure_room(u64::MAX, 1).is_ok());
    }

    #[test]
    fn item_type_serializes_lowercase() {
        let json = serde_json::to_string(&ItemType::Powerup).unwrap();
        assert_eq!(json, "\"powerup\"");
    }
}
