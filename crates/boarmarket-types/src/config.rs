//! Marketplace configuration.

use std::path::Path;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{constants, ItemCatalog, MarketError, Result};

/// Tunables and the item catalog for one marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Resting orders become invisible this long after `listed_at`.
    #[serde(default = "default_order_ttl_ms")]
    pub order_ttl_ms: i64,
    /// RANGE multiplier of the limit price band.
    #[serde(default = "default_price_range")]
    pub price_range: Decimal,
    /// Maximum resting orders per holder across the whole document.
    #[serde(default = "default_max_orders")]
    pub max_orders_per_holder: usize,
    /// Absolute ceiling on the unit price of sell orders.
    #[serde(default = "default_max_unit_price")]
    pub max_unit_price: Decimal,
    /// Largest quantity a single buy may ask for.
    #[serde(default = "default_max_buy_quantity")]
    pub max_buy_quantity: u64,
    /// Tradeable items and their capabilities.
    #[serde(default)]
    pub catalog: ItemCatalog,
}

fn default_order_ttl_ms() -> i64 {
    constants::DEFAULT_ORDER_TTL_MS
}

fn default_price_range() -> Decimal {
    Decimal::from(constants::DEFAULT_PRICE_RANGE)
}

fn default_max_orders() -> usize {
    constants::DEFAULT_MAX_ORDERS_PER_HOLDER
}

fn default_max_unit_price() -> Decimal {
    Decimal::from(constants::DEFAULT_MAX_UNIT_PRICE)
}

fn default_max_buy_quantity() -> u64 {
    constants::DEFAULT_MAX_BUY_QUANTITY
}

impl MarketConfig {
    /// Default tunables around the given catalog.
    #[must_use]
    pub fn with_catalog(catalog: ItemCatalog) -> Self {
        Self {
            order_ttl_ms: default_order_ttl_ms(),
            price_range: default_price_range(),
            max_orders_per_holder: default_max_orders(),
            max_unit_price: default_max_unit_price(),
            max_buy_quantity: default_max_buy_quantity(),
            catalog,
        }
    }

    #[must_use]
    pub fn order_ttl(&self) -> Duration {
        Duration::milliseconds(self.order_ttl_ms)
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MarketError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MarketError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Reject configs the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.order_ttl_ms <= 0 {
            return Err(MarketError::Configuration(
                "order_ttl_ms must be positive".to_string(),
            ));
        }
        if self.price_range < Decimal::ONE {
            return Err(MarketError::Configuration(format!(
                "price_range must be >= 1, got {}",
                self.price_range
            )));
        }
        if self.max_orders_per_holder == 0 {
            return Err(MarketError::Configuration(
                "max_orders_per_holder must be > 0".to_string(),
            ));
        }
        if self.max_buy_quantity == 0 {
            return Err(MarketError::Configuration(
                "max_buy_quantity must be > 0".to_string(),
            ));
        }
        if self.max_unit_price <= Decimal::ZERO {
            return Err(MarketError::Configuration(
                "max_unit_price must be positive".to_string(),
            ));
        }
        for spec in self.catalog.iter() {
            if spec.unique_editions && spec.inventory_cap.is_some() {
                return Err(MarketError::Configuration(format!(
                    "{} cannot be both unique-edition and capped",
                    spec.key()
                )));
            }
        }
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl MarketConfig {
    /// A catalog with one item of every flavour:
    /// - `powerup/enhancer`: plain goods capped at 25
    /// - `powerup/gift`: plain goods, uncapped
    /// - `collectible/common`: fungible goods carrying edition numbers
    /// - `collectible/golden`: unique editions
    pub fn for_tests() -> Self {
        use crate::{ItemId, ItemSpec, ItemType};

        let spec = |item_type, id: &str, unique, editions, cap| ItemSpec {
            item_type,
            item_id: ItemId::new(id),
            unique_editions: unique,
            carries_editions: editions,
            inventory_cap: cap,
        };
        Self::with_catalog(ItemCatalog::new(vec![
            spec(ItemType::Powerup, "enhancer", false, false, Some(25)),
            spec(ItemType::Powerup, "gift", false, false, None),
            spec(ItemType::Collectible, "common", false, true, None),
            spec(ItemType::Collectible, "golden", true, true, None),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ItemKey, ItemType};

    #[test]
    fn defaults_validate() {
        let cfg = MarketConfig::for_tests();
        cfg.validate().unwrap();
        assert_eq!(cfg.price_range, Decimal::from(10));
        assert_eq!(cfg.order_ttl(), Duration::days(7));
    }

    #[test]
    fn json_fills_defaults() {
        let cfg = MarketConfig::from_json_str(
            r#"{
                "catalog": [
                    {"item_type": "powerup", "item_id": "enhancer", "inventory_cap": 3}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.max_orders_per_holder, constants::DEFAULT_MAX_ORDERS_PER_HOLDER);
        assert_eq!(cfg.max_buy_quantity, 1000);
        let cap = cfg
            .catalog
            .capability(&ItemKey::new(ItemType::Powerup, "enhancer"))
            .unwrap();
        assert_eq!(cap.inventory_cap, Some(3));
        assert!(!cap.unique_editions);
    }

    #[test]
    fn bad_range_rejected() {
        let err = MarketConfig::from_json_str(r#"{"price_range": "0.5"}"#).unwrap_err();
        assert!(matches!(err, MarketError::Configuration(_)));
    }

    #[test]
    fn malformed_json_is_configuration_error() {
        let err = MarketConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, MarketError::Configuration(_)));
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = MarketConfig::for_tests();
        let json = serde_json::to_string(&cfg).unwrap();
        let back = MarketConfig::from_json_str(&json).unwrap();
        assert_eq!(back.catalog.len(), cfg.catalog.len());
        assert_eq!(back.max_unit_price, cfg.max_unit_price);
    }
}
