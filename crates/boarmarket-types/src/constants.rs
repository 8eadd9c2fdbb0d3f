//! System-wide constants for the BoarMarket marketplace.

/// Default order time-to-live: 7 days in milliseconds.
pub const DEFAULT_ORDER_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Default multiplier bounding limit prices around the reference price
/// (e.g., 10 = a price may be at most 10x above or below it).
pub const DEFAULT_PRICE_RANGE: u64 = 10;

/// Default maximum resting orders per holder across all items.
pub const DEFAULT_MAX_ORDERS_PER_HOLDER: usize = 20;

/// Default maximum quantity of one buy order.
pub const DEFAULT_MAX_BUY_QUANTITY: u64 = 1000;

/// Default absolute ceiling on a sell unit price.
pub const DEFAULT_MAX_UNIT_PRICE: u64 = 100_000_000;

/// Name of the marketplace document; also the global queue key.
pub const MARKET_DOCUMENT: &str = "market";

/// Prefix of per-holder ledger queue keys.
pub const HOLDER_KEY_PREFIX: &str = "holder:";

/// Suffix of global (document-wide) queue keys.
pub const GLOBAL_KEY_SUFFIX: &str = ":global";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
