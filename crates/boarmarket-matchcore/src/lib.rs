//! # boarmarket-matchcore
//!
//! **Pure order-book engine for BoarMarket.**
//!
//! Every operation takes the market document by `&mut`, the caller's
//! [`Wallet`](boarmarket_types::Wallet) snapshot, and `now`, and returns an
//! [`Execution`]: a typed outcome plus the [`Settlement`](boarmarket_types::Settlement)s
//! the ledger must apply. It has:
//!
//! - **No I/O**: no storage, no ledger calls, no clock reads
//! - **Validate-then-mutate**: a rejected operation leaves the document untouched
//! - **Lazy expiry**: orders past their TTL are invisible but stay in place
//! - **Self-trade prevention**: market orders skip the caller's own orders

pub mod document;
pub mod lifecycle;
pub mod matcher;
pub mod orderbook;
pub mod placement;
pub mod price_discovery;

pub use document::MarketDocument;
pub use lifecycle::{cancel, claim, reprice, retire_item};
pub use matcher::{Execution, MarketOrder, commit_quote, market_buy, market_sell, quote};
pub use orderbook::{BestPrice, OrderBook};
pub use placement::{LimitOrder, check_price, place_limit_order};
