//! # boarmarket-types
//!
//! Shared types, errors, and configuration for the **BoarMarket** marketplace.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`HolderId`], [`ItemId`], [`QuoteId`]
//! - **Items**: [`ItemType`], [`ItemKey`], [`ItemSpec`], [`ItemCatalog`], [`ItemCapability`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderRef`], [`OrderView`]
//! - **Ledger values**: [`Holding`], [`EditionStamp`], [`HoldingAdjustment`], [`Settlement`], [`Wallet`]
//! - **Outcomes**: [`FillReport`], [`ClaimReport`], [`CancelReport`], [`RepriceReport`], [`Quote`]
//! - **Configuration**: [`MarketConfig`]
//! - **Errors**: [`MarketError`] with `MK_ERR_` prefix codes
//! - **Constants**: defaults and queue key names

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod item;
pub mod ledger;
pub mod order;
pub mod outcome;

pub use config::*;
pub use error::*;
pub use ids::*;
pub use item::*;
pub use ledger::*;
pub use order::*;
pub use outcome::*;

// Constants are accessed via `boarmarket_types::constants::FOO`
// (not re-exported to avoid name collisions).
