//! # boarmarket-engine
//!
//! **Async shell around the pure matchcore.**
//!
//! - [`SerializedTaskQueue`]: one FIFO lane per resource key; at most one
//!   unit of work runs per key at a time
//! - [`DocumentStore`]: whole-document persistence ([`MemoryStore`],
//!   [`JsonFileStore`])
//! - [`Ledger`]: the holders' currency and goods ([`InMemoryLedger`])
//! - [`Clock`]: injected time ([`SystemClock`], [`ManualClock`])
//! - [`MarketEngine`]: runs every marketplace operation under the global
//!   document key and the caller's holder key
//!
//! ## Order Flow
//!
//! ```text
//! caller -> MarketEngine -> queue(global) -> queue(holder)
//!        -> DocumentStore.load -> matchcore op -> DocumentStore.save
//!        -> Ledger.apply(settlements)
//! ```

pub mod clock;
pub mod engine;
pub mod ledger;
pub mod store;
pub mod task_queue;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::MarketEngine;
pub use ledger::{InMemoryLedger, Ledger};
pub use store::{DocumentStore, JsonFileStore, MemoryStore};
pub use task_queue::{QueueTicket, SerializedTaskQueue, global_key, holder_key};
