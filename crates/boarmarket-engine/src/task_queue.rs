//! Per-key serialized execution.
//!
//! Each key owns a lane: an `Arc<tokio::sync::Mutex<()>>`. Tokio's mutex
//! hands the lock out in the order `lock` was called, so work acquired under
//! one key runs strictly FIFO and one at a time, while work under different
//! keys runs concurrently.
//!
//! The lock is held by a [`QueueTicket`]. Dropping the ticket releases the
//! lane whether the unit of work succeeded, failed, or panicked, so a failed
//! unit never stalls the units queued behind it. Idle lanes are pruned when
//! their last ticket drops.
//!
//! ## Nesting
//!
//! Callers that need both the document and a holder's ledger take the
//! global key first, then the holder key(s) in sorted order.

use std::{
    future::Future,
    sync::Arc,
    time::Instant,
};

use boarmarket_types::{HolderId, constants};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

/// Holds above this many milliseconds are logged at `debug`.
const SLOW_HOLD_MS: u128 = 250;

type Lanes = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Queue key serializing every mutation of the named document.
#[must_use]
pub fn global_key(document: &str) -> String {
    format!("{document}{}", constants::GLOBAL_KEY_SUFFIX)
}

/// Queue key serializing one holder's ledger.
#[must_use]
pub fn holder_key(holder: &HolderId) -> String {
    format!("{}{holder}", constants::HOLDER_KEY_PREFIX)
}

/// Exclusive hold on one lane. Released on drop.
pub struct QueueTicket {
    key: String,
    lanes: Lanes,
    acquired_at: Instant,
    guard: Option<OwnedMutexGuard<()>>,
}

impl QueueTicket {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        let hold_ms = self.acquired_at.elapsed().as_millis();
        drop(self.guard.take());
        if hold_ms >= SLOW_HOLD_MS {
            debug!(key = %self.key, hold_ms, "Slow queued unit");
        }
        // Only the map itself still references an idle lane.
        self.lanes
            .remove_if(&self.key, |_, lane| Arc::strong_count(lane) == 1);
    }
}

/// FIFO lanes keyed by resource name.
#[derive(Default, Clone)]
pub struct SerializedTaskQueue {
    lanes: Lanes,
}

impl SerializedTaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for every earlier holder of `key` to finish, then take the lane.
    pub async fn acquire(&self, key: &str) -> QueueTicket {
        let lane = self.lanes.entry(key.to_string()).or_default().clone();
        let wait_started = Instant::now();
        let guard = lane.lock_owned().await;
        trace!(
            key,
            wait_ms = wait_started.elapsed().as_millis(),
            "Queue lane acquired"
        );
        QueueTicket {
            key: key.to_string(),
            lanes: Arc::clone(&self.lanes),
            acquired_at: Instant::now(),
            guard: Some(guard),
        }
    }

    /// Acquire several lanes in sorted order (duplicates collapsed).
    pub async fn acquire_many<I, K>(&self, keys: I) -> Vec<QueueTicket>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort_unstable();
        keys.dedup();
        let mut tickets = Vec::with_capacity(keys.len());
        for key in keys {
            tickets.push(self.acquire(&key).await);
        }
        tickets
    }

    /// Run `work` once all work enqueued earlier under `key` has completed.
    pub async fn enqueue<F, T>(&self, key: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _ticket = self.acquire(key).await;
        work.await
    }

    /// Lanes currently held or waited on.
    #[must_use]
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }
}
