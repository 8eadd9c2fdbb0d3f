//! The market engine: runs matchcore operations inside queue-protected
//! sections against a document store and a ledger.
//!
//! ## Unit of work
//!
//! ```text
//! acquire "market:global" -> acquire "holder:<id>"
//!     -> load document -> read caller's wallet
//!     -> validate + mutate (pure, matchcore)
//!     -> check settlements against the ledger
//!     -> save document -> apply settlements to the ledger
//! release (always, success or failure)
//! ```
//!
//! A rejected operation returns before anything is saved. If applying the
//! settlements fails part way, the applied ones are reverted and the
//! document as loaded is saved back. Display reads (`holder_orders`,
//! `book_snapshot`, quotes) skip the queue and may be momentarily stale.

use std::collections::BTreeSet;

use boarmarket_matchcore::{
    Execution, LimitOrder, MarketDocument, MarketOrder, OrderBook, lifecycle, matcher, placement,
    price_discovery,
};
use boarmarket_types::{
    CancelReport, ClaimReport, FillReport, HolderId, ItemKey, MarketConfig, OrderRef, OrderSide,
    OrderView, Quote, RepriceReport, Result, Settlement, Wallet, constants,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use crate::{
    Clock, DocumentStore, Ledger, SerializedTaskQueue, SystemClock,
    task_queue::{global_key, holder_key},
};

/// Serialized marketplace over a document store and a ledger.
pub struct MarketEngine<S, L, C = SystemClock> {
    config: MarketConfig,
    store: S,
    ledger: L,
    clock: C,
    queue: SerializedTaskQueue,
    global_key: String,
}

impl<S: DocumentStore, L: Ledger> MarketEngine<S, L, SystemClock> {
    /// Build an engine on the wall clock.
    ///
    /// # Errors
    /// `Configuration` if the config does not validate.
    pub fn new(config: MarketConfig, store: S, ledger: L) -> Result<Self> {
        Self::with_clock(config, store, ledger, SystemClock)
    }
}

impl<S: DocumentStore, L: Ledger, C: Clock> MarketEngine<S, L, C> {
    pub fn with_clock(config: MarketConfig, store: S, ledger: L, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            ledger,
            clock,
            queue: SerializedTaskQueue::new(),
            global_key: global_key(constants::MARKET_DOCUMENT),
        })
    }

    #[must_use]
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub fn queue(&self) -> &SerializedTaskQueue {
        &self.queue
    }

    // =================================================================
    // Queued execution
    // =================================================================

    async fn run<T, F>(&self, op: &'static str, holder: &HolderId, item: &ItemKey, f: F) -> Result<T>
    where
        F: FnOnce(&mut MarketDocument, &Wallet, DateTime<Utc>) -> Result<Execution<T>> + Send,
        T: Send,
    {
        let _global = self.queue.acquire(&self.global_key).await;
        let _holder = self.queue.acquire(&holder_key(holder)).await;
        let result = self.execute(holder, item, f).await;
        match &result {
            Ok(_) => info!(op, %holder, %item, "Market operation committed"),
            Err(e) if e.is_rejection() => debug!(op, %holder, %item, error = %e, "Market operation rejected"),
            Err(e) => error!(op, %holder, %item, error = %e, "Market operation failed"),
        }
        result
    }

    async fn execute<T, F>(&self, holder: &HolderId, item: &ItemKey, f: F) -> Result<T>
    where
        F: FnOnce(&mut MarketDocument, &Wallet, DateTime<Utc>) -> Result<Execution<T>> + Send,
        T: Send,
    {
        let mut doc = self.store.load().await?;
        let before = doc.clone();
        let wallet = Wallet {
            balance: self.ledger.balance(holder).await?,
            holding: self.ledger.holding(holder, item).await?,
            highest_edition: self.ledger.highest_edition(item).await?,
        };
        let Execution {
            outcome,
            settlements,
        } = f(&mut doc, &wallet, self.clock.now())?;
        self.commit(&before, &doc, &settlements).await?;
        Ok(outcome)
    }

    /// Save `doc` and apply `settlements`. On a ledger failure the applied
    /// settlements are reverted and `before` is saved back.
    async fn commit(
        &self,
        before: &MarketDocument,
        doc: &MarketDocument,
        settlements: &[Settlement],
    ) -> Result<()> {
        self.ledger.check(settlements).await?;
        self.store.save(doc).await?;
        if let Err(e) = self.settle(settlements).await {
            if let Err(restore) = self.store.save(before).await {
                error!(error = %restore, "Restoring market document failed");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn settle(&self, settlements: &[Settlement]) -> Result<()> {
        let mut applied = Vec::with_capacity(settlements.len());
        for settlement in settlements {
            match self.ledger.apply(settlement).await {
                Ok(inverse) => applied.push(inverse),
                Err(e) => {
                    for inverse in applied.iter().rev() {
                        if let Err(undo) = self.ledger.apply(inverse).await {
                            error!(
                                holder = %inverse.holder,
                                item = %inverse.item,
                                error = %undo,
                                "Reverting settlement failed"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    // =================================================================
    // Market (insta) operations
    // =================================================================

    /// Buy immediately, paying at most `ceiling` in total.
    pub async fn place_market_buy(&self, request: &MarketOrder, ceiling: Decimal) -> Result<FillReport> {
        let config = &self.config;
        self.run("market_buy", &request.holder, &request.item, |doc, wallet, now| {
            matcher::market_buy(doc, config, wallet, request, ceiling, now)
        })
        .await
    }

    /// Sell immediately, receiving at least `floor` in total.
    pub async fn place_market_sell(&self, request: &MarketOrder, floor: Decimal) -> Result<FillReport> {
        let config = &self.config;
        self.run("market_sell", &request.holder, &request.item, |doc, wallet, now| {
            matcher::market_sell(doc, config, wallet, request, floor, now)
        })
        .await
    }

    pub async fn quote_market_buy(&self, request: &MarketOrder) -> Result<Quote> {
        self.quote(OrderSide::Buy, request).await
    }

    pub async fn quote_market_sell(&self, request: &MarketOrder) -> Result<Quote> {
        self.quote(OrderSide::Sell, request).await
    }

    async fn quote(&self, side: OrderSide, request: &MarketOrder) -> Result<Quote> {
        let doc = self.store.load().await?;
        matcher::quote(&doc, &self.config, side, request, self.clock.now())
    }

    /// Execute a quote if the book has not moved against the caller.
    pub async fn commit_quote(&self, holder: &HolderId, quote: &Quote) -> Result<FillReport> {
        let config = &self.config;
        self.run("commit_quote", holder, &quote.item, |doc, wallet, now| {
            matcher::commit_quote(doc, config, wallet, holder, quote, now)
        })
        .await
    }

    // =================================================================
    // Resting orders
    // =================================================================

    pub async fn place_limit_order(&self, request: &LimitOrder) -> Result<OrderRef> {
        let config = &self.config;
        self.run("limit_order", &request.holder, &request.item, |doc, wallet, now| {
            placement::place_limit_order(doc, config, wallet, request, now)
        })
        .await
    }

    pub async fn claim_order(&self, holder: &HolderId, order_ref: &OrderRef) -> Result<ClaimReport> {
        let config = &self.config;
        self.run("claim", holder, &order_ref.item, |doc, wallet, now| {
            lifecycle::claim(doc, config, wallet, holder, order_ref, now)
        })
        .await
    }

    pub async fn cancel_order(&self, holder: &HolderId, order_ref: &OrderRef) -> Result<CancelReport> {
        let config = &self.config;
        self.run("cancel", holder, &order_ref.item, |doc, wallet, now| {
            lifecycle::cancel(doc, config, wallet, holder, order_ref, now)
        })
        .await
    }

    pub async fn reprice_order(
        &self,
        holder: &HolderId,
        order_ref: &OrderRef,
        new_price: Decimal,
    ) -> Result<RepriceReport> {
        let config = &self.config;
        self.run("reprice", holder, &order_ref.item, |doc, wallet, now| {
            lifecycle::reprice(doc, config, wallet, holder, order_ref, new_price, now)
        })
        .await
    }

    // =================================================================
    // Reads
    // =================================================================

    pub async fn holder_orders(&self, holder: &HolderId) -> Result<Vec<OrderView>> {
        Ok(self.store.load().await?.holder_orders(holder))
    }

    /// One item's book with best prices as of now, expired orders excluded.
    pub async fn book_snapshot(&self, item: &ItemKey) -> Result<OrderBook> {
        let capability = self.config.catalog.capability(item)?;
        let doc = self.store.load().await?;
        let mut book = doc
            .book(item)
            .cloned()
            .unwrap_or_else(|| OrderBook::new(item.clone()));
        price_discovery::refresh(&mut book, &capability, self.clock.now(), self.config.order_ttl());
        Ok(book)
    }

    // =================================================================
    // Catalog maintenance
    // =================================================================

    /// Remove an item's book and refund every holder with orders in it.
    pub async fn retire_item(&self, item: &ItemKey) -> Result<Vec<Settlement>> {
        let _global = self.queue.acquire(&self.global_key).await;
        let before = self.store.load().await?;
        let doc = before.clone();
        self.retire_locked(&before, doc, std::slice::from_ref(item))
            .await
    }

    /// Bring the document in line with the catalog: create missing books and
    /// retire books of items no longer listed.
    pub async fn reconcile_catalog(&self) -> Result<Vec<Settlement>> {
        let _global = self.queue.acquire(&self.global_key).await;
        let before = self.store.load().await?;
        let mut doc = before.clone();
        let stale: Vec<ItemKey> = doc
            .books()
            .map(|b| b.item.clone())
            .filter(|item| self.config.catalog.spec(item).is_err())
            .collect();
        for spec in self.config.catalog.iter() {
            doc.book_mut(&spec.key());
        }
        self.retire_locked(&before, doc, &stale).await
    }

    /// Caller holds the global lane. `before` is the document as loaded.
    async fn retire_locked(
        &self,
        before: &MarketDocument,
        mut doc: MarketDocument,
        items: &[ItemKey],
    ) -> Result<Vec<Settlement>> {
        let holders: BTreeSet<HolderId> = items
            .iter()
            .filter_map(|item| doc.book(item))
            .flat_map(|book| {
                [OrderSide::Buy, OrderSide::Sell]
                    .into_iter()
                    .flat_map(move |side| book.orders(side).iter().map(|o| o.holder.clone()))
            })
            .collect();
        let _tickets = self.queue.acquire_many(holders.iter().map(holder_key)).await;

        let mut settlements = Vec::new();
        for item in items {
            let exec = lifecycle::retire_item(&mut doc, item);
            settlements.extend(exec.settlements);
        }
        self.commit(before, &doc, &settlements)
            .await
            .inspect_err(|e| {
                error!(error = %e, "Refunding retired orders failed");
            })?;
        if !items.is_empty() {
            info!(items = items.len(), holders = holders.len(), "Retired items refunded");
        }
        Ok(settlements)
    }
}
