//! Engine over the JSON file store: persistence across restarts and catalog
//! reconciliation.

use std::sync::Arc;

use boarmarket_engine::{InMemoryLedger, JsonFileStore, Ledger, MarketEngine};
use boarmarket_matchcore::{LimitOrder, MarketOrder};
use boarmarket_types::*;
use rust_decimal::Decimal;

type Engine = MarketEngine<JsonFileStore, Arc<InMemoryLedger>>;

fn gift() -> ItemKey {
    ItemKey::new(ItemType::Powerup, "gift")
}

fn open(path: &std::path::Path, config: MarketConfig, ledger: &Arc<InMemoryLedger>) -> Engine {
    MarketEngine::new(config, JsonFileStore::new(path), Arc::clone(ledger)).unwrap()
}

fn without_gift() -> MarketConfig {
    let full = MarketConfig::for_tests();
    let specs = full
        .catalog
        .iter()
        .filter(|spec| spec.key() != gift())
        .cloned()
        .collect();
    MarketConfig::with_catalog(ItemCatalog::new(specs))
}

fn limit(holder: &HolderId, side: OrderSide, quantity: u64, price: i64) -> LimitOrder {
    LimitOrder {
        holder: holder.clone(),
        item: gift(),
        side,
        quantity,
        unit_price: Decimal::new(price, 0),
        edition: None,
    }
}

#[tokio::test]
async fn orders_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("market.json");
    let ledger = Arc::new(InMemoryLedger::new());
    let alice = HolderId::new("alice");
    let bob = HolderId::new("bob");
    ledger.grant(&bob, &gift(), 5, Vec::new());
    ledger.deposit(&alice, Decimal::new(20, 0));

    let sell_ref = {
        let engine = open(&path, MarketConfig::for_tests(), &ledger);
        engine
            .place_limit_order(&limit(&bob, OrderSide::Sell, 5, 4))
            .await
            .unwrap()
    };
    let json = std::fs::read_to_string(&path).unwrap();
    assert!(json.contains("powerup"));
    assert!(json.contains("gift"));

    let engine = open(&path, MarketConfig::for_tests(), &ledger);
    let book = engine.book_snapshot(&gift()).await.unwrap();
    assert_eq!(book.best_price(OrderSide::Sell).current_best_price, Decimal::new(4, 0));

    let fill = engine
        .place_market_buy(
            &MarketOrder {
                holder: alice.clone(),
                item: gift(),
                quantity: 2,
                edition: None,
            },
            Decimal::new(8, 0),
        )
        .await
        .unwrap();
    assert_eq!(fill.total, Decimal::new(8, 0));

    let claim = engine.claim_order(&bob, &sell_ref).await.unwrap();
    assert_eq!(claim.proceeds, Decimal::new(8, 0));
    assert_eq!(ledger.balance(&bob).await.unwrap(), Decimal::new(8, 0));
    assert_eq!(ledger.holding(&alice, &gift()).await.unwrap().quantity, 2);
}

#[tokio::test]
async fn reconcile_retires_items_dropped_from_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("market.json");
    let ledger = Arc::new(InMemoryLedger::new());
    let alice = HolderId::new("alice");
    let bob = HolderId::new("bob");
    ledger.grant(&bob, &gift(), 5, Vec::new());
    ledger.deposit(&alice, Decimal::new(30, 0));

    {
        let engine = open(&path, MarketConfig::for_tests(), &ledger);
        engine
            .place_limit_order(&limit(&bob, OrderSide::Sell, 5, 4))
            .await
            .unwrap();
        engine
            .place_market_buy(
                &MarketOrder {
                    holder: alice.clone(),
                    item: gift(),
                    quantity: 2,
                    edition: None,
                },
                Decimal::new(8, 0),
            )
            .await
            .unwrap();
        engine
            .place_limit_order(&limit(&alice, OrderSide::Buy, 3, 2))
            .await
            .unwrap();
    }
    // 30 - 8 spent - 6 escrowed.
    assert_eq!(ledger.balance(&alice).await.unwrap(), Decimal::new(16, 0));

    let engine = open(&path, without_gift(), &ledger);
    let settlements = engine.reconcile_catalog().await.unwrap();
    assert_eq!(settlements.len(), 2);

    // Alice gets her escrow back; Bob gets his unsold goods and the
    // proceeds he never claimed.
    assert_eq!(ledger.balance(&alice).await.unwrap(), Decimal::new(22, 0));
    assert_eq!(ledger.balance(&bob).await.unwrap(), Decimal::new(8, 0));
    assert_eq!(ledger.holding(&bob, &gift()).await.unwrap().quantity, 3);
    assert_eq!(ledger.total_balance(), Decimal::new(30, 0));
    assert_eq!(ledger.total_quantity(&gift()), 5);

    assert!(matches!(
        engine.book_snapshot(&gift()).await.unwrap_err(),
        MarketError::UnknownItem(_)
    ));
    assert!(engine.holder_orders(&alice).await.unwrap().is_empty());

    // A second pass has nothing left to retire.
    assert!(engine.reconcile_catalog().await.unwrap().is_empty());
}

#[tokio::test]
async fn reconcile_creates_books_for_new_items() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("market.json");
    let ledger = Arc::new(InMemoryLedger::new());

    let engine = open(&path, MarketConfig::for_tests(), &ledger);
    assert!(engine.reconcile_catalog().await.unwrap().is_empty());

    let json = std::fs::read_to_string(&path).unwrap();
    for spec in engine.config().catalog.iter() {
        assert!(json.contains(spec.item_id.as_str()), "missing {}", spec.key());
    }
}
