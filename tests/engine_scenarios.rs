//! Engine-level integration scenarios: routing across pairs, commit/discard
//! semantics, and persistence across a simulated process restart backed by
//! [`FileStore`](orderbook_rs::store::FileStore).

use orderbook_rs::{Engine, MemoryStore, Side};
use std::collections::HashMap;

fn quote(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn discard_drops_uncommitted_trades_but_commit_keeps_them() {
    let mut engine = Engine::new(MemoryStore::new());

    engine
        .process_order(&quote(&[
            ("type", "limit"),
            ("side", "ask"),
            ("quantity", "5"),
            ("price", "100"),
            ("pair_name", "BTC/USD"),
        ]))
        .unwrap();
    engine.commit().unwrap();

    // A bid that crosses, then the caller aborts before committing.
    engine
        .process_order(&quote(&[
            ("type", "limit"),
            ("side", "bid"),
            ("quantity", "5"),
            ("price", "100"),
            ("pair_name", "BTC/USD"),
        ]))
        .unwrap();
    engine.discard();

    // Reloading straight from the store (bypassing the engine's in-memory
    // book cache, which still reflects the discarded mutation) should show
    // the ask still resting, since the crossing match was never committed.
    let reloaded = orderbook_rs::Book::load(engine.store(), "btc/usd").unwrap();
    assert_eq!(
        reloaded.best_ask(engine.store()).unwrap(),
        Some(num_bigint::BigUint::from(100u32))
    );
    assert_eq!(reloaded.asks.depth(), 1);
}

#[cfg(feature = "persistence")]
#[test]
fn engine_state_survives_a_simulated_restart() {
    use num_bigint::BigUint;
    use orderbook_rs::store::FileStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.log");

    {
        let store = FileStore::open(&path).unwrap();
        let mut engine = Engine::new(store);
        engine
            .process_order(&quote(&[
                ("type", "limit"),
                ("side", "ask"),
                ("quantity", "3"),
                ("price", "200"),
                ("pair_name", "ETH/USD"),
            ]))
            .unwrap();
        engine
            .process_order(&quote(&[
                ("type", "limit"),
                ("side", "bid"),
                ("quantity", "2"),
                ("price", "195"),
                ("pair_name", "ETH/USD"),
            ]))
            .unwrap();
        engine.commit().unwrap();
    }

    // Reopen against the same file: a fresh process picking the book back up.
    let store = FileStore::open(&path).unwrap();
    let mut engine = Engine::new(store);
    engine.get_orderbook("eth/usd").unwrap();
    let book = engine.orderbook("eth/usd").unwrap();

    assert_eq!(
        book.best_ask(engine.store()).unwrap(),
        Some(BigUint::from(200u32))
    );
    assert_eq!(
        book.best_bid(engine.store()).unwrap(),
        Some(BigUint::from(195u32))
    );
    assert_eq!(book.asks.depth(), 1);
    assert_eq!(book.bids.depth(), 1);

    // A cancel on the restarted engine persists through a further restart.
    engine
        .cancel_order("eth/usd", Side::Bid, 2, &BigUint::from(195u32))
        .unwrap();
    engine.commit().unwrap();
    drop(engine);

    let store = FileStore::open(&path).unwrap();
    let mut engine = Engine::new(store);
    engine.get_orderbook("eth/usd").unwrap();
    let book = engine.orderbook("eth/usd").unwrap();
    assert_eq!(book.best_bid(engine.store()).unwrap(), None);
}

#[test]
fn cancel_is_idempotent_across_repeated_calls() {
    let mut engine = Engine::new(MemoryStore::new());
    engine
        .process_order(&quote(&[
            ("type", "limit"),
            ("side", "bid"),
            ("quantity", "4"),
            ("price", "7"),
            ("pair_name", "BTC/USD"),
        ]))
        .unwrap();

    engine
        .cancel_order("btc/usd", Side::Bid, 1, &num_bigint::BigUint::from(7u32))
        .unwrap();
    let book = engine.orderbook("btc/usd").unwrap();
    assert_eq!(book.bids.depth(), 0);

    // Second cancel of the same id is a no-op, not an error.
    engine
        .cancel_order("btc/usd", Side::Bid, 1, &num_bigint::BigUint::from(7u32))
        .unwrap();
    let book = engine.orderbook("btc/usd").unwrap();
    assert_eq!(book.bids.depth(), 0);
}
