//! Opening the bookkeeping store while other handles hold the database file
//!
//! Run with: cargo test --test connection_retry_test -- --nocapture

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use tidemark_core::adapters::duckdb::DuckDbStore;
use tidemark_core::config::TableName;
use tidemark_core::Error;

fn ledger_table() -> TableName {
    TableName::parse("main.schema_migrations").unwrap()
}

#[test]
fn test_concurrent_opens_succeed_with_retry() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("ledger.duckdb");

    {
        let store = DuckDbStore::open(&db_path, ledger_table()).unwrap();
        let conn = store.lock().unwrap();
        store.ledger().create_table(&conn).unwrap();
    }

    let barrier = Arc::new(Barrier::new(3));
    let db_path = Arc::new(db_path);

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let db_path = Arc::clone(&db_path);
            thread::spawn(move || {
                barrier.wait();
                let start = Instant::now();
                let result = DuckDbStore::open(&db_path, ledger_table());
                println!("opener {}: {:?} after {:?}", i, result.is_ok(), start.elapsed());
                // keep the file busy so the others contend for it
                thread::sleep(Duration::from_millis(100));
                result.map(|_| ()).map_err(|e| e.to_string())
            })
        })
        .collect();

    let failures: Vec<String> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap().err())
        .collect();
    assert!(failures.is_empty(), "opens failed: {:?}", failures);
}

#[test]
fn test_sequential_reopen_keeps_ledger() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("ledger.duckdb");

    for round in 0..3 {
        let store = DuckDbStore::open(&db_path, ledger_table()).unwrap();
        let conn = store.lock().unwrap();
        store.ledger().create_table(&conn).unwrap();
        let rows = store.ledger().last(&conn, 10).unwrap();
        assert!(rows.is_empty(), "round {} found rows", round);
    }
}

#[test]
fn test_unopenable_path_is_connectivity_error() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("missing-dir").join("ledger.duckdb");

    let err = DuckDbStore::open(&db_path, ledger_table()).err().unwrap();
    match err {
        Error::Connectivity(msg) => assert!(msg.contains("ledger.duckdb"), "got {msg}"),
        other => panic!("expected connectivity error, got {other:?}"),
    }
}
