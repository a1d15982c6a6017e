//! End-to-end integration tests

use chrono::{Duration, Local};
use id_allocator::storage::models::{BatchOperation, IdStatus};
use id_allocator::storage::{Database, StoreError};
use id_allocator::tokens::admin;
use tempfile::TempDir;

fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    db.seed_admin_password("root123").unwrap();
    (db, temp_dir)
}

#[test]
fn test_allocation_lifecycle() {
    let (db, _temp) = setup_db();
    db.import_ids(&[500, 501, 502]).unwrap();

    // Allocate
    let grant = db.allocate("192.168.0.10", false).unwrap();
    let id = grant.allocation.id;
    assert_eq!(db.pool_stats().unwrap().allocated, 1);

    // Same caller gets the same id back
    assert_eq!(db.allocate("192.168.0.10", false).unwrap().allocation.id, id);

    // Release it
    db.release(id).unwrap();
    let stats = db.pool_stats().unwrap();
    assert_eq!(stats.allocated, 0);
    assert_eq!(stats.available, 3);

    // Double release is rejected
    assert!(matches!(db.release(id), Err(StoreError::NotAllocated(_))));
}

#[test]
fn test_allocations_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let id = {
        let db = Database::open(temp_dir.path()).unwrap();
        db.import_ids(&[1, 2]).unwrap();
        db.allocate("persistent", false).unwrap().allocation.id
    };

    let db = Database::open(temp_dir.path()).unwrap();
    let allocation = db.get_allocation_by_caller("persistent").unwrap().unwrap();
    assert_eq!(allocation.id, id);
    assert_eq!(
        db.get_pool_entry(id).unwrap().unwrap().status,
        IdStatus::Allocated
    );
}

#[test]
fn test_yesterdays_allocations_are_swept() {
    let (db, _temp) = setup_db();
    db.import_ids(&[10, 11, 12]).unwrap();

    let yesterday = Local::now() - Duration::days(1);
    db.allocate_at("old-1", false, yesterday).unwrap();
    db.allocate_at("old-2", false, yesterday).unwrap();
    db.allocate("today", false).unwrap();

    assert_eq!(db.cleanup_expired().unwrap(), 2);
    let callers: Vec<String> = db
        .list_allocations()
        .unwrap()
        .into_iter()
        .map(|a| a.caller)
        .collect();
    assert_eq!(callers, vec!["today".to_string()]);
    assert_eq!(db.pool_stats().unwrap().available, 2);
}

#[test]
fn test_admin_pool_management_flow() {
    let (db, _temp) = setup_db();

    let session = admin::login(&db, "root123").unwrap();
    admin::require_session(&db, Some(&session.token)).unwrap();

    db.import_ids(&[1, 2, 3, 4]).unwrap();
    let report = db.batch_update(&[3, 4], BatchOperation::Disable).unwrap();
    assert_eq!(report.success_count, 2);

    // Only enabled ids are handed out
    let a = db.allocate("a", false).unwrap().allocation.id;
    let b = db.allocate("b", false).unwrap().allocation.id;
    let mut granted = vec![a, b];
    granted.sort_unstable();
    assert_eq!(granted, vec![1, 2]);
    assert!(matches!(
        db.allocate("c", false),
        Err(StoreError::PoolExhausted)
    ));

    // Re-enable one, and the next caller gets it
    db.set_status(4, IdStatus::Available).unwrap();
    assert_eq!(db.allocate("c", false).unwrap().allocation.id, 4);

    assert_eq!(db.clear_all_allocations().unwrap(), 3);
    admin::logout(&db, &session.token).unwrap();
    assert!(admin::require_session(&db, Some(&session.token)).is_err());
}

#[test]
fn test_quotes_and_settings_flow() {
    let (db, _temp) = setup_db();

    let report = db
        .import_quotes("Done is better than perfect|Sandberg\nSimplicity is prerequisite")
        .unwrap();
    assert_eq!(report.success_count, 2);

    let quotes = db.list_quotes().unwrap();
    assert_eq!(quotes[1].source, "Anonymous");
    assert!(db.random_quote().unwrap().is_some());

    db.set_quote_interval(60_000).unwrap();
    db.set_fade_out_delay(3_000).unwrap();
    assert_eq!(db.quote_interval().unwrap(), 60_000);
    assert_eq!(db.fade_out_delay().unwrap(), 3_000);
}
