//! Tests for LendingEngine
//!
//! These tests verify:
//! - Catalog operations (add/remove/update/find/search/list)
//! - The borrow/return state machine
//! - Removal cascade on active loans
//! - Write-through persistence and reopen
//! - Startup consistency findings
//! - Invariants after every mutating operation

use std::fs;

use chrono::{NaiveDate, NaiveDateTime};
use lendkeeper::clock::ManualClock;
use lendkeeper::config::{Config, SyncStrategy};
use lendkeeper::engine::{Inconsistency, LendingEngine, LoanState};
use lendkeeper::LendError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn test_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .sync_strategy(SyncStrategy::OsBuffered)
        .build()
}

fn setup_temp_engine() -> (TempDir, ManualClock, LendingEngine) {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new(t0());
    let engine = LendingEngine::open_with_clock(test_config(&temp_dir), clock.clone()).unwrap();
    (temp_dir, clock, engine)
}

fn reopen(temp_dir: &TempDir) -> LendingEngine {
    LendingEngine::open_with_clock(test_config(temp_dir), ManualClock::new(t0())).unwrap()
}

/// Catalog flag/holder agreement and one active record per item
fn assert_invariants(engine: &LendingEngine) {
    for item in engine.list_all() {
        assert_eq!(item.is_on_loan(), item.holder().is_some());
        let active = engine
            .history_for(item.id())
            .into_iter()
            .filter(|r| r.is_active())
            .count();
        assert!(active <= 1, "item {} has {} active loans", item.id(), active);
        if let Some(holder) = item.holder() {
            let record = engine.active_loan_for(item.id()).unwrap();
            assert_eq!(record.holder(), holder);
        } else {
            assert!(engine.active_loan_for(item.id()).is_none());
        }
    }
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("shelf");

    let engine = LendingEngine::open_path(&data_dir).unwrap();

    assert!(data_dir.exists());
    assert_eq!(engine.item_count(), 0);
    assert_eq!(engine.record_count(), 0);
    assert!(engine.startup_report().is_consistent());
}

#[test]
fn test_engine_open_rejects_bad_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .catalog_file("same.txt")
        .ledger_file("same.txt")
        .build();

    let result = LendingEngine::open(config);

    assert!(matches!(result, Err(LendError::Config(_))));
}

#[test]
fn test_engine_open_fails_on_bad_timestamp() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    fs::write(config.ledger_path(), "r1\tB1\tAlice\tsoon\tnull\n").unwrap();

    let result = LendingEngine::open(config);

    assert!(matches!(result, Err(LendError::MalformedRecord { .. })));
}

// =============================================================================
// Catalog Operation Tests
// =============================================================================

#[test]
fn test_engine_add_and_find() {
    let (_temp, _clock, mut engine) = setup_temp_engine();

    engine.add_item("B1", "The Hobbit", "J.R.R. Tolkien").unwrap();

    let item = engine.find("B1").unwrap();
    assert_eq!(item.title(), "The Hobbit");
    assert!(!item.is_on_loan());
    assert_eq!(engine.loan_state("B1").unwrap(), LoanState::Available);
}

#[test]
fn test_engine_add_duplicate_rejected() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "The Hobbit", "J.R.R. Tolkien").unwrap();

    let result = engine.add_item("B1", "Other", "Other");

    assert!(matches!(result, Err(LendError::DuplicateIdentifier(_))));
    assert!(result.unwrap_err().is_rejection());
    assert_eq!(engine.find("B1").unwrap().title(), "The Hobbit");
}

#[test]
fn test_engine_add_invalid_fields_rejected() {
    let (_temp, _clock, mut engine) = setup_temp_engine();

    assert!(matches!(
        engine.add_item("  ", "T", "A"),
        Err(LendError::InvalidField { field: "identifier", .. })
    ));
    assert!(matches!(
        engine.add_item("B1", "Tab\there", "A"),
        Err(LendError::InvalidField { field: "title", .. })
    ));
    assert!(matches!(
        engine.add_item("B1", "T", "Line\nbreak"),
        Err(LendError::InvalidField { field: "attribution", .. })
    ));
    assert_eq!(engine.item_count(), 0);
}

#[test]
fn test_engine_find_missing() {
    let (_temp, _clock, engine) = setup_temp_engine();
    assert!(matches!(engine.find("B1"), Err(LendError::NotFound(_))));
    assert!(matches!(engine.loan_state("B1"), Err(LendError::NotFound(_))));
}

#[test]
fn test_engine_update_item() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "The Hobit", "Tolkien").unwrap();

    engine.update_item("B1", Some("The Hobbit"), None).unwrap();
    engine.update_item("B1", Some(" "), Some("J.R.R. Tolkien")).unwrap();

    let item = engine.find("B1").unwrap();
    assert_eq!(item.title(), "The Hobbit");
    assert_eq!(item.attribution(), "J.R.R. Tolkien");
}

#[test]
fn test_engine_update_missing_rejected() {
    let (_temp, _clock, mut engine) = setup_temp_engine();

    let result = engine.update_item("B1", Some("T"), None);

    assert!(matches!(result, Err(LendError::NotFound(_))));
}

#[test]
fn test_engine_remove_missing_rejected() {
    let (_temp, _clock, mut engine) = setup_temp_engine();

    let result = engine.remove_item("B1");

    assert!(matches!(result, Err(LendError::NotFound(_))));
}

#[test]
fn test_engine_search_case_insensitive() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "The Hobbit", "J.R.R. Tolkien").unwrap();
    engine.add_item("B2", "Dune", "Frank Herbert").unwrap();

    for query in ["tolkien", "TOLKIEN", "Tolkien"] {
        let found = engine.search(query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "B1");
    }
    assert!(engine.search("asimov").is_empty());
}

#[test]
fn test_engine_lists() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "One", "A").unwrap();
    engine.add_item("B2", "Two", "B").unwrap();
    engine.add_item("B3", "Three", "C").unwrap();
    engine.borrow("B2", "Alice").unwrap();

    let ids = |items: Vec<lendkeeper::Item>| -> Vec<String> {
        items.into_iter().map(|i| i.id().to_string()).collect()
    };

    assert_eq!(ids(engine.list_all()), vec!["B1", "B2", "B3"]);
    assert_eq!(ids(engine.list_available()), vec!["B1", "B3"]);
    assert_eq!(ids(engine.list_on_loan()), vec!["B2"]);
}

#[test]
fn test_engine_snapshots_are_copies() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "One", "A").unwrap();

    let before = engine.list_all();
    engine.borrow("B1", "Alice").unwrap();

    assert!(!before[0].is_on_loan());
    assert!(engine.list_all()[0].is_on_loan());
}

// =============================================================================
// Borrow / Return Tests
// =============================================================================

#[test]
fn test_engine_borrow_available_item() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "The Hobbit", "J.R.R. Tolkien").unwrap();

    let record = engine.borrow("B1", "Alice").unwrap();

    let item = engine.find("B1").unwrap();
    assert!(item.is_on_loan());
    assert_eq!(item.holder(), Some("Alice"));
    assert_eq!(engine.loan_state("B1").unwrap(), LoanState::OnLoan("Alice".into()));

    let active = engine.active_loan_for("B1").unwrap();
    assert_eq!(active, record);
    assert_eq!(active.borrowed_at(), t0());
    assert_eq!(active.returned_at(), None);
    assert_invariants(&engine);
}

#[test]
fn test_engine_borrow_on_loan_rejected() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "The Hobbit", "J.R.R. Tolkien").unwrap();
    engine.borrow("B1", "Alice").unwrap();

    let result = engine.borrow("B1", "Bob");

    assert!(matches!(result, Err(LendError::BorrowRejected { .. })));
    assert_eq!(engine.find("B1").unwrap().holder(), Some("Alice"));
    assert_eq!(engine.record_count(), 1);
    assert_invariants(&engine);
}

#[test]
fn test_engine_borrow_missing_rejected() {
    let (_temp, _clock, mut engine) = setup_temp_engine();

    let result = engine.borrow("B1", "Alice");

    assert!(matches!(result, Err(LendError::BorrowRejected { .. })));
    assert_eq!(engine.record_count(), 0);
}

#[test]
fn test_engine_borrow_invalid_holder_rejected() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "The Hobbit", "J.R.R. Tolkien").unwrap();

    for holder in ["", "   ", "null", "Al\tice"] {
        let result = engine.borrow("B1", holder);
        assert!(
            matches!(result, Err(LendError::InvalidField { field: "holder", .. })),
            "holder {:?}",
            holder
        );
    }
    assert!(!engine.find("B1").unwrap().is_on_loan());
    assert_eq!(engine.record_count(), 0);
}

#[test]
fn test_engine_return_on_loan_item() {
    let (_temp, clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "The Hobbit", "J.R.R. Tolkien").unwrap();
    engine.borrow("B1", "Alice").unwrap();
    clock.advance(3600);

    let closed = engine.return_item("B1").unwrap().unwrap();

    assert_eq!(closed.holder(), "Alice");
    assert_eq!(closed.returned_at(), Some(t0() + chrono::Duration::hours(1)));
    let item = engine.find("B1").unwrap();
    assert!(!item.is_on_loan());
    assert_eq!(item.holder(), None);
    assert!(engine.active_loan_for("B1").is_none());
    assert_invariants(&engine);
}

#[test]
fn test_engine_return_never_borrowed_rejected() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B2", "Dune", "Frank Herbert").unwrap();
    let history_before = engine.history();

    let result = engine.return_item("B2");

    assert!(matches!(result, Err(LendError::ReturnRejected { .. })));
    assert_eq!(engine.history(), history_before);
    assert!(!engine.find("B2").unwrap().is_on_loan());
}

#[test]
fn test_engine_return_missing_rejected() {
    let (_temp, _clock, mut engine) = setup_temp_engine();

    let result = engine.return_item("B9");

    assert!(matches!(result, Err(LendError::ReturnRejected { .. })));
}

#[test]
fn test_engine_return_with_clock_behind_borrow() {
    let (_temp, clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "One", "A").unwrap();
    engine.borrow("B1", "Alice").unwrap();
    clock.advance(-600);

    let closed = engine.return_item("B1").unwrap().unwrap();

    assert_eq!(closed.returned_at(), Some(closed.borrowed_at()));
}

#[test]
fn test_engine_borrow_return_cycles() {
    let (_temp, clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "One", "A").unwrap();

    for holder in ["Alice", "Bob", "Carol"] {
        engine.borrow("B1", holder).unwrap();
        clock.advance(60);
        engine.return_item("B1").unwrap();
        clock.advance(60);
        assert_invariants(&engine);
    }

    let history = engine.history_for("B1");
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| !r.is_active()));
    let holders: Vec<&str> = history.iter().map(|r| r.holder()).collect();
    assert_eq!(holders, vec!["Alice", "Bob", "Carol"]);
}

// =============================================================================
// Removal Cascade Tests
// =============================================================================

#[test]
fn test_engine_remove_with_active_loan_deletes_record() {
    let (_temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B3", "Emma", "Jane Austen").unwrap();
    engine.borrow("B3", "Bob").unwrap();

    let dropped = engine.remove_item("B3").unwrap();

    assert_eq!(dropped, 1);
    assert!(matches!(engine.find("B3"), Err(LendError::NotFound(_))));
    assert!(engine.active_loan_for("B3").is_none());
    assert!(engine.history().iter().all(|r| r.item_id() != "B3"));
}

#[test]
fn test_engine_remove_keeps_returned_history() {
    let (_temp, clock, mut engine) = setup_temp_engine();
    engine.add_item("B3", "Emma", "Jane Austen").unwrap();
    engine.borrow("B3", "Alice").unwrap();
    clock.advance(60);
    engine.return_item("B3").unwrap();
    engine.borrow("B3", "Bob").unwrap();

    engine.remove_item("B3").unwrap();

    let history = engine.history_for("B3");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].holder(), "Alice");
    assert!(!history[0].is_active());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_engine_every_mutation_is_durable() {
    let (temp, clock, mut engine) = setup_temp_engine();

    engine.add_item("B1", "The Hobbit", "J.R.R. Tolkien").unwrap();
    assert_eq!(reopen(&temp).item_count(), 1);

    engine.borrow("B1", "Alice").unwrap();
    let reopened = reopen(&temp);
    assert_eq!(reopened.find("B1").unwrap().holder(), Some("Alice"));
    assert!(reopened.active_loan_for("B1").is_some());

    engine.update_item("B1", Some("Hobbit"), None).unwrap();
    assert_eq!(reopen(&temp).find("B1").unwrap().title(), "Hobbit");

    clock.advance(60);
    engine.return_item("B1").unwrap();
    let reopened = reopen(&temp);
    assert!(!reopened.find("B1").unwrap().is_on_loan());
    assert!(reopened.active_loan_for("B1").is_none());

    engine.remove_item("B1").unwrap();
    assert_eq!(reopen(&temp).item_count(), 0);
    assert_eq!(reopen(&temp).record_count(), 1);
}

#[test]
fn test_engine_rejection_does_not_write() {
    let (temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "One", "A").unwrap();
    let catalog_path = engine.config().catalog_path();
    let before = fs::read_to_string(&catalog_path).unwrap();

    let _ = engine.add_item("B1", "Dup", "A");
    let _ = engine.return_item("B1");

    assert_eq!(fs::read_to_string(&catalog_path).unwrap(), before);
    assert_eq!(reopen(&temp).find("B1").unwrap().title(), "One");
}

#[test]
fn test_engine_roundtrip_after_mixed_operations() {
    let (temp, clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "The Hobbit", "J.R.R. Tolkien").unwrap();
    engine.add_item("B2", "Dune", "Frank Herbert").unwrap();
    engine.add_item("B3", "Emma", "Jane Austen").unwrap();
    engine.borrow("B1", "Alice").unwrap();
    clock.advance(45);
    engine.borrow("B2", "Bob").unwrap();
    clock.advance(3600);
    engine.return_item("B1").unwrap();
    engine.update_item("B3", None, Some("J. Austen")).unwrap();
    engine.borrow("B1", "Carol").unwrap();

    let reopened = reopen(&temp);

    assert_eq!(reopened.list_all(), engine.list_all());
    assert_eq!(reopened.history(), engine.history());
    assert!(reopened.startup_report().is_consistent());
    assert_invariants(&reopened);
}

#[test]
fn test_engine_save_failure_marks_dirty_and_recovers() {
    let (temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "One", "A").unwrap();

    // Replace the data directory with a file so the next save cannot write
    let data_dir = temp.path().to_path_buf();
    let moved = temp.path().with_extension("moved");
    fs::rename(&data_dir, &moved).unwrap();
    fs::write(&data_dir, "not a directory").unwrap();

    let result = engine.add_item("B2", "Two", "B");

    assert!(matches!(result, Err(LendError::Persistence { .. })));
    assert!(!result.unwrap_err().is_rejection());
    assert!(engine.is_dirty());
    // In-memory state kept the mutation
    assert!(engine.find("B2").is_ok());

    // Put the directory back and retry
    fs::remove_file(&data_dir).unwrap();
    fs::rename(&moved, &data_dir).unwrap();
    engine.flush().unwrap();

    assert!(!engine.is_dirty());
    assert_eq!(reopen(&temp).item_count(), 2);
}

#[test]
fn test_engine_close_flushes() {
    let (temp, _clock, mut engine) = setup_temp_engine();
    engine.add_item("B1", "One", "A").unwrap();
    fs::remove_file(engine.config().catalog_path()).unwrap();

    engine.close().unwrap();

    assert_eq!(reopen(&temp).item_count(), 1);
}

// =============================================================================
// Startup Consistency Tests
// =============================================================================

#[test]
fn test_engine_reports_loan_without_record() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    fs::write(config.catalog_path(), "B1\tOne\tA\ttrue\tAlice\n").unwrap();

    let engine = LendingEngine::open(config).unwrap();

    assert_eq!(
        engine.startup_report().inconsistencies,
        vec![Inconsistency::LoanedWithoutRecord {
            item_id: "B1".into(),
            holder: "Alice".into(),
        }]
    );
}

#[test]
fn test_engine_reports_record_without_loan_and_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    fs::write(config.catalog_path(), "B1\tOne\tA\tfalse\tnull\n").unwrap();
    fs::write(
        config.ledger_path(),
        "r1\tB1\tAlice\t2024-06-01 09:00:00\tnull\n\
         r2\tB1\tBob\t2024-06-01 10:00:00\tnull\n",
    )
    .unwrap();

    let engine = LendingEngine::open(config).unwrap();
    let findings = &engine.startup_report().inconsistencies;

    assert!(findings.contains(&Inconsistency::RecordWithoutLoan {
        item_id: "B1".into(),
        record_id: "r1".into(),
    }));
    assert!(findings.contains(&Inconsistency::RecordWithoutLoan {
        item_id: "B1".into(),
        record_id: "r2".into(),
    }));
    assert!(findings.contains(&Inconsistency::MultipleActiveLoans {
        item_id: "B1".into(),
        count: 2,
    }));
}

#[test]
fn test_engine_return_without_ledger_record_still_frees_item() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    fs::write(config.catalog_path(), "B1\tOne\tA\ttrue\tAlice\n").unwrap();
    let mut engine = LendingEngine::open(config).unwrap();

    let closed = engine.return_item("B1").unwrap();

    assert!(closed.is_none());
    assert!(!engine.find("B1").unwrap().is_on_loan());
}

#[test]
fn test_engine_reports_holder_mismatch() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    fs::write(config.catalog_path(), "B1\tOne\tA\ttrue\tAlice\n").unwrap();
    fs::write(config.ledger_path(), "r1\tB1\tBob\t2024-06-01 09:00:00\tnull\n").unwrap();

    let engine = LendingEngine::open(config).unwrap();

    assert_eq!(
        engine.startup_report().inconsistencies,
        vec![Inconsistency::HolderMismatch {
            item_id: "B1".into(),
            catalog_holder: "Alice".into(),
            ledger_holder: "Bob".into(),
        }]
    );
}

#[test]
fn test_engine_borrow_closes_stale_active_record() {
    // Catalog saved after a return, ledger not
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    fs::write(config.catalog_path(), "B1\tOne\tA\tfalse\tnull\n").unwrap();
    fs::write(config.ledger_path(), "r1\tB1\tAlice\t2024-06-01 09:00:00\tnull\n").unwrap();
    let later = t0() + chrono::Duration::hours(2);
    let mut engine = LendingEngine::open_with_clock(config, ManualClock::new(later)).unwrap();

    let record = engine.borrow("B1", "Bob").unwrap();

    let history = engine.history_for("B1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].record_id(), "r1");
    assert_eq!(history[0].returned_at(), Some(later));
    assert_eq!(engine.active_loan_for("B1").unwrap().record_id(), record.record_id());
    assert_invariants(&engine);

    let closed = engine.return_item("B1").unwrap().unwrap();
    assert_eq!(closed.holder(), "Bob");
    assert!(engine.history().iter().all(|r| !r.is_active()));
    assert_invariants(&engine);

    let engine = reopen(&temp_dir);
    assert!(engine.startup_report().is_consistent());
}

#[test]
fn test_engine_return_closes_every_active_record() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    fs::write(config.catalog_path(), "B1\tOne\tA\ttrue\tBob\n").unwrap();
    fs::write(
        config.ledger_path(),
        "r1\tB1\tAlice\t2024-06-01 09:00:00\tnull\n\
         r2\tB1\tBob\t2024-06-01 10:00:00\tnull\n",
    )
    .unwrap();
    let later = t0() + chrono::Duration::hours(3);
    let mut engine = LendingEngine::open_with_clock(config, ManualClock::new(later)).unwrap();

    let closed = engine.return_item("B1").unwrap().unwrap();

    assert_eq!(closed.record_id(), "r2");
    assert_eq!(closed.returned_at(), Some(later));
    assert!(engine.active_loan_for("B1").is_none());
    assert_invariants(&engine);

    engine.borrow("B1", "Carol").unwrap();
    assert_invariants(&engine);
}
