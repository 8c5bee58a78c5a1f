//! Integration tests for tally-storage
//!
//! These tests exercise the state and audit-log repositories together:
//! atomic transitions, newest-first paging, concurrent writers, and
//! durability across reopen.

use std::sync::{Arc, Barrier};
use std::thread;

use tally_core::{SharedState, StatePatch};
use tally_storage::{AuditLog, StateRepository, StoreError, TallyDb, TallyDbConfig};
use tempfile::TempDir;

fn fresh_repos() -> (StateRepository, AuditLog) {
    let db = Arc::new(TallyDb::in_memory().unwrap());
    (StateRepository::new(db.clone()), AuditLog::new(db))
}

// ============================================================================
// Transition Tests
// ============================================================================

/// Defaults, one combined update, and a listing that shows exactly it
#[test]
fn test_end_to_end_scenario() {
    let (state, log) = fresh_repos();
    assert_eq!(state.get_current_state().unwrap(), SharedState::new(0, ""));

    let transition = state
        .apply_update(
            &StatePatch::new()
                .with_counter(5)
                .with_message("Updated message"),
        )
        .unwrap();

    assert_eq!(transition.old, SharedState::new(0, ""));
    assert_eq!(transition.new, SharedState::new(5, "Updated message"));
    assert_eq!(transition.entry.update_type, "counter, message");

    let page = log.list(1, 10).unwrap();
    assert_eq!(page.entries, vec![transition.entry]);
    assert_eq!(page.total, 1);
    assert_eq!(page.total_pages, 1);
}

/// The entry returned by an update is the entry later served by reads
#[test]
fn test_returned_entry_matches_stored_entry() {
    let (state, log) = fresh_repos();

    for i in 1..=5 {
        let transition = state.apply_update(&StatePatch::new().with_counter(i)).unwrap();
        assert_eq!(log.get(transition.entry.id).unwrap(), Some(transition.entry.clone()));
        assert_eq!(log.list(1, 1).unwrap().entries, vec![transition.entry]);
    }
}

/// After every update the current state equals the newest entry's new side
#[test]
fn test_state_and_log_agree_after_each_update() {
    let (state, log) = fresh_repos();
    let patches = [
        StatePatch::new().with_counter(1),
        StatePatch::new().with_message("a"),
        StatePatch::new(),
        StatePatch::new().with_counter(-10).with_message("b"),
    ];

    for (i, patch) in patches.iter().enumerate() {
        let transition = state.apply_update(patch).unwrap();
        let current = state.get_current_state().unwrap();
        assert_eq!(current, transition.new);

        let newest = log.list(1, 1).unwrap();
        assert_eq!(newest.total, (i + 1) as u64);
        assert_eq!(newest.entries[0].new_state(), current);
    }
}

// ============================================================================
// Paging Tests
// ============================================================================

#[test]
fn test_monotonic_descending_order() {
    let (state, log) = fresh_repos();
    let n = 12;
    for i in 0..n {
        state.apply_update(&StatePatch::new().with_counter(i)).unwrap();
    }

    let page = log.list(1, n as u64).unwrap();
    let ids: Vec<u64> = page.entries.iter().map(|e| e.id).collect();
    let expected: Vec<u64> = (1..=n as u64).rev().collect();
    assert_eq!(ids, expected);

    for pair in page.entries.windows(2) {
        assert!(pair[0].timestamp >= pair[1].timestamp);
        assert_eq!(pair[0].old_counter, pair[1].new_counter);
    }
}

#[test]
fn test_second_page_holds_oldest_entries() {
    let (state, log) = fresh_repos();
    for i in 1..=15 {
        state.apply_update(&StatePatch::new().with_counter(i)).unwrap();
    }

    let page = log.list(2, 10).unwrap();
    assert_eq!(page.total, 15);
    assert_eq!(page.total_pages, 2);
    let ids: Vec<u64> = page.entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![5, 4, 3, 2, 1]);
    let counters: Vec<i64> = page.entries.iter().map(|e| e.new_counter).collect();
    assert_eq!(counters, vec![5, 4, 3, 2, 1]);
}

#[test]
fn test_page_past_the_end_is_empty() {
    let (state, log) = fresh_repos();
    for i in 1..=3 {
        state.apply_update(&StatePatch::new().with_counter(i)).unwrap();
    }

    let page = log.list(5, 10).unwrap();
    assert!(page.entries.is_empty());
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 1);
}

#[test]
fn test_repeated_listing_is_stable() {
    let (state, log) = fresh_repos();
    for i in 1..=7 {
        state.apply_update(&StatePatch::new().with_counter(i)).unwrap();
    }

    let first = log.list(2, 3).unwrap();
    let second = log.list(2, 3).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_invalid_paging_arguments() {
    let (_state, log) = fresh_repos();
    for (page, limit) in [(0, 10), (1, 0), (1, 101)] {
        let err = log.list(page, limit).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)), "{page}/{limit}: {err}");
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

/// Two writers racing from the same starting state both land in the log
#[test]
fn test_concurrent_updates_are_not_lost() {
    let (state, log) = fresh_repos();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [1, 2]
        .into_iter()
        .map(|counter| {
            let state = state.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                state.apply_update(&StatePatch::new().with_counter(counter)).unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let page = log.list(1, 10).unwrap();
    assert_eq!(page.total, 2);

    let mut new_counters: Vec<i64> = page.entries.iter().map(|e| e.new_counter).collect();
    new_counters.sort();
    assert_eq!(new_counters, vec![1, 2]);

    // The later entry started from the earlier entry's result
    let (later, earlier) = (&page.entries[0], &page.entries[1]);
    assert_eq!(earlier.old_counter, 0);
    assert_eq!(later.old_counter, earlier.new_counter);
    assert_eq!(state.get_current_state().unwrap().counter, later.new_counter);
}

/// Many writers produce one unbroken chain of transitions
#[test]
fn test_many_writers_form_a_chain() {
    let (state, log) = fresh_repos();
    let writers = 8;
    let per_writer = 20;

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..per_writer {
                    let patch = StatePatch::new()
                        .with_counter(w * 1000 + i)
                        .with_message(format!("writer-{w}"));
                    state.apply_update(&patch).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = (writers * per_writer) as u64;
    let mut entries = Vec::new();
    let mut page = 1;
    loop {
        let result = log.list(page, 100).unwrap();
        assert_eq!(result.total, total);
        if result.entries.is_empty() {
            break;
        }
        entries.extend(result.entries);
        page += 1;
    }

    assert_eq!(entries.len() as u64, total);
    for pair in entries.windows(2) {
        assert_eq!(pair[0].id, pair[1].id + 1);
        assert_eq!(pair[0].old_state(), pair[1].new_state());
    }
    assert_eq!(state.get_current_state().unwrap(), entries[0].new_state());
}

// ============================================================================
// Durability Tests
// ============================================================================

#[test]
fn test_state_and_log_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = TallyDbConfig::at(temp_dir.path().join("tally.redb"));

    {
        let db = Arc::new(TallyDb::open(&config).unwrap());
        let state = StateRepository::new(db);
        state.apply_update(&StatePatch::new().with_counter(11)).unwrap();
        state.apply_update(&StatePatch::new().with_message("persisted")).unwrap();
    }

    let db = Arc::new(TallyDb::open(&config).unwrap());
    let state = StateRepository::new(db.clone());
    let log = AuditLog::new(db);

    assert_eq!(state.get_current_state().unwrap(), SharedState::new(11, "persisted"));
    assert_eq!(log.count().unwrap(), 2);

    // Ids continue after reopen
    let transition = state.apply_update(&StatePatch::new().with_counter(12)).unwrap();
    assert_eq!(transition.entry.id, 3);
}
