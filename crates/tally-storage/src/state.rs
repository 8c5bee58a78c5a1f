//! State repository
//!
//! Owns the singleton [`SharedState`] row. Every update reads the current
//! row, overlays the patch, rewrites the row and appends the audit entry
//! inside one redb write transaction. redb admits a single writer at a
//! time, so concurrent updates apply one after another and each sees the
//! state the previous one committed.

use std::sync::Arc;

use tally_core::{NewLogEntry, SharedState, StatePatch, UpdateLogEntry};
use tracing::{debug, instrument};

use crate::audit_log::{self, AuditLog};
use crate::error::StoreError;
use crate::tables::{CURRENT_KEY, SHARED_STATE, StoredState, TallyDb, load_state};

/// Result of a committed update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    /// State before the update
    pub old: SharedState,
    /// State after the update
    pub new: SharedState,
    /// Audit entry written in the same transaction
    pub entry: UpdateLogEntry,
}

/// State storage manager
#[derive(Debug, Clone)]
pub struct StateRepository {
    db: Arc<TallyDb>,
}

impl StateRepository {
    /// Create a new state repository over `db`
    pub fn new(db: Arc<TallyDb>) -> Self {
        Self { db }
    }

    /// Audit log sharing this repository's database
    pub fn audit_log(&self) -> AuditLog {
        AuditLog::new(self.db.clone())
    }

    /// Read the current state from the store
    pub fn get_current_state(&self) -> Result<SharedState, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHARED_STATE)?;
        Ok(load_state(&table)?.state())
    }

    /// Overlay `patch` on the current state and log the transition
    ///
    /// An empty patch still commits: `old == new` and the entry's
    /// `update_type` is `""`.
    #[instrument(skip(self, patch), fields(update_type = %patch.update_type()))]
    pub fn apply_update(&self, patch: &StatePatch) -> Result<StateTransition, StoreError> {
        self.transition(None, patch)
    }

    /// Like [`apply_update`](Self::apply_update), but only if the current
    /// state still equals `expected`
    ///
    /// Fails with [`StoreError::ConcurrencyConflict`] and writes nothing when
    /// another update got there first.
    #[instrument(skip(self, expected, patch), fields(update_type = %patch.update_type()))]
    pub fn apply_update_if(
        &self,
        expected: &SharedState,
        patch: &StatePatch,
    ) -> Result<StateTransition, StoreError> {
        self.transition(Some(expected), patch)
    }

    fn transition(
        &self,
        expected: Option<&SharedState>,
        patch: &StatePatch,
    ) -> Result<StateTransition, StoreError> {
        let txn = self.db.begin_write()?;

        let old = {
            let table = txn.open_table(SHARED_STATE)?;
            load_state(&table)?.state()
        };

        if let Some(expected) = expected {
            if *expected != old {
                txn.abort()?;
                return Err(StoreError::conflict(format!(
                    "expected counter={} message={:?}, found counter={} message={:?}",
                    expected.counter, expected.message, old.counter, old.message
                )));
            }
        }

        let fields = NewLogEntry::from_patch(&old, patch);
        let new = fields.new.clone();

        {
            let mut table = txn.open_table(SHARED_STATE)?;
            let row = StoredState::new(&new, self.db.clock().now_utc());
            table.insert(CURRENT_KEY, row.encode()?.as_slice())?;
        }
        let entry = audit_log::append_in(&txn, self.db.clock(), fields)?;

        txn.commit()?;

        debug!(
            id = entry.id,
            old_counter = old.counter,
            new_counter = new.counter,
            "Applied state update"
        );
        Ok(StateTransition { old, new, entry })
    }
}
