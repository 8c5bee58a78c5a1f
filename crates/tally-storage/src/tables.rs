//! redb table definitions and database handle
//!
//! Two tables make up the persisted layout:
//!
//! - `shared_state`: one row under [`CURRENT_KEY`] holding the current record
//! - `update_log`: append-only entries keyed by id (`1..=n`, no gaps)
//!
//! Both are created idempotently on open, and the state row is seeded with
//! defaults the first time.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::backends::InMemoryBackend;
use redb::{
    Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tally_core::{Clock, SharedState, SystemClock, UpdateLogEntry};
use tracing::{debug, info, instrument};

use crate::error::StoreError;

// Key: CURRENT_KEY, Value: serialized StoredState
pub const SHARED_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("shared_state");

// Key: entry id, Value: serialized StoredLogEntry
pub const UPDATE_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("update_log");

/// Key of the singleton state row
pub const CURRENT_KEY: &str = "current";

/// Configuration for an on-disk database
#[derive(Debug, Clone)]
pub struct TallyDbConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Cache size in bytes
    pub cache_size: usize,
}

impl Default for TallyDbConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/tally.redb"),
            cache_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl TallyDbConfig {
    /// Config for a database file at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            ..Default::default()
        }
    }
}

/// Persisted form of [`SharedState`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredState {
    pub counter: i64,
    pub message: String,
    /// Time of the last transition, or of seeding (Unix millis)
    pub updated_at_millis: i64,
}

impl StoredState {
    pub fn new(state: &SharedState, updated_at: DateTime<Utc>) -> Self {
        Self {
            counter: state.counter,
            message: state.message.clone(),
            updated_at_millis: updated_at.timestamp_millis(),
        }
    }

    pub fn state(&self) -> SharedState {
        SharedState::new(self.counter, self.message.clone())
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        postcard::to_allocvec(self).map_err(|e| StoreError::Corrupted(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Persisted form of [`UpdateLogEntry`]; the id lives in the key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredLogEntry {
    pub timestamp_millis: i64,
    pub old_counter: i64,
    pub new_counter: i64,
    pub old_message: String,
    pub new_message: String,
    pub update_type: String,
}

impl StoredLogEntry {
    pub fn from_entry(entry: &UpdateLogEntry) -> Self {
        Self {
            timestamp_millis: entry.timestamp.timestamp_millis(),
            old_counter: entry.old_counter,
            new_counter: entry.new_counter,
            old_message: entry.old_message.clone(),
            new_message: entry.new_message.clone(),
            update_type: entry.update_type.clone(),
        }
    }

    pub fn into_entry(self, id: u64) -> Result<UpdateLogEntry, StoreError> {
        let timestamp = DateTime::from_timestamp_millis(self.timestamp_millis).ok_or_else(|| {
            StoreError::corrupted(format!(
                "log entry {id} has out-of-range timestamp {}",
                self.timestamp_millis
            ))
        })?;
        Ok(UpdateLogEntry {
            id,
            timestamp,
            old_counter: self.old_counter,
            new_counter: self.new_counter,
            old_message: self.old_message,
            new_message: self.new_message,
            update_type: self.update_type,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        postcard::to_allocvec(self).map_err(|e| StoreError::Corrupted(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Read the singleton state row from any readable view of the table
pub(crate) fn load_state<T>(table: &T) -> Result<StoredState, StoreError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(CURRENT_KEY)? {
        Some(value) => StoredState::decode(value.value()),
        None => Err(StoreError::unavailable("shared state row is missing")),
    }
}

/// Database handle shared by the repositories
pub struct TallyDb {
    db: Database,
    clock: Arc<dyn Clock>,
    location: Option<PathBuf>,
}

impl std::fmt::Debug for TallyDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TallyDb")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl TallyDb {
    /// Open or create the database file described by `config`
    pub fn open(config: &TallyDbConfig) -> Result<Self, StoreError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open or create the database file, stamping entries with `clock`
    #[instrument(skip(config, clock), fields(path = %config.db_path.display()))]
    pub fn open_with_clock(config: &TallyDbConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::builder()
            .set_cache_size(config.cache_size)
            .create(&config.db_path)?;

        info!("Opened redb database");

        let storage = Self {
            db,
            clock,
            location: Some(config.db_path.clone()),
        };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Fresh, isolated in-memory database
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::in_memory_with_clock(Arc::new(SystemClock))
    }

    /// Fresh in-memory database stamping entries with `clock`
    pub fn in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        let storage = Self {
            db,
            clock,
            location: None,
        };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Create both tables and seed the default state row if absent
    fn init_tables(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        let seeded = {
            let mut state = write_txn.open_table(SHARED_STATE)?;
            let missing = state.get(CURRENT_KEY)?.is_none();
            if missing {
                let row = StoredState::new(&SharedState::default(), self.clock.now_utc());
                state.insert(CURRENT_KEY, row.encode()?.as_slice())?;
            }
            missing
        };
        write_txn.open_table(UPDATE_LOG)?;
        write_txn.commit()?;

        debug!(seeded, "Initialized redb tables");
        Ok(())
    }

    pub(crate) fn begin_write(&self) -> Result<WriteTransaction, StoreError> {
        Ok(self.db.begin_write()?)
    }

    pub(crate) fn begin_read(&self) -> Result<ReadTransaction, StoreError> {
        Ok(self.db.begin_read()?)
    }

    /// Clock used for log timestamps
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Database file path, `None` for in-memory databases
    pub fn location(&self) -> Option<&PathBuf> {
        self.location.as_ref()
    }
}
