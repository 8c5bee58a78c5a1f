//! Audit log repository
//!
//! Append-only history of state transitions. Ids are assigned as
//! `last + 1` inside a write transaction and entries are never removed,
//! so the table always holds exactly the ids `1..=len`. Listing relies on
//! that to turn a page into a direct id range instead of a scan.

use std::sync::Arc;

use chrono::DateTime;
use redb::{ReadableTable, ReadableTableMetadata, WriteTransaction};
use tally_core::{Clock, LogPage, NewLogEntry, PageRequest, UpdateLogEntry};
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::tables::{StoredLogEntry, TallyDb, UPDATE_LOG};

/// Append `fields` inside an open write transaction
///
/// Timestamps are stored at millisecond precision, so the entry is stamped
/// at that precision too and reads back identical. The reading is clamped
/// to be no earlier than the previous entry's, keeping id order and time
/// order identical.
pub(crate) fn append_in(
    txn: &WriteTransaction,
    clock: &dyn Clock,
    fields: NewLogEntry,
) -> Result<UpdateLogEntry, StoreError> {
    let mut table = txn.open_table(UPDATE_LOG)?;

    let previous = match table.last()? {
        Some((id, value)) => {
            let last = StoredLogEntry::decode(value.value())?;
            Some((id.value(), last.timestamp_millis))
        }
        None => None,
    };

    let now_millis = clock.now_utc().timestamp_millis();
    let (id, millis) = match previous {
        Some((last_id, floor)) => {
            let id = last_id
                .checked_add(1)
                .ok_or_else(|| StoreError::corrupted("update log id space exhausted"))?;
            (id, now_millis.max(floor))
        }
        None => (1, now_millis),
    };
    let timestamp = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::corrupted(format!("timestamp {millis} out of range")))?;

    let entry = UpdateLogEntry::new(id, timestamp, fields);
    let value = StoredLogEntry::from_entry(&entry).encode()?;
    table.insert(id, value.as_slice())?;

    Ok(entry)
}

/// Audit log storage manager
#[derive(Debug, Clone)]
pub struct AuditLog {
    db: Arc<TallyDb>,
}

impl AuditLog {
    /// Create a new audit log over `db`
    pub fn new(db: Arc<TallyDb>) -> Self {
        Self { db }
    }

    /// Append an entry in its own transaction
    ///
    /// State updates append through the state repository instead, so the
    /// entry commits together with the state row.
    #[instrument(skip(self, fields), fields(update_type = %fields.update_type))]
    pub fn append(&self, fields: NewLogEntry) -> Result<UpdateLogEntry, StoreError> {
        let txn = self.db.begin_write()?;
        let entry = append_in(&txn, self.db.clock(), fields)?;
        txn.commit()?;

        debug!(id = entry.id, "Appended audit entry");
        Ok(entry)
    }

    /// Newest-first page of the log
    ///
    /// Rejects `page < 1` and `limit` outside `1..=100` with
    /// [`StoreError::InvalidArgument`].
    pub fn list(&self, page: u64, limit: u64) -> Result<LogPage, StoreError> {
        let request = PageRequest::new(page, limit)?;
        self.list_page(request)
    }

    /// Newest-first page of the log for an already validated request
    #[instrument(skip(self), fields(page = request.page(), limit = request.limit()))]
    pub fn list_page(&self, request: PageRequest) -> Result<LogPage, StoreError> {
        // Count and entries come from one snapshot
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(UPDATE_LOG)?;
        let total = table.len()?;

        let mut entries = Vec::with_capacity(request.limit() as usize);
        if let Some(ids) = request.id_range(total) {
            for item in table.range(ids)?.rev() {
                let (id, value) = item?;
                entries.push(StoredLogEntry::decode(value.value())?.into_entry(id.value())?);
            }
        }

        debug!(total, returned = entries.len(), "Listed audit entries");
        Ok(LogPage::new(request, entries, total))
    }

    /// Look up a single entry
    pub fn get(&self, id: u64) -> Result<Option<UpdateLogEntry>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(UPDATE_LOG)?;

        match table.get(id)? {
            Some(value) => Ok(Some(StoredLogEntry::decode(value.value())?.into_entry(id)?)),
            None => Ok(None),
        }
    }

    /// Number of committed entries
    pub fn count(&self) -> Result<u64, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(UPDATE_LOG)?;
        Ok(table.len()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tally_core::{ManualClock, SharedState, StatePatch};

    fn fields(counter: i64) -> NewLogEntry {
        NewLogEntry::from_patch(&SharedState::default(), &StatePatch::new().with_counter(counter))
    }

    fn create_test_log() -> AuditLog {
        AuditLog::new(Arc::new(TallyDb::in_memory().unwrap()))
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let log = create_test_log();

        for i in 1..=3 {
            let entry = log.append(fields(i)).unwrap();
            assert_eq!(entry.id, i as u64);
            assert_eq!(entry.new_counter, i);
        }
        assert_eq!(log.count().unwrap(), 3);
    }

    #[test]
    fn test_get_round_trips_entry() {
        let log = create_test_log();
        let appended = log.append(fields(7)).unwrap();

        let fetched = log.get(appended.id).unwrap().unwrap();
        assert_eq!(fetched, appended);
        assert_eq!(fetched.update_type, "counter");
        assert!(log.get(99).unwrap().is_none());
    }

    #[test]
    fn test_empty_log_page() {
        let log = create_test_log();
        let page = log.list(1, 10).unwrap();

        assert!(page.entries.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_list_rejects_out_of_range_arguments() {
        let log = create_test_log();

        assert!(matches!(log.list(0, 10), Err(StoreError::InvalidArgument(_))));
        assert!(matches!(log.list(1, 0), Err(StoreError::InvalidArgument(_))));
        assert!(matches!(log.list(1, 101), Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let db = TallyDb::in_memory_with_clock(clock.clone()).unwrap();
        let log = AuditLog::new(Arc::new(db));

        let first = log.append(fields(1)).unwrap();
        clock.set(start - Duration::hours(1));
        let second = log.append(fields(2)).unwrap();
        clock.set(start + Duration::seconds(5));
        let third = log.append(fields(3)).unwrap();

        assert_eq!(first.timestamp, start);
        assert_eq!(second.timestamp, start);
        assert_eq!(third.timestamp, start + Duration::seconds(5));
    }

    #[test]
    fn test_sub_millisecond_clock_reads_back_identical() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
            + Duration::nanoseconds(123_456_789);
        let clock = Arc::new(ManualClock::new(start));
        let db = TallyDb::in_memory_with_clock(clock.clone()).unwrap();
        let log = AuditLog::new(Arc::new(db));

        let first = log.append(fields(1)).unwrap();
        assert_eq!(first.timestamp.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(log.get(first.id).unwrap().unwrap(), first);

        // same millisecond, later nanoseconds: still not before the first entry
        clock.set(start + Duration::nanoseconds(500_000));
        let second = log.append(fields(2)).unwrap();
        assert_eq!(second.timestamp, first.timestamp);

        let page = log.list(1, 10).unwrap();
        assert_eq!(page.entries, vec![second, first]);
    }
}
