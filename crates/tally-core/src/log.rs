//! Audit log records and paging
//!
//! Every applied update produces exactly one [`UpdateLogEntry`]. Entries
//! are numbered from 1 with no gaps, so a page of the newest-first view
//! maps to a contiguous id range; [`PageRequest::id_range`] does that
//! arithmetic once for every backend.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::state::{SharedState, StatePatch};

/// First page number
pub const DEFAULT_PAGE: u64 = 1;

/// Page size when the caller does not pick one
pub const DEFAULT_LIMIT: u64 = 10;

/// Largest accepted page size
pub const MAX_LIMIT: u64 = 100;

/// Fields of a log record before the store assigns `id` and `timestamp`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    /// State before the update
    pub old: SharedState,
    /// State after the update
    pub new: SharedState,
    /// Comma-joined list of fields present in the request
    pub update_type: String,
}

impl NewLogEntry {
    /// Describe the transition `old -> patch.apply_to(old)`
    pub fn from_patch(old: &SharedState, patch: &StatePatch) -> Self {
        Self {
            old: old.clone(),
            new: patch.apply_to(old),
            update_type: patch.update_type(),
        }
    }
}

/// One immutable audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLogEntry {
    /// Store-assigned id, strictly increasing from 1
    pub id: u64,
    /// Insertion time; never earlier than the previous entry's
    pub timestamp: DateTime<Utc>,
    pub old_counter: i64,
    pub new_counter: i64,
    pub old_message: String,
    pub new_message: String,
    /// Fields present in the request, e.g. `"counter, message"`
    pub update_type: String,
}

impl UpdateLogEntry {
    /// Assemble a stored entry from its parts
    pub fn new(id: u64, timestamp: DateTime<Utc>, fields: NewLogEntry) -> Self {
        Self {
            id,
            timestamp,
            old_counter: fields.old.counter,
            new_counter: fields.new.counter,
            old_message: fields.old.message,
            new_message: fields.new.message,
            update_type: fields.update_type,
        }
    }

    /// State before this update
    pub fn old_state(&self) -> SharedState {
        SharedState::new(self.old_counter, self.old_message.clone())
    }

    /// State after this update
    pub fn new_state(&self) -> SharedState {
        SharedState::new(self.new_counter, self.new_message.clone())
    }
}

/// A validated `(page, limit)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Validate `page >= 1` and `1 <= limit <= MAX_LIMIT`
    ///
    /// Out-of-range values are rejected, never clamped.
    pub fn new(page: u64, limit: u64) -> Result<Self, CoreError> {
        if page < 1 {
            return Err(CoreError::InvalidPage(page));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(CoreError::InvalidLimit {
                limit,
                max: MAX_LIMIT,
            });
        }
        Ok(Self { page, limit })
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of newest entries skipped before this page
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// `ceil(total / limit)`, which is 0 for an empty log
    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }

    /// Ids covered by this page when the log holds ids `1..=total`
    ///
    /// Returns `None` when the page starts past the oldest entry.
    pub fn id_range(&self, total: u64) -> Option<RangeInclusive<u64>> {
        let offset = self.offset();
        if offset >= total {
            return None;
        }
        let newest = total - offset;
        let oldest = (newest + 1).saturating_sub(self.limit).max(1);
        Some(oldest..=newest)
    }
}

/// One page of the newest-first audit log view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    /// Entries in descending id order
    pub entries: Vec<UpdateLogEntry>,
    pub page: u64,
    pub limit: u64,
    /// All committed entries at read time
    pub total: u64,
    pub total_pages: u64,
}

impl LogPage {
    /// Build a page from entries read in one snapshot with `total`
    pub fn new(request: PageRequest, entries: Vec<UpdateLogEntry>, total: u64) -> Self {
        Self {
            entries,
            page: request.page(),
            limit: request.limit(),
            total,
            total_pages: request.total_pages(total),
        }
    }
}
