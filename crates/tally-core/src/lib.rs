//! # Tally Core
//!
//! Core types, paging rules, and errors for the Tally shared-state service.
//!
//! Tally keeps a single mutable `{counter, message}` record and an
//! append-only audit log of every update applied to it. This crate holds
//! the storage-agnostic parts of that model so the repositories and the
//! HTTP surface agree on one vocabulary.
//!
//! ## Key Types
//!
//! - [`SharedState`]: The singleton counter/message record
//! - [`StatePatch`]: A partial update; absent fields keep their old value
//! - [`UpdateLogEntry`]: One immutable audit record per applied update
//! - [`PageRequest`] / [`LogPage`]: Validated paging over the audit log
//! - [`Clock`]: Time abstraction for testability

pub mod clock;
pub mod error;
pub mod log;
pub mod state;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use log::{DEFAULT_LIMIT, DEFAULT_PAGE, LogPage, MAX_LIMIT, NewLogEntry, PageRequest, UpdateLogEntry};
pub use state::{SharedState, StatePatch, UpdateField};
