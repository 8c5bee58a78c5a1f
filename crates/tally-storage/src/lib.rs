//! # Tally Storage
//!
//! Persistent repositories for the Tally shared-state service, backed by
//! redb.
//!
//! ## Features
//!
//! - **TallyDb**: Database handle; creates tables and seeds the state row
//! - **StateRepository**: Reads and atomically transitions the singleton state
//! - **AuditLog**: Append-only update history with newest-first paging
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_core::StatePatch;
//! use tally_storage::{StateRepository, TallyDb};
//!
//! let db = Arc::new(TallyDb::in_memory()?);
//! let state = StateRepository::new(db.clone());
//!
//! let transition = state.apply_update(&StatePatch::new().with_counter(5))?;
//! assert_eq!(transition.entry.update_type, "counter");
//!
//! let page = state.audit_log().list(1, 10)?;
//! assert_eq!(page.total, 1);
//! ```

pub mod audit_log;
pub mod error;
pub mod state;
pub mod tables;

// Re-exports
pub use audit_log::AuditLog;
pub use error::StoreError;
pub use state::{StateRepository, StateTransition};
pub use tables::{TallyDb, TallyDbConfig};
