//! Error types for Tally core

use thiserror::Error;

/// Errors raised while validating caller input against the core rules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Page numbers start at 1
    #[error("page must be at least 1, got {0}")]
    InvalidPage(u64),

    /// Limit is outside `1..=max`
    #[error("limit must be between 1 and {max}, got {limit}")]
    InvalidLimit { limit: u64, max: u64 },
}
