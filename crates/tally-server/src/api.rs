//! Request and response bodies
//!
//! Field names are the ones existing clients already consume.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{LogPage, SharedState, StatePatch, UpdateLogEntry};
use tally_storage::StateTransition;

use crate::error::ApiError;

pub const APP_TITLE: &str = "Shared State API";
pub const APP_VERSION: &str = "1.0.0";

/// Render a timestamp as RFC 3339 UTC with a trailing `Z`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub endpoints: serde_json::Map<String, serde_json::Value>,
}

impl RootResponse {
    pub fn describe() -> Self {
        let mut endpoints = serde_json::Map::new();
        endpoints.insert("GET /status".into(), "Get current state with metadata".into());
        endpoints.insert("POST /update".into(), "Update shared state (requires API key)".into());
        endpoints.insert("GET /logs".into(), "Get paginated update logs".into());
        Self {
            message: APP_TITLE.into(),
            version: APP_VERSION.into(),
            endpoints,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub counter: i64,
    pub message: String,
    pub timestamp: String,
    pub uptime_seconds: f64,
}

/// Body of `POST /update`
///
/// `null` is treated the same as an absent field. Unknown fields are
/// ignored.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub counter: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl UpdateRequest {
    /// Convert into a patch, rejecting requests that set no field
    pub fn into_patch(self) -> Result<StatePatch, ApiError> {
        let patch = StatePatch {
            counter: self.counter,
            message: self.message,
        };
        if patch.is_empty() {
            return Err(ApiError::Validation(
                "At least one of counter or message must be provided".into(),
            ));
        }
        Ok(patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateView {
    pub counter: i64,
    pub message: String,
}

impl From<SharedState> for StateView {
    fn from(state: SharedState) -> Self {
        Self {
            counter: state.counter,
            message: state.message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub message: String,
    pub old_state: StateView,
    pub new_state: StateView,
}

impl From<StateTransition> for UpdateResponse {
    fn from(transition: StateTransition) -> Self {
        Self {
            success: true,
            message: "State updated successfully".into(),
            old_state: transition.old.into(),
            new_state: transition.new.into(),
        }
    }
}

/// Query string of `GET /logs`
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntryView {
    pub id: u64,
    pub timestamp: String,
    pub old_counter: i64,
    pub new_counter: i64,
    pub old_message: String,
    pub new_message: String,
    pub update_type: String,
}

impl From<UpdateLogEntry> for LogEntryView {
    fn from(entry: UpdateLogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp: format_timestamp(entry.timestamp),
            old_counter: entry.old_counter,
            new_counter: entry.new_counter,
            old_message: entry.old_message,
            new_message: entry.new_message,
            update_type: entry.update_type,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntryView>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl From<LogPage> for LogsResponse {
    fn from(page: LogPage) -> Self {
        Self {
            logs: page.entries.into_iter().map(LogEntryView::from).collect(),
            page: page.page,
            limit: page.limit,
            total: page.total,
            total_pages: page.total_pages,
        }
    }
}
