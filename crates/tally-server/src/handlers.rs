//! HTTP route handlers

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use chrono::Utc;
use tally_core::{DEFAULT_LIMIT, DEFAULT_PAGE, PageRequest, StatePatch};
use tally_storage::{AuditLog, StateRepository, StateTransition, StoreError, TallyDb};
use tracing::{debug, info, instrument};

use crate::api::{
    LogsQuery, LogsResponse, RootResponse, StatusResponse, UpdateRequest, UpdateResponse,
    format_timestamp,
};
use crate::auth::ApiKey;
use crate::error::ApiError;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub repository: StateRepository,
    pub audit_log: AuditLog,
    pub api_key: ApiKey,
    pub started_at: Instant,
    pub max_conflict_retries: u32,
}

impl AppState {
    pub fn new(db: Arc<TallyDb>, api_key: ApiKey, max_conflict_retries: u32) -> Self {
        let repository = StateRepository::new(db);
        Self {
            audit_log: repository.audit_log(),
            repository,
            api_key,
            started_at: Instant::now(),
            max_conflict_retries,
        }
    }

    fn uptime_seconds(&self) -> f64 {
        (self.started_at.elapsed().as_secs_f64() * 100.0).round() / 100.0
    }
}

/// Run `op` again while it fails with a concurrency conflict
///
/// Makes at most `max_retries + 1` attempts; any other error is returned
/// immediately.
pub fn retry_on_conflict<T, F>(max_retries: u32, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Err(StoreError::ConcurrencyConflict(reason)) if attempt < max_retries => {
                attempt += 1;
                debug!(attempt, %reason, "Retrying update after conflict");
            }
            result => return result,
        }
    }
}

/// Apply `patch` on top of a fresh read of the state
///
/// The write only commits if nothing else committed since the read;
/// otherwise the read and write are repeated up to `max_retries` times.
pub fn apply_patch(
    repository: &StateRepository,
    patch: &StatePatch,
    max_retries: u32,
) -> Result<StateTransition, StoreError> {
    retry_on_conflict(max_retries, || {
        let current = repository.get_current_state()?;
        repository.apply_update_if(&current, patch)
    })
}

/// Handle GET /
pub async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse::describe())
}

/// Handle GET /status
pub async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let repository = state.repository.clone();
    let current = tokio::task::spawn_blocking(move || repository.get_current_state()).await??;

    Ok(Json(StatusResponse {
        counter: current.counter,
        message: current.message,
        timestamp: format_timestamp(Utc::now()),
        uptime_seconds: state.uptime_seconds(),
    }))
}

/// Handle POST /update
///
/// The API key is checked by middleware before this runs.
#[instrument(skip_all)]
pub async fn handle_update(
    State(state): State<AppState>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let Json(request) = body?;
    let patch: StatePatch = request.into_patch()?;

    let repository = state.repository.clone();
    let retries = state.max_conflict_retries;
    let transition =
        tokio::task::spawn_blocking(move || apply_patch(&repository, &patch, retries)).await??;

    info!(
        log_id = transition.entry.id,
        update_type = %transition.entry.update_type,
        old_counter = transition.old.counter,
        new_counter = transition.new.counter,
        "State updated"
    );
    Ok(Json(UpdateResponse::from(transition)))
}

/// Handle GET /logs
pub async fn handle_logs(
    State(state): State<AppState>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<LogsResponse>, ApiError> {
    let Query(params) = query?;
    let request = PageRequest::new(
        params.page.unwrap_or(DEFAULT_PAGE),
        params.limit.unwrap_or(DEFAULT_LIMIT),
    )
    .map_err(|e| ApiError::Validation(e.to_string()))?;

    let audit_log = state.audit_log.clone();
    let page = tokio::task::spawn_blocking(move || audit_log.list_page(request)).await??;
    Ok(Json(LogsResponse::from(page)))
}
