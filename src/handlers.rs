//! HTTP handlers module.
//!
//! Webhook for change events, item upsert/read, dead-letter inspection and
//! replay, and a health check.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::models::{
    ChangeEvent, EnrichmentOutcome, ErrorResponse, HealthResponse, OperationType, ReplayResponse,
    WardrobeItem,
};
use crate::services::{DeadLetter, EnrichmentWorker};
use crate::store::StoreError;

/// Application state shared across handlers.
pub struct AppState {
    pub worker: Arc<EnrichmentWorker>,
    pub config: Config,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: Some(code.to_string()),
        }),
    )
}

fn rejection_error(rejection: JsonRejection) -> ApiError {
    api_error(rejection.status(), rejection.body_text(), "INVALID_BODY")
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::Validation(msg) => api_error(StatusCode::BAD_REQUEST, msg, "INVALID_ITEM"),
        other => {
            error!("Record store failed: {}", other);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other, "STORE_FAILED")
        }
    }
}

const ENDPOINTS: [&str; 5] = [
    "/health",
    "/events",
    "/items/:id",
    "/dead-letters",
    "/dead-letters/replay",
];

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", post(receive_event))
        .route("/items/:id", put(upsert_item).get(get_item))
        .route("/dead-letters", get(list_dead_letters))
        .route("/dead-letters/replay", post(replay_dead_letters))
        .with_state(state)
}

/// Health check endpoint.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let worker = &state.worker;
    let stored_items = worker.store().count().await.map_err(store_error)?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        service: "wardrobe-enricher".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: worker.provider_name().to_string(),
        model: worker.model().to_string(),
        dimension: worker.expected_dimension(),
        stats: worker.stats(),
        stored_items,
        dead_letters: worker.dead_letters().len().await,
        cache: worker.cache_stats(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
    }))
}

/// Accept one change event and report what the worker did with it.
pub async fn receive_event(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChangeEvent>, JsonRejection>,
) -> Result<Json<EnrichmentOutcome>, ApiError> {
    let Json(event) = payload.map_err(rejection_error)?;
    info!(
        op = ?event.operation_type,
        id = event.record_id().unwrap_or("<none>"),
        "Received change event"
    );
    Ok(Json(state.worker.handle(event).await))
}

/// Insert or replace an item. The store's change feed picks it up.
pub async fn upsert_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<WardrobeItem>, JsonRejection>,
) -> Result<(StatusCode, Json<WardrobeItem>), ApiError> {
    let Json(mut item) = payload.map_err(rejection_error)?;
    if item.id != id {
        if !item.id.is_empty() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("body _id {} does not match path {}", item.id, id),
                "ID_MISMATCH",
            ));
        }
        item.id = id;
    }

    let op = state
        .worker
        .store()
        .upsert(item.clone())
        .await
        .map_err(store_error)?;

    let status = match op {
        OperationType::Insert => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(item)))
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WardrobeItem>, ApiError> {
    match state.worker.store().get(&id).await.map_err(store_error)? {
        Some(item) => Ok(Json(item)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("no wardrobe item {}", id),
            "NOT_FOUND",
        )),
    }
}

pub async fn list_dead_letters(State(state): State<Arc<AppState>>) -> Json<Vec<DeadLetter>> {
    Json(state.worker.dead_letters().list().await)
}

pub async fn replay_dead_letters(State(state): State<Arc<AppState>>) -> Json<ReplayResponse> {
    let outcomes = state.worker.replay_dead_letters().await;
    Json(ReplayResponse {
        replayed: outcomes.len(),
        outcomes,
    })
}
