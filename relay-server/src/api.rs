use crate::exchange::{ExchangeEntry, ExchangeStore};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct AppState {
    pub exchange: ExchangeStore,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct StoreExchangeRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub payload: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreExchangeResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeResponse {
    pub id: String,
    #[serde(flatten)]
    pub entry: ExchangeEntry,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/exchange", post(store_exchange))
        .route("/api/exchange/{id}", get(get_exchange))
        .with_state(state)
}

/// GET /health
async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

/// POST /api/exchange - store a payload, generating an id when none is given
async fn store_exchange(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StoreExchangeRequest>,
) -> (StatusCode, Json<StoreExchangeResponse>) {
    let id = req
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    state.exchange.insert(id.clone(), req.payload);
    info!(id = %id, "stored exchange payload");
    (StatusCode::CREATED, Json(StoreExchangeResponse { id }))
}

/// GET /api/exchange/{id}
async fn get_exchange(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExchangeResponse>, (StatusCode, String)> {
    match state.exchange.get(&id) {
        Some(entry) => Ok(Json(ExchangeResponse { id, entry })),
        None => Err((StatusCode::NOT_FOUND, format!("no exchange payload for {}", id))),
    }
}
