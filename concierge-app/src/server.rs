//! HTTP surface: chat streaming plus the cart and order endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use concierge_runtime::{ChatRequest, RuntimeError};
use concierge_store::StoreError;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::bootstrap::AppState;

const DEFAULT_ORDER_LIMIT: usize = 10;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// The owner's cart is held by another writer past the lock timeout.
    Busy(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Busy(message) => (StatusCode::CONFLICT, message),
            ApiError::Internal(message) => {
                error!("Request failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::InvalidRequest(_) | RuntimeError::Conversation(_) => {
                ApiError::BadRequest(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LockTimeout(_) => ApiError::Busy(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQuery {
    #[serde(default)]
    owner_key: String,
    limit: Option<usize>,
}

impl OwnerQuery {
    fn owner_key(&self) -> Result<&str, ApiError> {
        let owner_key = self.owner_key.trim();
        if owner_key.is_empty() {
            return Err(ApiError::BadRequest("ownerKey is required".into()));
        }
        Ok(owner_key)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route("/api/orders", get(list_orders))
        .route("/health", get(health))
        .with_state(state)
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let run = state.pipeline.start(request)?;
    info!(message_id = %run.message_id, "Streaming chat response");

    let events = run
        .into_events()
        .map(|event| Event::default().json_data(event));
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

async fn get_cart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Value>, ApiError> {
    let cart = state.store.active_cart(query.owner_key()?).await?;
    Ok(Json(json!(cart)))
}

async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Value>, ApiError> {
    let owner_key = query.owner_key()?;
    let _guard = state.locks.acquire(owner_key).await?;
    let abandoned = state.store.abandon_active_cart(owner_key).await?;
    Ok(Json(json!({
        "cleared": abandoned.is_some(),
        "cart": abandoned,
    })))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ORDER_LIMIT).clamp(1, 100);
    let orders = state.store.recent_orders(query.owner_key()?, limit).await?;
    Ok(Json(json!(orders)))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
