use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use crate::services::dispatcher::CommandSink;
use crate::services::DeviceCache;

#[derive(Clone)]
pub struct HealthState {
    pub cache: Arc<DeviceCache>,
    pub dispatcher: Arc<dyn CommandSink>,
}

pub fn health_router(health_state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(health_state)
}

pub async fn health(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "gateway": state.dispatcher.is_connected(),
        "devices": state.cache.count().await,
        "timestamp": Utc::now(),
    }))
}
