use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ApiError, AuthError, DeviceError, ModeError};
use crate::middlewares::{auth, TokenState};
use crate::models::{ChangedBy, Mode};
use crate::repositories::{DeviceRepository, EnergyModeRepository, ModeHistoryEntry};
use crate::services::dispatcher::{commands, CommandSink};
use crate::services::{Clock, TokenClaims};

#[derive(Debug, Clone, Deserialize)]
pub struct SetModeRequest {
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeResponse {
    pub device_id: String,
    pub current_mode: String,
    pub last_changed: chrono::DateTime<chrono::Utc>,
    pub changed_by: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub device_id: String,
    pub count: usize,
    pub history: Vec<ModeHistoryEntry>,
}

#[derive(Clone)]
pub struct ModeState {
    pub mode_repository: Arc<EnergyModeRepository>,
    pub device_repository: Arc<DeviceRepository>,
    pub dispatcher: Arc<dyn CommandSink>,
    pub clock: Arc<dyn Clock>,
}

pub fn mode_router(mode_state: ModeState, token_state: TokenState) -> Router {
    Router::new()
        .route(
            "/api/devices/:device_id/energy-mode",
            get(get_mode).post(set_mode),
        )
        .route(
            "/api/devices/:device_id/energy-mode/history",
            get(get_history),
        )
        .route_layer(middleware::from_fn_with_state(token_state, auth))
        .with_state(mode_state)
}

fn user_id(token_data: &TokenClaims) -> Result<i32, ApiError> {
    token_data
        .sub
        .parse()
        .map_err(|_| AuthError::InvalidToken.into())
}

/// A device that was never switched reads as solar; the default row
/// is written on first read so history attribution stays consistent.
pub async fn get_mode(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    State(state): State<ModeState>,
) -> Result<Json<ModeResponse>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.has_access(user_id, &device_id).await? {
        return Err(DeviceError::AccessDenied.into());
    }

    let mode = state.mode_repository.get_or_default(&device_id).await?;

    Ok(Json(ModeResponse {
        device_id: mode.device_id,
        current_mode: mode.current_mode,
        last_changed: mode.last_changed,
        changed_by: mode.changed_by,
    }))
}

pub async fn set_mode(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    State(state): State<ModeState>,
    Json(body): Json<SetModeRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = user_id(&token_data)?;

    let mode: Mode = body.mode.parse().map_err(|_| ModeError::InvalidMode)?;

    if !state.device_repository.has_access(user_id, &device_id).await? {
        return Err(DeviceError::AccessDenied.into());
    }

    // Idempotent repeat: no ledger entry, no command.
    let current = state
        .mode_repository
        .get(&device_id)
        .await?
        .and_then(|m| m.mode());
    if current == Some(mode) {
        return Ok(Json(json!({
            "success": true,
            "message": format!("Mode already set to {}", mode),
            "currentMode": mode.as_str(),
        })));
    }

    let previous = state
        .mode_repository
        .set_mode(&device_id, mode, ChangedBy::Manual, None)
        .await?;

    tracing::info!(
        device_id = %device_id,
        from = ?previous,
        to = %mode,
        "manual mode change"
    );

    let now = state.clock.now();
    if let Err(e) = state
        .dispatcher
        .publish_command(
            &device_id,
            commands::set_energy_mode(mode, ChangedBy::Manual, None, now.timestamp_millis()),
        )
        .await
    {
        tracing::error!(device_id = %device_id, "failed to send mode command: {}", e);
    }

    Ok(Json(json!({
        "success": true,
        "deviceId": device_id,
        "currentMode": mode.as_str(),
        "previousMode": previous.map(Mode::as_str),
        "changedBy": ChangedBy::Manual.as_str(),
        "timestamp": now,
    })))
}

pub async fn get_history(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<ModeState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.has_access(user_id, &device_id).await? {
        return Err(DeviceError::AccessDenied.into());
    }

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let history = state.mode_repository.find_history(&device_id, limit).await?;

    Ok(Json(HistoryResponse {
        device_id,
        count: history.len(),
        history,
    }))
}
