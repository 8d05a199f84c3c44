use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ApiError, AuthError, DeviceError};
use crate::middlewares::{auth, TokenState};
use crate::models::EnergyData;
use crate::repositories::{DeviceRepository, EnergyDataRepository};
use crate::services::{Clock, TokenClaims};

#[derive(Debug, Clone, Deserialize)]
pub struct EnergyQuery {
    pub period: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergySampleRequest {
    pub power_kw: f64,
    pub energy_kwh: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyResponse {
    pub device_id: String,
    pub period: String,
    pub count: usize,
    pub data: Vec<EnergyData>,
}

#[derive(Clone)]
pub struct EnergyState {
    pub energy_repository: Arc<EnergyDataRepository>,
    pub device_repository: Arc<DeviceRepository>,
    pub clock: Arc<dyn Clock>,
}

pub fn energy_router(energy_state: EnergyState, token_state: TokenState) -> Router {
    Router::new()
        .route(
            "/api/devices/:device_id/energy",
            get(get_energy).post(add_energy).delete(clear_energy),
        )
        .route("/api/devices/:device_id/energy/stats", get(get_energy_stats))
        .route_layer(middleware::from_fn_with_state(token_state, auth))
        .with_state(energy_state)
}

fn user_id(token_data: &TokenClaims) -> Result<i32, ApiError> {
    token_data
        .sub
        .parse()
        .map_err(|_| AuthError::InvalidToken.into())
}

/// Unknown period strings fall back to the 24h window rather than
/// erroring, `all` means no lower bound.
fn period_start(period: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match period {
        "1h" => Some(now - Duration::hours(1)),
        "6h" => Some(now - Duration::hours(6)),
        "24h" => Some(now - Duration::hours(24)),
        "7d" => Some(now - Duration::days(7)),
        "30d" => Some(now - Duration::days(30)),
        "all" => None,
        _ => Some(now - Duration::hours(24)),
    }
}

pub async fn get_energy(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    Query(query): Query<EnergyQuery>,
    State(state): State<EnergyState>,
) -> Result<Json<EnergyResponse>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.has_access(user_id, &device_id).await? {
        return Err(DeviceError::AccessDenied.into());
    }

    let period = query.period.unwrap_or_else(|| "24h".into());
    let limit = query.limit.unwrap_or(1000).clamp(1, 10_000);
    let since = period_start(&period, state.clock.now());

    let data = state
        .energy_repository
        .find_since(&device_id, since, limit)
        .await?;

    Ok(Json(EnergyResponse {
        device_id,
        period,
        count: data.len(),
        data,
    }))
}

/// Fallback ingest path for controllers that cannot reach the broker.
pub async fn add_energy(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    State(state): State<EnergyState>,
    Json(body): Json<EnergySampleRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.has_access(user_id, &device_id).await? {
        return Err(DeviceError::AccessDenied.into());
    }

    let timestamp = body.timestamp.unwrap_or_else(|| state.clock.now());
    let id = state
        .energy_repository
        .insert(&device_id, body.power_kw, body.energy_kwh, timestamp)
        .await?;

    Ok(Json(json!({
        "success": true,
        "id": id,
        "message": "Energy data saved successfully",
    })))
}

pub async fn clear_energy(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    State(state): State<EnergyState>,
) -> Result<Json<Value>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.is_owner(user_id, &device_id).await? {
        return Err(DeviceError::NotOwner.into());
    }

    let deleted = state.energy_repository.delete_for_device(&device_id).await?;

    tracing::info!(device_id = %device_id, deleted, "energy data cleared");

    Ok(Json(json!({
        "success": true,
        "deletedCount": deleted,
        "message": "Energy data cleared successfully",
    })))
}

pub async fn get_energy_stats(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    Query(query): Query<EnergyQuery>,
    State(state): State<EnergyState>,
) -> Result<Json<Value>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.has_access(user_id, &device_id).await? {
        return Err(DeviceError::AccessDenied.into());
    }

    let period = query.period.unwrap_or_else(|| "24h".into());
    let since = period_start(&period, state.clock.now());

    let stats = state.energy_repository.stats_since(&device_id, since).await?;

    let start_energy = stats.start_energy.unwrap_or(0.0);
    let end_energy = stats.end_energy.unwrap_or(0.0);

    Ok(Json(json!({
        "deviceId": device_id,
        "period": period,
        "stats": {
            "totalRecords": stats.total_records,
            "power": {
                "min": stats.min_power.unwrap_or(0.0),
                "max": stats.max_power.unwrap_or(0.0),
                "avg": stats.avg_power.unwrap_or(0.0),
            },
            "energy": {
                "start": start_energy,
                "end": end_energy,
                "generated": end_energy - start_energy,
            },
            "period": {
                "start": stats.period_start,
                "end": stats.period_end,
            },
        },
    })))
}
