use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{middleware, Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ApiError, AuthError, DeviceError};
use crate::middlewares::{auth, TokenState};
use crate::models::User;
use crate::repositories::{
    DeviceRepository, EnergyDataRepository, EnergyModeRepository, ScheduleRepository,
    UserRepository,
};
use crate::services::device_cache::DeviceStatus;
use crate::services::dispatcher::{commands, CommandSink};
use crate::services::{DeviceCache, TokenClaims};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDeviceRequest {
    pub device_id: String,
    pub confirmation_code: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareDeviceRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    pub command: String,
    pub state: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub id: i32,
    pub device_id: String,
    pub name: String,
    pub is_owner: bool,
    pub status: DeviceStatus,
}

#[derive(Clone)]
pub struct DeviceState {
    pub device_repository: Arc<DeviceRepository>,
    pub user_repository: Arc<UserRepository>,
    pub schedule_repository: Arc<ScheduleRepository>,
    pub mode_repository: Arc<EnergyModeRepository>,
    pub energy_repository: Arc<EnergyDataRepository>,
    pub cache: Arc<DeviceCache>,
    pub dispatcher: Arc<dyn CommandSink>,
}

pub fn device_router(device_state: DeviceState, token_state: TokenState) -> Router {
    Router::new()
        .route("/api/devices", get(get_devices).post(add_device))
        .route("/api/devices/:device_id", delete(delete_device))
        .route("/api/devices/:device_id/share", post(share_device))
        .route("/api/devices/:device_id/control", post(control_device))
        .route("/api/users", get(get_users))
        .route_layer(middleware::from_fn_with_state(token_state, auth))
        .with_state(device_state)
}

fn user_id(token_data: &TokenClaims) -> Result<i32, ApiError> {
    token_data
        .sub
        .parse()
        .map_err(|_| AuthError::InvalidToken.into())
}

pub async fn get_devices(
    Extension(token_data): Extension<TokenClaims>,
    State(state): State<DeviceState>,
) -> Result<Json<Vec<DeviceResponse>>, ApiError> {
    let user_id = user_id(&token_data)?;
    let devices = state
        .device_repository
        .find_with_access_for_user(user_id)
        .await?;

    let mut responses = Vec::with_capacity(devices.len());
    for device in devices {
        let status = state.cache.status(&device.device_id).await.unwrap_or_default();
        responses.push(DeviceResponse {
            id: device.id,
            device_id: device.device_id,
            name: device.name,
            is_owner: device.is_owner,
            status,
        });
    }

    Ok(Json(responses))
}

/// Pairing: the claimed code must match what the controller last
/// published. The first user to pair a device becomes its owner.
pub async fn add_device(
    Extension(token_data): Extension<TokenClaims>,
    State(state): State<DeviceState>,
    Json(body): Json<AddDeviceRequest>,
) -> Result<Json<DeviceResponse>, ApiError> {
    let user_id = user_id(&token_data)?;

    let known_code = state.cache.confirmation_code(&body.device_id).await;
    if known_code.as_deref() != Some(body.confirmation_code.as_str()) {
        tracing::warn!(device_id = %body.device_id, "rejected pairing attempt with wrong code");
        return Err(DeviceError::InvalidConfirmationCode.into());
    }

    let existing = state
        .device_repository
        .find_by_device_id(&body.device_id)
        .await?;

    if let Some(device) = &existing {
        if state.device_repository.is_linked(user_id, device.id).await? {
            return Err(DeviceError::AlreadyLinked.into());
        }
        if let Some(name) = &body.name {
            state.device_repository.rename(device.id, name).await?;
        }
    }

    let mut tx = state.device_repository.get_pool().begin().await?;

    let (device, is_new) = match existing {
        Some(device) => (device, false),
        None => {
            let name = body.name.clone().unwrap_or_else(|| {
                // Char-based suffix: device ids are not guaranteed to
                // be ASCII.
                let skip = body.device_id.chars().count().saturating_sub(4);
                let suffix: String = body.device_id.chars().skip(skip).collect();
                format!("Solar Controller {}", suffix)
            });
            let device = state
                .device_repository
                .create(&body.device_id, &name, &mut tx)
                .await?;
            (device, true)
        }
    };

    state
        .device_repository
        .link_user(user_id, device.id, is_new, &mut tx)
        .await?;

    tx.commit().await?;

    tracing::info!(device_id = %body.device_id, user_id, "device paired");

    if let Err(e) = state
        .dispatcher
        .publish_command(
            &body.device_id,
            commands::device_added(Utc::now().timestamp_millis()),
        )
        .await
    {
        tracing::error!(device_id = %body.device_id, "failed to send pairing ack: {}", e);
    }

    let status = state.cache.status(&body.device_id).await.unwrap_or_default();
    let name = body.name.unwrap_or(device.name);

    Ok(Json(DeviceResponse {
        id: device.id,
        device_id: device.device_id,
        name,
        is_owner: is_new,
        status,
    }))
}

/// Unlinks the caller; the last user out takes the device's schedules,
/// mode rows and energy history with them.
pub async fn delete_device(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    State(state): State<DeviceState>,
) -> Result<Json<Value>, ApiError> {
    let user_id = user_id(&token_data)?;

    let device = state
        .device_repository
        .find_by_device_id(&device_id)
        .await?
        .ok_or(DeviceError::DeviceNotFound)?;

    let mut tx = state.device_repository.get_pool().begin().await?;

    state
        .device_repository
        .unlink_user(user_id, device.id, &mut tx)
        .await?;

    let remaining = state.device_repository.count_users(device.id, &mut tx).await?;

    if remaining == 0 {
        state
            .energy_repository
            .delete_for_device_tx(&device_id, &mut tx)
            .await?;
        state
            .schedule_repository
            .delete_for_device(&device_id, &mut tx)
            .await?;
        state
            .mode_repository
            .delete_for_device(&device_id, &mut tx)
            .await?;
        state.device_repository.delete(device.id, &mut tx).await?;

        tracing::info!(device_id = %device_id, "device fully removed, no users remain");
    } else {
        tracing::info!(device_id = %device_id, remaining, "user access removed");
    }

    tx.commit().await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn share_device(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    State(state): State<DeviceState>,
    Json(body): Json<ShareDeviceRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.is_owner(user_id, &device_id).await? {
        return Err(DeviceError::NotOwner.into());
    }

    let target = state
        .user_repository
        .find_by_email(&body.email)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    let device = state
        .device_repository
        .find_by_device_id(&device_id)
        .await?
        .ok_or(DeviceError::DeviceNotFound)?;

    if state.device_repository.is_linked(target.id, device.id).await? {
        return Err(DeviceError::TargetAlreadyLinked.into());
    }

    let mut tx = state.device_repository.get_pool().begin().await?;
    state
        .device_repository
        .link_user(target.id, device.id, false, &mut tx)
        .await?;
    tx.commit().await?;

    tracing::info!(device_id = %device_id, target = %body.email, "device shared");

    Ok(Json(json!({ "success": true })))
}

/// Raw relay command passthrough; relay state is mirrored into the
/// cache optimistically.
pub async fn control_device(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    State(state): State<DeviceState>,
    Json(body): Json<ControlRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.has_access(user_id, &device_id).await? {
        return Err(DeviceError::AccessDenied.into());
    }

    let payload = commands::relay(&body.command, body.state.clone(), Utc::now().timestamp_millis());

    state
        .dispatcher
        .publish_command(&device_id, payload)
        .await
        .map_err(ApiError::InternalError)?;

    if let Some(relay_state) = body.state.as_bool() {
        state.cache.set_relay_state(&device_id, relay_state).await;
    }

    Ok(Json(json!({ "success": true })))
}

/// Everyone but the caller, for the sharing picker.
pub async fn get_users(
    Extension(token_data): Extension<TokenClaims>,
    State(state): State<DeviceState>,
) -> Result<Json<Vec<User>>, ApiError> {
    let user_id = user_id(&token_data)?;
    let users = state.user_repository.find_others(user_id).await?;

    Ok(Json(users))
}
