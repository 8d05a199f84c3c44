use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ApiError, AuthError, DeviceError, ScheduleError};
use crate::middlewares::{auth, TokenState};
use crate::models::{Mode, RepeatType, Schedule};
use crate::repositories::{DeviceRepository, ScheduleDraft, ScheduleRepository};
use crate::services::recurrence::next_fire_time;
use crate::services::{Clock, TokenClaims};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleRequest {
    pub name: Option<String>,
    pub target_mode: Option<String>,
    pub schedule_type: Option<String>,
    pub hour: Option<i32>,
    pub minute: Option<i32>,
    pub start_hour: Option<i32>,
    pub start_minute: Option<i32>,
    pub end_hour: Option<i32>,
    pub end_minute: Option<i32>,
    pub secondary_mode: Option<String>,
    pub repeat_type: Option<String>,
    pub repeat_days: Option<Vec<u32>>,
    pub is_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleResponse {
    pub success: bool,
    pub schedule: Schedule,
}

#[derive(Clone)]
pub struct ScheduleState {
    pub schedule_repository: Arc<ScheduleRepository>,
    pub device_repository: Arc<DeviceRepository>,
    pub clock: Arc<dyn Clock>,
    pub zone: Tz,
}

pub fn schedule_router(schedule_state: ScheduleState, token_state: TokenState) -> Router {
    Router::new()
        .route(
            "/api/devices/:device_id/schedules",
            get(get_schedules).post(create_schedule),
        )
        .route(
            "/api/devices/:device_id/schedules/:schedule_id",
            axum::routing::put(update_schedule).delete(delete_schedule),
        )
        .route_layer(middleware::from_fn_with_state(token_state, auth))
        .with_state(schedule_state)
}

fn user_id(token_data: &TokenClaims) -> Result<i32, ApiError> {
    token_data
        .sub
        .parse()
        .map_err(|_| AuthError::InvalidToken.into())
}

fn valid_time(hour: i32, minute: i32) -> bool {
    (0..=23).contains(&hour) && (0..=59).contains(&minute)
}

/// Validates a full set of schedule fields and lowers them to the
/// column layout, nulling whichever variant is inactive. Weekly
/// schedules must carry at least one valid weekday.
#[allow(clippy::too_many_arguments)]
fn build_draft(
    device_id: &str,
    user_id: i32,
    name: String,
    target_mode: String,
    schedule_type: String,
    body: &ScheduleRequest,
    merged_days: Option<Vec<u32>>,
    repeat_type: String,
    is_enabled: bool,
    zone: Tz,
    clock: &dyn Clock,
    current: Option<&Schedule>,
) -> Result<ScheduleDraft, ScheduleError> {
    if name.is_empty() || target_mode.is_empty() {
        return Err(ScheduleError::MissingRequiredFields);
    }

    if target_mode.parse::<Mode>().is_err() {
        return Err(ScheduleError::InvalidTargetMode);
    }

    if schedule_type != "time" && schedule_type != "range" {
        return Err(ScheduleError::InvalidScheduleType);
    }

    let repeat: RepeatType = repeat_type
        .parse()
        .map_err(|_| ScheduleError::InvalidRepeatType)?;

    let repeat_days = match repeat {
        RepeatType::Weekly => {
            let days = merged_days.unwrap_or_default();
            if days.is_empty() {
                return Err(ScheduleError::EmptyWeeklyDays);
            }
            if days.iter().any(|&d| d > 6) {
                return Err(ScheduleError::InvalidWeekdayList);
            }
            Some(serde_json::to_string(&days).unwrap_or_else(|_| "[]".into()))
        }
        _ => merged_days
            .map(|days| serde_json::to_string(&days).unwrap_or_else(|_| "[]".into())),
    };

    let mut draft = ScheduleDraft {
        device_id: device_id.to_string(),
        user_id,
        name,
        target_mode,
        schedule_type: schedule_type.clone(),
        hour: None,
        minute: None,
        start_hour: None,
        start_minute: None,
        end_hour: None,
        end_minute: None,
        secondary_mode: None,
        repeat_type,
        repeat_days,
        is_enabled,
        next_execution: None,
    };

    if schedule_type == "time" {
        let hour = body.hour.or(current.and_then(|s| s.hour));
        let minute = body.minute.or(current.and_then(|s| s.minute));
        let (hour, minute) = match (hour, minute) {
            (Some(h), Some(m)) => (h, m),
            _ => return Err(ScheduleError::MissingFixedTimeFields),
        };
        if !valid_time(hour, minute) {
            return Err(ScheduleError::InvalidTimeValues);
        }

        draft.hour = Some(hour);
        draft.minute = Some(minute);

        if is_enabled {
            let days: Vec<u32> = draft
                .repeat_days
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();
            let now_local = clock.now().with_timezone(&zone);
            let next = next_fire_time(hour as u32, minute as u32, repeat, &days, now_local);
            draft.next_execution = Some(next.with_timezone(&chrono::Utc));
        }
    } else {
        let start_hour = body.start_hour.or(current.and_then(|s| s.start_hour));
        let start_minute = body.start_minute.or(current.and_then(|s| s.start_minute));
        let end_hour = body.end_hour.or(current.and_then(|s| s.end_hour));
        let end_minute = body.end_minute.or(current.and_then(|s| s.end_minute));

        let (sh, sm, eh, em) = match (start_hour, start_minute, end_hour, end_minute) {
            (Some(sh), Some(sm), Some(eh), Some(em)) => (sh, sm, eh, em),
            _ => return Err(ScheduleError::MissingRangeFields),
        };
        if !valid_time(sh, sm) || !valid_time(eh, em) {
            return Err(ScheduleError::InvalidTimeValues);
        }

        let secondary = body
            .secondary_mode
            .clone()
            .or(current.and_then(|s| s.secondary_mode.clone()));
        if let Some(raw) = &secondary {
            if raw.parse::<Mode>().is_err() {
                return Err(ScheduleError::InvalidSecondaryMode);
            }
        }

        // The fallback mode is persisted eagerly so a row always says
        // what it does out-of-window.
        let effective_secondary = secondary.unwrap_or_else(|| {
            match draft.target_mode.parse::<Mode>() {
                Ok(mode) => mode.complement().as_str().to_string(),
                Err(_) => Mode::Grid.as_str().to_string(),
            }
        });

        draft.start_hour = Some(sh);
        draft.start_minute = Some(sm);
        draft.end_hour = Some(eh);
        draft.end_minute = Some(em);
        draft.secondary_mode = Some(effective_secondary);
    }

    Ok(draft)
}

pub async fn get_schedules(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    State(state): State<ScheduleState>,
) -> Result<Json<Vec<Schedule>>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.has_access(user_id, &device_id).await? {
        return Err(DeviceError::AccessDenied.into());
    }

    let schedules = state
        .schedule_repository
        .find_by_device(&device_id, user_id)
        .await?;

    Ok(Json(schedules))
}

pub async fn create_schedule(
    Extension(token_data): Extension<TokenClaims>,
    Path(device_id): Path<String>,
    State(state): State<ScheduleState>,
    Json(body): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let user_id = user_id(&token_data)?;

    if !state.device_repository.has_access(user_id, &device_id).await? {
        return Err(DeviceError::AccessDenied.into());
    }

    let name = body.name.clone().unwrap_or_default();
    let target_mode = body.target_mode.clone().unwrap_or_default();
    let schedule_type = body.schedule_type.clone().unwrap_or_else(|| "time".into());
    let repeat_type = body.repeat_type.clone().unwrap_or_else(|| "once".into());
    let is_enabled = body.is_enabled.unwrap_or(true);

    let draft = build_draft(
        &device_id,
        user_id,
        name,
        target_mode,
        schedule_type,
        &body,
        body.repeat_days.clone(),
        repeat_type,
        is_enabled,
        state.zone,
        state.clock.as_ref(),
        None,
    )?;

    let schedule = state.schedule_repository.create(&draft).await?;

    tracing::info!(
        schedule_id = schedule.id,
        device_id = %device_id,
        kind = %schedule.schedule_type,
        "schedule created"
    );

    Ok(Json(ScheduleResponse {
        success: true,
        schedule,
    }))
}

/// Partial update merged over the stored row, then re-validated as a
/// whole. Switching the schedule's type nulls the other variant's
/// columns in the same write.
pub async fn update_schedule(
    Extension(token_data): Extension<TokenClaims>,
    Path((device_id, schedule_id)): Path<(String, i32)>,
    State(state): State<ScheduleState>,
    Json(body): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let user_id = user_id(&token_data)?;

    let current = state
        .schedule_repository
        .find_owned(schedule_id, &device_id, user_id)
        .await?
        .ok_or(ScheduleError::ScheduleNotFound)?;

    let name = body.name.clone().unwrap_or_else(|| current.name.clone());
    let target_mode = body
        .target_mode
        .clone()
        .unwrap_or_else(|| current.target_mode.clone());
    let schedule_type = body
        .schedule_type
        .clone()
        .unwrap_or_else(|| current.schedule_type.clone());
    let repeat_type = body
        .repeat_type
        .clone()
        .unwrap_or_else(|| current.repeat_type.clone());
    let is_enabled = body.is_enabled.unwrap_or(current.is_enabled);
    let merged_days = body.repeat_days.clone().or_else(|| {
        current
            .repeat_days
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    });

    let draft = build_draft(
        &device_id,
        user_id,
        name,
        target_mode,
        schedule_type,
        &body,
        merged_days,
        repeat_type,
        is_enabled,
        state.zone,
        state.clock.as_ref(),
        Some(&current),
    )?;

    let schedule = state.schedule_repository.update(schedule_id, &draft).await?;

    tracing::info!(schedule_id, device_id = %device_id, "schedule updated");

    Ok(Json(ScheduleResponse {
        success: true,
        schedule,
    }))
}

pub async fn delete_schedule(
    Extension(token_data): Extension<TokenClaims>,
    Path((device_id, schedule_id)): Path<(String, i32)>,
    State(state): State<ScheduleState>,
) -> Result<Json<Value>, ApiError> {
    let user_id = user_id(&token_data)?;

    let deleted = state
        .schedule_repository
        .delete(schedule_id, &device_id, user_id)
        .await?;

    if !deleted {
        return Err(ScheduleError::ScheduleNotFound.into());
    }

    tracing::info!(schedule_id, device_id = %device_id, "schedule deleted");

    Ok(Json(json!({ "success": true })))
}
