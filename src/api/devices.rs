//! Device registration and remote control endpoints

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::require_bearer;
use super::{ApiError, ApiState};
use crate::db::{Device, Registration};
use crate::security::Principal;
use crate::sessions::Command;

/// Header a device identifies itself with
pub const DEVICE_ID_HEADER: &str = "x-device-id";

// --- Request/Response types ---

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    #[serde(default)]
    pub device_code: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub id: String,
    pub device_code: String,
    pub user_id: String,
    /// Whether the device currently holds a push channel
    pub connected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceResponse {
    fn new(device: Device, connected: bool) -> Self {
        Self {
            id: device.id,
            device_code: device.device_code,
            user_id: device.user_id,
            connected,
            created_at: device.created_at,
            updated_at: device.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub status: &'static str,
}

// --- Helpers ---

/// Read the device code from the `X-Device-ID` header
pub(super) fn device_code_header(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("X-Device-ID header required"))
}

fn owned_device(state: &ApiState, id: &str, principal: &Principal) -> Result<Device, ApiError> {
    if Uuid::parse_str(id).is_err() {
        return Err(ApiError::bad_request("invalid device id"));
    }

    state
        .devices
        .find_owned(id, &principal.user_id)?
        .ok_or_else(|| ApiError::not_found("device not found"))
}

fn play_command(req: PlayRequest) -> Result<Command, ApiError> {
    match req.kind.as_str() {
        "m3u" => req
            .url
            .filter(|u| !u.is_empty())
            .map(Command::play_url)
            .ok_or_else(|| ApiError::bad_request("url is required for m3u type")),
        "youtube" => req
            .video_id
            .filter(|v| !v.is_empty())
            .map(Command::play_video)
            .ok_or_else(|| ApiError::bad_request("videoId is required for youtube type")),
        other => Err(ApiError::bad_request(format!("invalid type: {other}"))),
    }
}

// --- Handlers ---

/// Tell a device whether it has been registered
async fn whoami(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let device_code = device_code_header(&headers)?;

    match state.devices.find_by_code(&device_code)? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::not_found("device not registered")),
    }
}

/// Bind a device code to the caller
async fn register_device(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<RegisterDeviceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DeviceResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let device_code = req.device_code.trim();
    if device_code.is_empty() {
        return Err(ApiError::bad_request("device_code is required"));
    }

    let (device, registration) = state.devices.register(device_code, &principal.user_id)?;
    let status = match registration {
        Registration::Created => StatusCode::CREATED,
        Registration::Existing => StatusCode::OK,
    };
    let connected = state.sessions.is_connected(&device.device_code);

    Ok((status, Json(DeviceResponse::new(device, connected))))
}

/// List the caller's devices
async fn list_devices(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<DeviceResponse>>, ApiError> {
    let connected = state.sessions.list_connected();
    let devices = state
        .devices
        .list_for_user(&principal.user_id)?
        .into_iter()
        .map(|d| {
            let is_connected = connected.contains(&d.device_code);
            DeviceResponse::new(d, is_connected)
        })
        .collect();

    Ok(Json(devices))
}

/// Delete one of the caller's devices and drop its push channel
async fn delete_device(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let device = owned_device(&state, &id, &principal)?;

    state.devices.delete(&device.id)?;
    state.sessions.unregister(&device.device_code);
    tracing::info!(device_id = %device.id, device_code = %device.device_code, "device deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Tell a device to play a stream or video
async fn play(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<PlayRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if req.kind.is_empty() {
        return Err(ApiError::bad_request("type is required"));
    }

    let device = owned_device(&state, &id, &principal)?;
    let command = play_command(req)?;

    state.dispatcher.send(&device.device_code, &command).await?;
    Ok(Json(CommandResponse {
        status: "command sent",
    }))
}

/// Tell a device to stop playback
async fn stop(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let device = owned_device(&state, &id, &principal)?;

    state
        .dispatcher
        .send(&device.device_code, &Command::stop())
        .await?;
    Ok(Json(CommandResponse {
        status: "command sent",
    }))
}

/// Routes a device calls about itself, without a user token
pub fn public_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/devices/whoami", get(whoami))
        .with_state(state)
}

/// Device management routes for authenticated users
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/devices", post(register_device).get(list_devices))
        .route("/devices/{id}", delete(delete_device))
        .route("/devices/{id}/play", post(play))
        .route("/devices/{id}/stop", post(stop))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        .with_state(state)
}
