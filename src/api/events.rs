//! Server-sent event stream a device listens on for commands

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::get,
};
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use super::devices::device_code_header;
use super::{ApiError, ApiState};
use crate::sessions;

/// Open a device's push channel
///
/// The device must be registered. Its stream starts with a `connected`
/// event and carries heartbeats until it disconnects.
async fn open_push_channel(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let device_code = device_code_header(&headers)?;

    if state.devices.find_by_code(&device_code)?.is_none() {
        tracing::debug!(device_code = %device_code, "push channel requested by unknown device");
        return Err(ApiError::not_found("device not found"));
    }

    let rx = sessions::open(&state.sessions, &device_code, state.heartbeat_interval);
    let frames = ReceiverStream::new(rx).map(|frame| Ok::<_, Infallible>(frame.encode()));

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(frames),
    ))
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/sse/events", get(open_push_channel))
        .with_state(state)
}
