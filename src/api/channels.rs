//! Channel catalog endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    middleware,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::require_bearer;
use super::{ApiError, ApiState};
use crate::db::Channel;
use crate::playlist::ImportSummary;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ChannelQuery {
    pub group: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    pub id: String,
    pub tvg_name: String,
    pub tvg_logo: String,
    pub group_title: String,
    pub stream_url: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Channel> for ChannelResponse {
    fn from(c: Channel) -> Self {
        Self {
            id: c.id,
            tvg_name: c.tvg_name,
            tvg_logo: c.tvg_logo,
            group_title: c.group_title,
            stream_url: c.stream_url,
            source_url: c.source_url,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Import a remote playlist, replacing earlier channels from the same URL
async fn import_playlist(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<Json<ImportSummary>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let url = req.url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("url is required"));
    }

    let summary = state.importer.import(url).await?;
    Ok(Json(summary))
}

/// List channels, optionally within one group
async fn list_channels(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ChannelQuery>,
) -> Result<Json<Vec<ChannelResponse>>, ApiError> {
    let group = query.group.as_deref().filter(|g| !g.is_empty());
    let channels = state.channels.list(group)?;

    Ok(Json(channels.into_iter().map(ChannelResponse::from).collect()))
}

/// List distinct group titles
async fn list_groups(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.channels.list_groups()?))
}

/// Channel routes, all behind bearer authentication
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/channels", get(list_channels))
        .route("/channels/import", post(import_playlist))
        .route("/channels/groups", get(list_groups))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        .with_state(state)
}
