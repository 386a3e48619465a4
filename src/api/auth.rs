//! Bearer token authentication middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::{ApiError, ApiState};
use crate::security::AuthError;

/// Extract the raw Authorization header
fn authorization_header(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Middleware resolving the caller to a [`crate::security::Principal`]
///
/// The principal is stored in the request extensions for handlers to pick up
/// with `Extension<Principal>`.
pub async fn require_bearer(
    State(state): State<Arc<ApiState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(header) = authorization_header(&req).map(str::to_owned) else {
        tracing::debug!("no authorization header provided");
        return Err(AuthError::MissingCredentials.into());
    };

    let principal = state.authenticator.authenticate(&header).await?;
    tracing::debug!(user_id = %principal.user_id, "request authenticated");

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
