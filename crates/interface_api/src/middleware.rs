//! API middleware

use std::str::FromStr;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{info, warn};

use core_kernel::ParticipantId;

use crate::error::ApiError;
use crate::AppState;

/// Header carrying the acting participant, set by the upstream auth layer
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The participant on whose behalf a request runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub ParticipantId);

/// Actor middleware
///
/// Reads the acting participant from `X-Actor-Id` and stores it in the
/// request extensions. Requests without a valid id are rejected.
pub async fn actor_middleware(mut request: Request<Body>, next: Next) -> Response {
    let header = request
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|h| h.to_str().ok());

    let actor = match header.map(ParticipantId::from_str) {
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            warn!(error = %e, "Malformed actor header");
            return ApiError::Unauthorized("malformed X-Actor-Id header".to_string()).into_response();
        }
        None => {
            warn!("Missing actor header");
            return ApiError::Unauthorized("missing X-Actor-Id header".to_string()).into_response();
        }
    };

    request.extensions_mut().insert(Actor(actor));
    next.run(request).await
}

/// Audit logging middleware
///
/// Logs every API request with its actor, status and duration
pub async fn audit_middleware(
    State(_state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let actor = request
        .extensions()
        .get::<Actor>()
        .map(|a| a.0.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    let start = Utc::now();

    let response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        actor = %actor,
        status = %status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    response
}
