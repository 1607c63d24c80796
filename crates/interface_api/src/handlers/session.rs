//! Creation session handlers
//!
//! Session files are plain blocking I/O, so every store call runs on the
//! blocking pool.

use axum::{extract::State, http::StatusCode, Extension, Json};
use tracing::{info, instrument};

use domain_bill::Bill;
use domain_session::{SessionPort, SessionSnapshot};

use crate::dto::session::CommitSessionBody;
use crate::error::ApiError;
use crate::middleware::Actor;
use crate::AppState;

async fn blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, domain_session::SessionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ApiError::Internal(format!("session task failed: {e}")))?
        .map_err(ApiError::from)
}

#[instrument(skip(state, snapshot), fields(actor = %actor))]
pub async fn save_session(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(snapshot): Json<SessionSnapshot>,
) -> Result<StatusCode, ApiError> {
    let store = state.session_store(actor);
    blocking(move || store.save(&snapshot)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The recoverable session, if any; stale or corrupt ones answer 404
pub async fn load_session(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let store = state.session_store(actor);
    blocking(move || store.load())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no recoverable session".to_string()))
}

pub async fn discard_session(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
) -> Result<StatusCode, ApiError> {
    let store = state.session_store(actor);
    blocking(move || store.clear()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Turns the saved session into a bill and clears it
///
/// The session survives a failed create so the flow can be corrected.
#[instrument(skip(state, body), fields(actor = %actor))]
pub async fn commit_session(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    body: Option<Json<CommitSessionBody>>,
) -> Result<(StatusCode, Json<Bill>), ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let store = state.session_store(actor);

    let loader = state.session_store(actor);
    let snapshot = blocking(move || loader.load())
        .await?
        .ok_or_else(|| ApiError::NotFound("no recoverable session".to_string()))?;

    let date = body.date.unwrap_or_else(|| state.clock.now().date_naive());
    let request = snapshot.to_create_request(actor, date)?;
    let bill = state.bills.create_bill(request).await?;

    blocking(move || store.clear()).await?;
    info!(bill_id = %bill.id(), session_id = %snapshot.session_id, "Session committed");
    Ok((StatusCode::CREATED, Json(bill)))
}
