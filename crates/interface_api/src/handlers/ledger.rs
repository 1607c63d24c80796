//! Ledger handlers

use axum::{extract::State, Extension, Json};
use tracing::instrument;

use crate::dto::ledger::LedgerResponse;
use crate::error::ApiError;
use crate::middleware::Actor;
use crate::AppState;

/// The caller's active bills and what each counterparty owes them
///
/// Served from the caller's live ledger; it may trail a commit made a
/// moment earlier.
#[instrument(skip(state), fields(actor = %actor))]
pub async fn get_ledger(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let snapshot = state.ledgers.snapshot(actor).await?;
    Ok(Json(LedgerResponse::from(snapshot.as_ref())))
}
