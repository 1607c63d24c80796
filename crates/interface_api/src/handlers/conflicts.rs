//! Conflict handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use tracing::instrument;

use core_kernel::ConflictId;
use domain_bill::{BillConflict, ResolutionOutcome};

use crate::dto::bills::ResolveConflictBody;
use crate::error::ApiError;
use crate::middleware::Actor;
use crate::AppState;

/// Conflicts raised by the caller's own rejected writes
pub async fn list_conflicts(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
) -> Json<Vec<BillConflict>> {
    Json(state.bills.pending_conflicts_for(actor).await)
}

#[instrument(skip(state, body), fields(actor = %actor, resolution = ?body.resolution))]
pub async fn resolve_conflict(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(conflict_id): Path<ConflictId>,
    Json(body): Json<ResolveConflictBody>,
) -> Result<Json<ResolutionOutcome>, ApiError> {
    let outcome = state
        .bills
        .resolve_conflict(conflict_id, body.resolution, body.manual_patch, actor)
        .await?;
    Ok(Json(outcome))
}
