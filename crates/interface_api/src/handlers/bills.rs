//! Bill handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::instrument;
use validator::Validate;

use core_kernel::BillId;
use domain_bill::{Bill, BillActivity, DeleteAck};

use crate::dto::bills::{CreateBillBody, UpdateBillBody};
use crate::error::ApiError;
use crate::middleware::Actor;
use crate::AppState;

/// Creates a bill with the caller as creator
#[instrument(skip(state, body), fields(actor = %actor))]
pub async fn create_bill(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(body): Json<CreateBillBody>,
) -> Result<(StatusCode, Json<Bill>), ApiError> {
    body.validate()?;
    let bill = state.bills.create_bill(body.into_request(actor)).await?;
    Ok((StatusCode::CREATED, Json(bill)))
}

/// Only people the bill involves may read it
#[instrument(skip(state), fields(actor = %actor))]
pub async fn get_bill(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(bill_id): Path<BillId>,
) -> Result<Json<Bill>, ApiError> {
    let bill = state.bills.get_bill(bill_id).await?;
    if !bill.involves(actor) {
        return Err(ApiError::Forbidden(format!(
            "participant {actor} is not part of bill {bill_id}"
        )));
    }
    Ok(Json(bill))
}

/// Version-checked update
///
/// A stale `expected_version` answers 409 with the detected conflict and the
/// server copy; the caller resolves it through `/conflicts/:id/resolve`.
#[instrument(skip(state, body), fields(actor = %actor))]
pub async fn update_bill(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(bill_id): Path<BillId>,
    Json(body): Json<UpdateBillBody>,
) -> Result<Json<Bill>, ApiError> {
    body.validate()?;
    let bill = state
        .bills
        .update_bill(bill_id, body.patch, body.expected_version, actor)
        .await?;
    Ok(Json(bill))
}

#[instrument(skip(state), fields(actor = %actor))]
pub async fn delete_bill(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(bill_id): Path<BillId>,
) -> Result<Json<DeleteAck>, ApiError> {
    let ack = state.bills.delete_bill(bill_id, actor).await?;
    Ok(Json(ack))
}

/// The caller's feed entries for one bill, oldest first
///
/// Former participants keep access to the entries addressed to them.
#[instrument(skip(state), fields(actor = %actor))]
pub async fn list_activities(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(bill_id): Path<BillId>,
) -> Result<Json<Vec<BillActivity>>, ApiError> {
    let bill = state.bills.get_bill(bill_id).await?;
    let feed: Vec<BillActivity> = state
        .bills
        .activities(bill_id)
        .await?
        .into_iter()
        .filter(|a| a.participant_id == actor)
        .collect();

    if feed.is_empty() && !bill.involves(actor) {
        return Err(ApiError::Forbidden(format!(
            "participant {actor} is not part of bill {bill_id}"
        )));
    }
    Ok(Json(feed))
}
