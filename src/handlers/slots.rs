//! Slot generation, listing, claim and release.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::Identity,
    error::{ApiError, ApiResult},
    middleware::RequestId,
    models::Slot,
    reservation::{ReservationError, SlotView},
    telemetry::record_reservation_outcome,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateSlotsRequest {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub owner_id: Uuid,
    #[schema(value_type = String, example = "2026-03-02")]
    pub day: NaiveDate,
    /// `HH:MM` or `HH:MM:SS`.
    #[schema(example = "09:00")]
    pub window_start: String,
    /// As `window_start`, or `24:00` to run to the end of the day.
    #[schema(example = "12:00")]
    pub window_end: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateSlotsResponse {
    #[schema(example = 12)]
    pub created: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSlotsQuery {
    /// Owner whose slots to list. Omitting it yields an empty list.
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationResponse {
    #[schema(example = "Slot reserved")]
    pub message: String,
    pub slot: Slot,
}

fn rejected(
    action: &str,
    slot_id: Uuid,
    identity: &Identity,
    request_id: &RequestId,
    err: ReservationError,
) -> (StatusCode, Json<ApiError>) {
    record_reservation_outcome(action, err.code());
    if !matches!(err, ReservationError::Storage(_)) {
        warn!(
            request_id = %request_id,
            slot_id = %slot_id,
            user_id = %identity.user_id,
            reason = err.code(),
            "Slot {} rejected",
            action
        );
    }
    err.into()
}

#[utoipa::path(
    post,
    path = "/slots/generate",
    tag = "Slots",
    request_body = GenerateSlotsRequest,
    responses(
        (status = 201, description = "Slots created", body = GenerateSlotsResponse),
        (status = 400, description = "Invalid availability window", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Admin role required", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn generate_slots(
    State(state): State<AppState>,
    Json(payload): Json<GenerateSlotsRequest>,
) -> ApiResult<(StatusCode, Json<GenerateSlotsResponse>)> {
    let created = state
        .reservations
        .generate_slots(
            payload.owner_id,
            payload.day,
            &payload.window_start,
            &payload.window_end,
        )
        .map_err(|e| {
            record_reservation_outcome("generate", e.code());
            e
        })?;

    record_reservation_outcome("generate", "success");
    Ok((StatusCode::CREATED, Json(GenerateSlotsResponse { created })))
}

#[utoipa::path(
    get,
    path = "/slots",
    tag = "Slots",
    params(ListSlotsQuery),
    responses(
        (status = 200, description = "Slots of the owner ordered by day and start time", body = [SlotView]),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_slots(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListSlotsQuery>,
) -> ApiResult<Json<Vec<SlotView>>> {
    let slots = state
        .reservations
        .list_slots(query.owner_id, identity.user_id)?;
    Ok(Json(slots))
}

#[utoipa::path(
    post,
    path = "/slots/{slot_id}/claim",
    tag = "Slots",
    params(("slot_id" = Uuid, Path, description = "Slot to reserve")),
    responses(
        (status = 200, description = "Slot reserved", body = ReservationResponse),
        (status = 400, description = "Quota, same-day or contiguity rule violated", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Verified consumer role required", body = ApiError),
        (status = 404, description = "Slot not found", body = ApiError),
        (status = 409, description = "Slot already reserved", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn claim_slot(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(request_id): Extension<RequestId>,
    Path(slot_id): Path<Uuid>,
) -> ApiResult<Json<ReservationResponse>> {
    let slot = state
        .reservations
        .claim(slot_id, identity.user_id)
        .map_err(|e| rejected("claim", slot_id, &identity, &request_id, e))?;

    record_reservation_outcome("claim", "success");
    Ok(Json(ReservationResponse {
        message: "Slot reserved".to_string(),
        slot,
    }))
}

#[utoipa::path(
    post,
    path = "/slots/{slot_id}/release",
    tag = "Slots",
    params(("slot_id" = Uuid, Path, description = "Slot to release")),
    responses(
        (status = 200, description = "Reservation released", body = ReservationResponse),
        (status = 400, description = "Release cutoff has passed", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Slot is not reserved by the caller", body = ApiError),
        (status = 404, description = "Slot not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn release_slot(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(request_id): Extension<RequestId>,
    Path(slot_id): Path<Uuid>,
) -> ApiResult<Json<ReservationResponse>> {
    let slot = state
        .reservations
        .release(slot_id, identity.user_id)
        .map_err(|e| rejected("release", slot_id, &identity, &request_id, e))?;

    record_reservation_outcome("release", "success");
    Ok(Json(ReservationResponse {
        message: "Reservation released".to_string(),
        slot,
    }))
}
