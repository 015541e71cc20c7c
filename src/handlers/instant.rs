//! Instant-service API handlers

use axum::extract::{Path, Query, State};
use uuid::Uuid;

use super::booking::{announce_created, announce_status};
use super::{created, ok, ApiJson, AuthenticatedUser, Reply};
use crate::booking::{Booking, UpdateStatusRequest};
use crate::error::ApiResult;
use crate::instant::{InstantCandidate, ListInstantServicesQuery, RequestInstantServiceRequest};
use crate::state::AppState;

pub async fn request_instant_service(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<RequestInstantServiceRequest>,
) -> ApiResult<Reply<Booking>> {
    let booking = app_state
        .instant_service
        .request_instant_service(user.user_id, request)
        .await?;

    announce_created(&app_state, &booking);

    Ok(created(booking))
}

pub async fn list_instant_services(
    State(app_state): State<AppState>,
    Query(query): Query<ListInstantServicesQuery>,
) -> ApiResult<Reply<Vec<InstantCandidate>>> {
    let candidates = app_state
        .instant_service
        .list_available_instant_services(&query)
        .await?;

    Ok(ok(candidates))
}

pub async fn update_instant_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<Uuid>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> ApiResult<Reply<Booking>> {
    let booking = app_state
        .booking_service
        .update_instant_status(booking_id, user.user_id, request.status)
        .await?;

    announce_status(&app_state, &booking);

    Ok(ok(booking))
}
