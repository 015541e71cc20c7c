//! Booking API handlers

use axum::extract::{Path, State};
use uuid::Uuid;

use super::{created, ok, ApiJson, AuthenticatedUser, Reply};
use crate::booking::{Booking, BookingEvent, CreateBookingRequest};
use crate::error::ApiResult;
use crate::state::AppState;
use crate::websocket::MarketEvent;

pub async fn create_booking(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<CreateBookingRequest>,
) -> ApiResult<Reply<Booking>> {
    let draft = request.into_draft(user.user_id)?;
    let booking = app_state.booking_service.create_booking(draft).await?;

    announce_created(&app_state, &booking);

    Ok(created(booking))
}

pub async fn list_bookings(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Reply<Vec<Booking>>> {
    let bookings = app_state.booking_service.list_bookings(user.user_id).await?;
    Ok(ok(bookings))
}

pub async fn get_booking(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply<Booking>> {
    let booking = app_state
        .booking_service
        .get_booking(id, user.user_id)
        .await?;
    Ok(ok(booking))
}

pub async fn cancel_booking(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply<Booking>> {
    let booking = app_state
        .booking_service
        .cancel_booking(id, user.user_id)
        .await?;

    announce_status(&app_state, &booking);

    Ok(ok(booking))
}

pub(super) fn announce_created(app_state: &AppState, booking: &Booking) {
    app_state.ws_state.broadcast_event(MarketEvent::booking(
        booking,
        BookingEvent::Created {
            booking_id: booking.id,
            client_id: booking.user_id,
            provider_id: booking.provider_id,
            status: booking.status,
        },
    ));
}

pub(super) fn announce_status(app_state: &AppState, booking: &Booking) {
    app_state.ws_state.broadcast_event(MarketEvent::booking(
        booking,
        BookingEvent::StatusUpdated {
            booking_id: booking.id,
            client_id: booking.user_id,
            provider_id: booking.provider_id,
            status: booking.status,
        },
    ));
}
