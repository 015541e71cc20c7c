//! Negotiation API handlers

use axum::extract::{Path, Query, State};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, ApiJson, AuthenticatedUser, Reply};
use crate::error::ApiResult;
use crate::negotiation::{
    CounterOfferRequest, ListNegotiationsQuery, Negotiation, NegotiationEvent, ReasonRequest,
    StartNegotiationRequest,
};
use crate::state::AppState;
use crate::websocket::MarketEvent;

pub async fn start_negotiation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<StartNegotiationRequest>,
) -> ApiResult<Reply<Negotiation>> {
    let negotiation = app_state
        .negotiation_service
        .start_negotiation(user.user_id, request)
        .await?;

    app_state.ws_state.broadcast_event(MarketEvent::negotiation(
        &negotiation,
        NegotiationEvent::Started {
            negotiation_id: negotiation.id,
            client_id: negotiation.client_id,
            provider_id: negotiation.provider_id,
            offer: negotiation.current_offer,
        },
    ));

    Ok(created(negotiation))
}

pub async fn list_negotiations(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListNegotiationsQuery>,
) -> ApiResult<Reply<Vec<Negotiation>>> {
    let negotiations = app_state
        .negotiation_service
        .list_negotiations(user.user_id, query.status)
        .await?;

    Ok(ok(negotiations))
}

pub async fn get_negotiation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply<Negotiation>> {
    let negotiation = app_state
        .negotiation_service
        .get_negotiation(id, user.user_id)
        .await?;

    Ok(ok(negotiation))
}

pub async fn counter_offer(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<CounterOfferRequest>,
) -> ApiResult<Reply<Negotiation>> {
    let negotiation = app_state
        .negotiation_service
        .make_counter_offer(id, user.user_id, request)
        .await?;

    if let Some(offer) = negotiation.offers.last() {
        app_state.ws_state.broadcast_event(MarketEvent::negotiation(
            &negotiation,
            NegotiationEvent::OfferMade {
                negotiation_id: negotiation.id,
                from_user: offer.from_user,
                to_user: offer.to_user,
                offer: offer.offered_price,
            },
        ));
    }

    Ok(ok(negotiation))
}

pub async fn accept_offer(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply<Negotiation>> {
    let negotiation = app_state
        .negotiation_service
        .accept_offer(id, user.user_id)
        .await?;

    if let Some(final_price) = negotiation.final_price {
        app_state.ws_state.broadcast_event(MarketEvent::negotiation(
            &negotiation,
            NegotiationEvent::Accepted {
                negotiation_id: negotiation.id,
                final_price,
            },
        ));
    }

    Ok(ok(negotiation))
}

pub async fn decline_offer(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<ApiJson<ReasonRequest>>,
) -> ApiResult<Reply<Negotiation>> {
    let request = body.map(|ApiJson(r)| r).unwrap_or_default();
    request.validate()?;

    let negotiation = app_state
        .negotiation_service
        .decline_offer(id, user.user_id, request.reason)
        .await?;

    app_state.ws_state.broadcast_event(MarketEvent::negotiation(
        &negotiation,
        NegotiationEvent::Declined {
            negotiation_id: negotiation.id,
            reason: negotiation.cancel_reason.clone(),
        },
    ));

    Ok(ok(negotiation))
}

pub async fn cancel_negotiation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<ApiJson<ReasonRequest>>,
) -> ApiResult<Reply<Negotiation>> {
    let request = body.map(|ApiJson(r)| r).unwrap_or_default();
    request.validate()?;

    let negotiation = app_state
        .negotiation_service
        .cancel_negotiation(id, user.user_id, request.reason)
        .await?;

    app_state.ws_state.broadcast_event(MarketEvent::negotiation(
        &negotiation,
        NegotiationEvent::Cancelled {
            negotiation_id: negotiation.id,
        },
    ));

    Ok(ok(negotiation))
}

pub async fn delete_negotiation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply<Value>> {
    app_state
        .negotiation_service
        .delete_negotiation(id, user.user_id)
        .await?;

    Ok(ok(json!({ "id": id, "deleted": true })))
}
