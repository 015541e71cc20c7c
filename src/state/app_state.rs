//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::AuthService;
use crate::booking::BookingService;
use crate::instant::InstantDispatchService;
use crate::negotiation::NegotiationService;
use crate::presence::PresenceService;
use crate::store::MarketStore;
use crate::websocket::WsState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MarketStore>,
    pub negotiation_service: Arc<NegotiationService>,
    pub booking_service: Arc<BookingService>,
    pub instant_service: Arc<InstantDispatchService>,
    pub presence: PresenceService,
    pub auth_service: Arc<AuthService>,
    pub ws_state: WsState,
}

impl AppState {
    /// Wire the engines over one store
    pub fn new(
        store: Arc<dyn MarketStore>,
        auth_service: Arc<AuthService>,
        negotiation_ttl: chrono::Duration,
        presence_ttl: chrono::Duration,
    ) -> Self {
        let negotiation_service = NegotiationService::new(store.clone(), negotiation_ttl);
        let booking_service = BookingService::new(store.clone(), negotiation_service.locks());
        let presence = PresenceService::new(presence_ttl);
        let instant_service =
            InstantDispatchService::new(store.clone(), presence.clone(), booking_service.clone());
        let ws_state = WsState::new(auth_service.clone(), presence.clone());

        Self {
            store,
            negotiation_service: Arc::new(negotiation_service),
            booking_service: Arc::new(booking_service),
            instant_service: Arc::new(instant_service),
            presence,
            auth_service,
            ws_state,
        }
    }
}

impl FromRef<AppState> for WsState {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ws_state.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}
