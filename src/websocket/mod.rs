//! WebSocket server for real-time marketplace updates
//!
//! Connections identify with their bearer token and then receive the events
//! that concern them. Providers also stream location pings over the socket;
//! their presence is dropped when the socket closes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use crate::auth::{AuthService, Identity};
use crate::booking::{Booking, BookingEvent};
use crate::models::UserRole;
use crate::negotiation::{Negotiation, NegotiationEvent};
use crate::presence::{PresenceService, PresenceUpdate};

/// Payload of a marketplace notification
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MarketPayload {
    Negotiation(NegotiationEvent),
    Booking(BookingEvent),
}

/// Notification addressed to the participants of a negotiation or booking
#[derive(Debug, Clone, Serialize)]
pub struct MarketEvent {
    #[serde(skip)]
    pub recipients: [Uuid; 2],
    #[serde(flatten)]
    pub payload: MarketPayload,
}

impl MarketEvent {
    pub fn negotiation(negotiation: &Negotiation, event: NegotiationEvent) -> Self {
        Self {
            recipients: [negotiation.client_id, negotiation.provider_id],
            payload: MarketPayload::Negotiation(event),
        }
    }

    pub fn booking(booking: &Booking, event: BookingEvent) -> Self {
        Self {
            recipients: [booking.user_id, booking.provider_id],
            payload: MarketPayload::Booking(event),
        }
    }

    pub fn is_for(&self, user_id: Uuid) -> bool {
        self.recipients.contains(&user_id)
    }
}

/// WebSocket server state
#[derive(Clone)]
pub struct WsState {
    tx: broadcast::Sender<MarketEvent>,
    clients: Arc<RwLock<HashMap<String, Option<Identity>>>>,
    auth: Arc<AuthService>,
    presence: PresenceService,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Identify { token: String },
    Location(PresenceUpdate),
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Event { event: MarketEvent },
    Identified { user_id: Uuid },
    LocationAccepted,
    Pong,
    Error { message: String },
}

impl WsState {
    pub fn new(auth: Arc<AuthService>, presence: PresenceService) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            tx,
            clients: Arc::new(RwLock::new(HashMap::new())),
            auth,
            presence,
        }
    }

    /// Fan an event out to connected participants. Delivery is best effort:
    /// having no listeners is not an error worth more than a debug line.
    pub fn broadcast_event(&self, event: MarketEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("No WebSocket listeners for event: {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }

    pub async fn connected_clients(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn identity_of(&self, connection_id: &str) -> Option<Identity> {
        self.clients.read().await.get(connection_id).copied().flatten()
    }

    async fn unregister(&self, connection_id: &str) {
        self.clients.write().await.remove(connection_id);
        let dropped = self.presence.remove_connection(connection_id).await;
        tracing::info!(connection_id, presence_dropped = dropped, "Client disconnected");
    }

    async fn handle_message(&self, connection_id: &str, message: ClientMessage) -> ServerMessage {
        match message {
            ClientMessage::Identify { token } => match self.auth.authenticate(&token) {
                Ok(identity) => {
                    self.clients
                        .write()
                        .await
                        .insert(connection_id.to_string(), Some(identity));
                    tracing::info!(connection_id, user_id = %identity.user_id, "Client identified");
                    ServerMessage::Identified {
                        user_id: identity.user_id,
                    }
                }
                Err(e) => ServerMessage::Error {
                    message: format!("Authentication failed: {}", e),
                },
            },
            ClientMessage::Location(update) => match self.identity_of(connection_id).await {
                Some(identity) if identity.role == UserRole::Provider => {
                    match self
                        .presence
                        .register(identity.user_id, connection_id, update)
                        .await
                    {
                        Ok(_) => ServerMessage::LocationAccepted,
                        Err(e) => ServerMessage::Error {
                            message: e.to_string(),
                        },
                    }
                }
                Some(_) => ServerMessage::Error {
                    message: "Only providers can share a location".to_string(),
                },
                None => ServerMessage::Error {
                    message: "Identify before sending a location".to_string(),
                },
            },
            ClientMessage::Ping => ServerMessage::Pong,
        }
    }
}

/// Upgrade handler for `/ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let connection_id = Uuid::new_v4().to_string();
    state.clients.write().await.insert(connection_id.clone(), None);

    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(32);
    let mut events = state.subscribe();

    let send_state = state.clone();
    let send_connection = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let outgoing = tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        let Some(identity) = send_state.identity_of(&send_connection).await else {
                            continue;
                        };
                        if !event.is_for(identity.user_id) {
                            continue;
                        }
                        ServerMessage::Event { event }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(connection_id = %send_connection, skipped, "Client lagging, events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(reply) = reply_rx.recv() => reply,
                else => break,
            };

            let Ok(text) = serde_json::to_string(&outgoing) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let recv_connection = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => recv_state.handle_message(&recv_connection, message).await,
                        Err(e) => ServerMessage::Error {
                            message: format!("Unrecognised message: {}", e),
                        },
                    };
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.unregister(&connection_id).await;
}
