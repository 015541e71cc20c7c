//! Live provider presence for instant dispatch
//!
//! Presence is transient: it is fed by location pings (REST or WebSocket) and
//! consulted by the dispatch engine, never persisted. Entries older than the
//! configured TTL are treated as offline and pruned by a background task.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::geo::GeoPoint;

/// Last known state of a provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderPresence {
    pub provider_id: Uuid,
    pub location: GeoPoint,
    pub instant_service_available: bool,
    /// Provider-side cap on travel distance; service radius still applies
    pub service_radius_km: Option<f64>,
    pub last_seen: DateTime<Utc>,
    #[serde(skip)]
    connection_id: Option<String>,
}

/// Location ping payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PresenceUpdate {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lon: f64,
    #[serde(default = "default_available")]
    pub available: bool,
    #[validate(range(min = 0.0, max = 500.0))]
    pub service_radius_km: Option<f64>,
}

fn default_available() -> bool {
    true
}

/// Registry of live provider presence
#[derive(Clone)]
pub struct PresenceService {
    entries: Arc<RwLock<HashMap<Uuid, ProviderPresence>>>,
    ttl: Duration,
}

impl PresenceService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Record a ping that arrived over a WebSocket connection; the entry is
    /// removed again when that connection closes
    pub async fn register(
        &self,
        provider_id: Uuid,
        connection_id: &str,
        update: PresenceUpdate,
    ) -> ApiResult<ProviderPresence> {
        self.upsert(provider_id, update, Some(connection_id.to_string()))
            .await
    }

    /// Record a ping from a stateless caller
    pub async fn update(
        &self,
        provider_id: Uuid,
        update: PresenceUpdate,
    ) -> ApiResult<ProviderPresence> {
        self.upsert(provider_id, update, None).await
    }

    async fn upsert(
        &self,
        provider_id: Uuid,
        update: PresenceUpdate,
        connection_id: Option<String>,
    ) -> ApiResult<ProviderPresence> {
        update.validate()?;
        let location = GeoPoint::new(update.lat, update.lon);
        if !location.is_valid() {
            return Err(ApiError::ValidationError(
                "coordinates out of range".to_string(),
            ));
        }

        let mut entries = self.entries.write().await;
        let previous_connection = entries
            .get(&provider_id)
            .and_then(|p| p.connection_id.clone());

        let presence = ProviderPresence {
            provider_id,
            location,
            instant_service_available: update.available,
            service_radius_km: update.service_radius_km,
            last_seen: Utc::now(),
            connection_id: connection_id.or(previous_connection),
        };
        entries.insert(provider_id, presence.clone());

        tracing::debug!(
            provider_id = %provider_id,
            available = presence.instant_service_available,
            "Provider presence updated"
        );

        Ok(presence)
    }

    pub async fn remove(&self, provider_id: Uuid) -> bool {
        let removed = self.entries.write().await.remove(&provider_id).is_some();
        if removed {
            tracing::info!(provider_id = %provider_id, "Provider went offline");
        }
        removed
    }

    /// Drop every entry registered through `connection_id`
    pub async fn remove_connection(&self, connection_id: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, p| p.connection_id.as_deref() != Some(connection_id));
        before - entries.len()
    }

    /// Presence for a provider that is fresh and accepting instant work
    pub async fn available(&self, provider_id: Uuid) -> Option<ProviderPresence> {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .get(&provider_id)
            .filter(|p| p.instant_service_available && self.is_fresh(p, now))
            .cloned()
    }

    pub async fn list_available(&self) -> Vec<ProviderPresence> {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|p| p.instant_service_available && self.is_fresh(p, now))
            .cloned()
            .collect()
    }

    /// Remove entries that have not pinged within the TTL
    pub async fn prune_stale(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, p| self.is_fresh(p, now));
        let pruned = before - entries.len();
        if pruned > 0 {
            tracing::info!(pruned, "Pruned stale provider presence");
        }
        pruned
    }

    fn is_fresh(&self, presence: &ProviderPresence, now: DateTime<Utc>) -> bool {
        now - presence.last_seen <= self.ttl
    }

    #[cfg(test)]
    async fn backdate(&self, provider_id: Uuid, by: Duration) {
        if let Some(p) = self.entries.write().await.get_mut(&provider_id) {
            p.last_seen = p.last_seen - by;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping(lat: f64, lon: f64, available: bool) -> PresenceUpdate {
        PresenceUpdate {
            lat,
            lon,
            available,
            service_radius_km: None,
        }
    }

    #[tokio::test]
    async fn test_update_and_lookup() {
        let presence = PresenceService::new(Duration::seconds(300));
        let provider = Uuid::new_v4();

        presence.update(provider, ping(52.5, 13.4, true)).await.unwrap();
        let found = presence.available(provider).await.unwrap();
        assert_eq!(found.location, GeoPoint::new(52.5, 13.4));
        assert_eq!(presence.list_available().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_hidden() {
        let presence = PresenceService::new(Duration::seconds(300));
        let provider = Uuid::new_v4();

        presence.update(provider, ping(52.5, 13.4, false)).await.unwrap();
        assert!(presence.available(provider).await.is_none());
        assert!(presence.list_available().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_coordinates_rejected() {
        let presence = PresenceService::new(Duration::seconds(300));
        let err = presence
            .update(Uuid::new_v4(), ping(120.0, 0.0, true))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_stale_entries_are_unavailable_and_pruned() {
        let presence = PresenceService::new(Duration::seconds(60));
        let provider = Uuid::new_v4();
        presence.update(provider, ping(0.0, 0.0, true)).await.unwrap();

        presence.backdate(provider, Duration::seconds(120)).await;

        assert!(presence.available(provider).await.is_none());
        assert_eq!(presence.prune_stale().await, 1);
        assert!(!presence.remove(provider).await);
    }

    #[tokio::test]
    async fn test_connection_close_removes_its_entries() {
        let presence = PresenceService::new(Duration::seconds(300));
        let over_ws = Uuid::new_v4();
        let over_rest = Uuid::new_v4();

        presence
            .register(over_ws, "conn-1", ping(1.0, 1.0, true))
            .await
            .unwrap();
        // A later REST ping keeps the connection binding
        presence.update(over_ws, ping(1.1, 1.0, true)).await.unwrap();
        presence.update(over_rest, ping(2.0, 2.0, true)).await.unwrap();

        assert_eq!(presence.remove_connection("conn-1").await, 1);
        assert!(presence.available(over_ws).await.is_none());
        assert!(presence.available(over_rest).await.is_some());
    }
}
