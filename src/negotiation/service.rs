//! Negotiation service layer - offer/counter-offer lifecycle

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use super::model::{
    CounterOfferRequest, Negotiation, NegotiationStatus, StartNegotiationRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::locks::KeyedLocks;
use crate::store::MarketStore;

/// Negotiation engine
///
/// Every mutation runs under a per-negotiation lock and is persisted with an
/// optimistic version check, so concurrent writers in other processes turn
/// into conflicts rather than lost updates.
#[derive(Clone)]
pub struct NegotiationService {
    store: Arc<dyn MarketStore>,
    locks: KeyedLocks<Uuid>,
    start_locks: KeyedLocks<(Uuid, Uuid)>,
    ttl: Duration,
}

impl NegotiationService {
    pub fn new(store: Arc<dyn MarketStore>, ttl: Duration) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            start_locks: KeyedLocks::new(),
            ttl,
        }
    }

    /// Lock map keyed by negotiation id, shared with the booking engine
    pub fn locks(&self) -> KeyedLocks<Uuid> {
        self.locks.clone()
    }

    /// Open a negotiation on a service with the client's first offer
    pub async fn start_negotiation(
        &self,
        client_id: Uuid,
        request: StartNegotiationRequest,
    ) -> ApiResult<Negotiation> {
        request.validate()?;

        let service = self
            .store
            .get_service(request.service_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Service"))?;

        if !service.active {
            return Err(ApiError::bad_request("Service is not active"));
        }
        if service.is_owned_by(client_id) {
            return Err(ApiError::bad_request(
                "Cannot negotiate on your own service",
            ));
        }
        if request.initial_offer == service.flat_price {
            return Err(ApiError::bad_request(
                "Initial offer equals the listed price, book the service directly",
            ));
        }

        let _guard = self.start_locks.lock((service.id, client_id)).await;
        let now = Utc::now();

        if let Some(mut existing) = self
            .store
            .find_active_negotiation(service.id, client_id)
            .await?
        {
            if existing.expire_if_due(now) {
                self.persist(&mut existing).await?;
            } else {
                return Err(ApiError::bad_request(
                    "An active negotiation already exists for this service",
                ));
            }
        }

        let negotiation = Negotiation::open(
            &service,
            client_id,
            request.initial_offer,
            request.message,
            now,
            self.ttl,
        );
        negotiation.bounds().check(request.initial_offer)?;

        self.store.insert_negotiation(&negotiation).await?;

        tracing::info!(
            negotiation_id = %negotiation.id,
            service_id = %service.id,
            client_id = %client_id,
            offer = %request.initial_offer,
            "Negotiation started"
        );

        Ok(negotiation)
    }

    pub async fn make_counter_offer(
        &self,
        negotiation_id: Uuid,
        user_id: Uuid,
        request: CounterOfferRequest,
    ) -> ApiResult<Negotiation> {
        request.validate()?;

        let negotiation = self
            .mutate(negotiation_id, user_id, |n, now| {
                n.push_offer(user_id, request.counter_offer, request.message, now)
                    .map(|_| ())
            })
            .await?;

        tracing::info!(
            negotiation_id = %negotiation_id,
            user_id = %user_id,
            offer = %negotiation.current_offer,
            round = negotiation.offers.len(),
            "Counter offer made"
        );

        Ok(negotiation)
    }

    pub async fn accept_offer(&self, negotiation_id: Uuid, user_id: Uuid) -> ApiResult<Negotiation> {
        let negotiation = self
            .mutate(negotiation_id, user_id, |n, now| n.accept(user_id, now).map(|_| ()))
            .await?;

        tracing::info!(
            negotiation_id = %negotiation_id,
            user_id = %user_id,
            final_price = ?negotiation.final_price,
            "Offer accepted, negotiation completed"
        );

        Ok(negotiation)
    }

    pub async fn decline_offer(
        &self,
        negotiation_id: Uuid,
        user_id: Uuid,
        reason: Option<String>,
    ) -> ApiResult<Negotiation> {
        let negotiation = self
            .mutate(negotiation_id, user_id, |n, now| n.decline(user_id, reason, now))
            .await?;

        tracing::info!(
            negotiation_id = %negotiation_id,
            user_id = %user_id,
            "Offer declined"
        );

        Ok(negotiation)
    }

    pub async fn cancel_negotiation(
        &self,
        negotiation_id: Uuid,
        user_id: Uuid,
        reason: Option<String>,
    ) -> ApiResult<Negotiation> {
        let negotiation = self
            .mutate(negotiation_id, user_id, |n, now| n.cancel(user_id, reason, now))
            .await?;

        tracing::info!(
            negotiation_id = %negotiation_id,
            user_id = %user_id,
            "Negotiation cancelled"
        );

        Ok(negotiation)
    }

    /// Remove a closed negotiation. Active and booked ones are kept.
    pub async fn delete_negotiation(&self, negotiation_id: Uuid, user_id: Uuid) -> ApiResult<()> {
        let _guard = self.locks.lock(negotiation_id).await;

        let mut negotiation = self.load(negotiation_id).await?;
        negotiation.ensure_participant(user_id)?;

        if negotiation.expire_if_due(Utc::now()) {
            self.persist(&mut negotiation).await?;
        }

        if !negotiation.status.is_deletable() {
            return Err(ApiError::bad_request(match negotiation.status {
                NegotiationStatus::Active => "Cannot delete an active negotiation",
                _ => "Cannot delete a negotiation that has been booked",
            }));
        }

        if !self.store.delete_negotiation(negotiation_id).await? {
            return Err(ApiError::not_found("Negotiation"));
        }

        tracing::info!(
            negotiation_id = %negotiation_id,
            user_id = %user_id,
            "Negotiation deleted"
        );

        Ok(())
    }

    pub async fn get_negotiation(&self, negotiation_id: Uuid, user_id: Uuid) -> ApiResult<Negotiation> {
        let mut negotiation = self.load(negotiation_id).await?;
        negotiation.ensure_participant(user_id)?;
        self.refresh(&mut negotiation).await;
        Ok(negotiation)
    }

    /// Negotiations the user takes part in, newest first
    pub async fn list_negotiations(
        &self,
        user_id: Uuid,
        status: Option<NegotiationStatus>,
    ) -> ApiResult<Vec<Negotiation>> {
        let mut negotiations = self.store.list_negotiations_for_user(user_id, None).await?;
        for negotiation in negotiations.iter_mut() {
            self.refresh(negotiation).await;
        }
        negotiations.retain(|n| status.map_or(true, |s| n.status == s));
        Ok(negotiations)
    }

    /// Load, check participation and expiry, apply `change`, persist
    async fn mutate<F>(&self, negotiation_id: Uuid, user_id: Uuid, change: F) -> ApiResult<Negotiation>
    where
        F: FnOnce(&mut Negotiation, DateTime<Utc>) -> ApiResult<()>,
    {
        let _guard = self.locks.lock(negotiation_id).await;

        let mut negotiation = self.load(negotiation_id).await?;
        negotiation.ensure_participant(user_id)?;

        let now = Utc::now();
        if negotiation.expire_if_due(now) {
            self.persist(&mut negotiation).await?;
            tracing::info!(negotiation_id = %negotiation_id, "Negotiation expired");
            return Err(ApiError::bad_request("Negotiation has expired"));
        }

        change(&mut negotiation, now)?;
        self.persist(&mut negotiation).await?;

        Ok(negotiation)
    }

    async fn load(&self, negotiation_id: Uuid) -> ApiResult<Negotiation> {
        self.store
            .get_negotiation(negotiation_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Negotiation"))
    }

    async fn persist(&self, negotiation: &mut Negotiation) -> ApiResult<()> {
        let expected = negotiation.version;
        negotiation.version += 1;
        self.store.update_negotiation(negotiation, expected).await
    }

    // Reads expire lazily too; a lost race here only means someone else
    // already wrote a newer state.
    async fn refresh(&self, negotiation: &mut Negotiation) {
        if negotiation.expire_if_due(Utc::now()) {
            if let Err(e) = self.persist(negotiation).await {
                tracing::debug!(
                    negotiation_id = %negotiation.id,
                    error = %e,
                    "Could not persist lazy expiry"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Service;
    use crate::store::MemoryStore;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    async fn setup() -> (NegotiationService, Arc<dyn MarketStore>, Service) {
        setup_priced(Decimal::from(100)).await
    }

    async fn setup_priced(
        flat_price: Decimal,
    ) -> (NegotiationService, Arc<dyn MarketStore>, Service) {
        let store: Arc<dyn MarketStore> = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let service = Service {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            title: "Gutter cleaning".to_string(),
            category: "cleaning".to_string(),
            flat_price,
            latitude: 0.0,
            longitude: 0.0,
            service_radius_km: 10.0,
            base_duration_minutes: 60,
            instant_service_enabled: false,
            active: true,
            created_at: now,
            updated_at: now,
        };
        store.insert_service(&service).await.unwrap();
        (
            NegotiationService::new(store.clone(), Duration::hours(48)),
            store,
            service,
        )
    }

    fn start(service: &Service, offer: i64) -> StartNegotiationRequest {
        StartNegotiationRequest {
            service_id: service.id,
            initial_offer: Decimal::from(offer),
            message: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_active_negotiation_rejected() {
        let (engine, _, service) = setup().await;
        let client = Uuid::new_v4();

        engine.start_negotiation(client, start(&service, 80)).await.unwrap();
        let err = engine
            .start_negotiation(client, start(&service, 85))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_expired_negotiation_is_persisted_before_error() {
        let (engine, store, service) = setup().await;
        let client = Uuid::new_v4();

        let mut negotiation = engine.start_negotiation(client, start(&service, 80)).await.unwrap();
        let expected = negotiation.version;
        negotiation.expires_at = Utc::now() - Duration::minutes(1);
        negotiation.version += 1;
        store.update_negotiation(&negotiation, expected).await.unwrap();

        let err = engine
            .accept_offer(negotiation.id, service.provider_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let stored = store.get_negotiation(negotiation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NegotiationStatus::Expired);

        // A fresh negotiation may now be opened
        engine.start_negotiation(client, start(&service, 90)).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let (engine, _, service) = setup().await;
        let client = Uuid::new_v4();
        let negotiation = engine.start_negotiation(client, start(&service, 80)).await.unwrap();

        let err = engine.delete_negotiation(negotiation.id, client).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        engine.cancel_negotiation(negotiation.id, client, None).await.unwrap();

        let err = engine
            .delete_negotiation(negotiation.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        engine.delete_negotiation(negotiation.id, client).await.unwrap();
        let err = engine.get_negotiation(negotiation.id, client).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let (engine, _, service) = setup().await;
        let client = Uuid::new_v4();
        let negotiation = engine.start_negotiation(client, start(&service, 80)).await.unwrap();
        engine.cancel_negotiation(negotiation.id, client, None).await.unwrap();
        engine.start_negotiation(client, start(&service, 90)).await.unwrap();

        let all = engine.list_negotiations(client, None).await.unwrap();
        assert_eq!(all.len(), 2);
        let active = engine
            .list_negotiations(client, Some(NegotiationStatus::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        let for_provider = engine.list_negotiations(service.provider_id, None).await.unwrap();
        assert_eq!(for_provider.len(), 2);
        assert!(engine
            .list_negotiations(Uuid::new_v4(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_sub_cent_offer_rejected_before_storage() {
        let (engine, store, service) = setup_priced(Decimal::new(3333, 2)).await;
        let client = Uuid::new_v4();

        let request = StartNegotiationRequest {
            service_id: service.id,
            initial_offer: Decimal::new(23333, 3),
            message: None,
        };
        let err = engine.start_negotiation(client, request).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        assert!(store
            .find_active_negotiation(service.id, client)
            .await
            .unwrap()
            .is_none());

        let mut sub_cent = service.clone();
        sub_cent.id = Uuid::new_v4();
        sub_cent.flat_price = Decimal::new(33333, 3);
        let err = store.insert_service(&sub_cent).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    proptest! {
        #[test]
        fn prop_initial_offer_accepted_only_inside_band(
            price_cents in 1i64..2_000_000,
            ratio_pct in 40i64..140,
            delta_cents in -3i64..=3,
            sub_cent in prop::sample::select(vec![0i64, 0, 0, 1, 5]),
        ) {
            let flat_price = Decimal::new(price_cents, 2);
            let offer = Decimal::new(price_cents * ratio_pct / 100 + delta_cents, 2)
                + Decimal::new(sub_cent, 3);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let accepted = runtime.block_on(async {
                let (engine, _, service) = setup_priced(flat_price).await;
                let request = StartNegotiationRequest {
                    service_id: service.id,
                    initial_offer: offer,
                    message: None,
                };
                engine.start_negotiation(Uuid::new_v4(), request).await.is_ok()
            });

            let floor = (flat_price * Decimal::new(7, 1)).max(flat_price * Decimal::new(5, 1));
            let ceiling = flat_price * Decimal::new(13, 1);
            let whole_cents = offer.round_dp(2) == offer;
            let in_band = floor <= offer && offer <= ceiling;
            prop_assert_eq!(accepted, whole_cents && in_band && offer != flat_price);
        }
    }
}
