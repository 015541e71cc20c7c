//! Negotiation models and the offer state machine
//!
//! Everything here is synchronous and storage-free: the service layer loads a
//! [`Negotiation`], applies one of these transitions, and persists the result
//! under a per-negotiation lock.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::models::{check_price_scale, Service};

/// Negotiation lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "negotiation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
    Booked,
}

impl NegotiationStatus {
    /// States from which a negotiation may be deleted
    pub fn is_deletable(&self) -> bool {
        matches!(
            self,
            NegotiationStatus::Completed | NegotiationStatus::Cancelled | NegotiationStatus::Expired
        )
    }
}

/// Offer status
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    /// Replaced by a newer offer from the same sender, or left open when the
    /// negotiation closed
    Superseded,
}

/// One directional price proposal
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Offer {
    pub id: Uuid,
    pub from_user: Uuid,
    pub to_user: Uuid,
    pub offered_price: Decimal,
    pub message: Option<String>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

/// Acceptable price band for a negotiation, always relative to the list price
/// captured when the negotiation opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceBounds {
    /// 30% band around the base price, with the floor clamped to 50%
    pub fn around(base_price: Decimal) -> Self {
        let band_floor = base_price * Decimal::new(7, 1);
        let hard_floor = base_price * Decimal::new(5, 1);
        Self {
            min: band_floor.max(hard_floor),
            max: base_price * Decimal::new(13, 1),
        }
    }

    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.min && price <= self.max
    }

    pub fn check(&self, price: Decimal) -> ApiResult<()> {
        if price <= Decimal::ZERO {
            return Err(ApiError::bad_request("Offer must be greater than zero"));
        }
        check_price_scale(price)?;
        if !self.contains(price) {
            return Err(ApiError::bad_request(format!(
                "Offer {} is outside the allowed range [{}, {}]",
                price, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Negotiation between one client and one provider over one service
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Negotiation {
    pub id: Uuid,
    pub service_id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    pub base_price: Decimal,
    pub current_offer: Decimal,
    #[sqlx(json)]
    pub offers: Vec<Offer>,
    pub status: NegotiationStatus,
    pub final_price: Option<Decimal>,
    pub cancel_reason: Option<String>,
    /// Newest pending offer addressed to the client
    pub pending_to_client: Option<Uuid>,
    /// Newest pending offer addressed to the provider
    pub pending_to_provider: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Negotiation {
    /// Open a negotiation with the client's first offer. Bounds and duplicate
    /// checks are the caller's job; this only builds the record.
    pub fn open(
        service: &Service,
        client_id: Uuid,
        initial_offer: Decimal,
        message: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let offer = Offer {
            id: Uuid::new_v4(),
            from_user: client_id,
            to_user: service.provider_id,
            offered_price: initial_offer,
            message,
            status: OfferStatus::Pending,
            created_at: now,
        };

        Self {
            id: Uuid::new_v4(),
            service_id: service.id,
            client_id,
            provider_id: service.provider_id,
            base_price: service.flat_price,
            current_offer: initial_offer,
            pending_to_client: None,
            pending_to_provider: Some(offer.id),
            offers: vec![offer],
            status: NegotiationStatus::Active,
            final_price: None,
            cancel_reason: None,
            expires_at: now + ttl,
            completed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn bounds(&self) -> PriceBounds {
        PriceBounds::around(self.base_price)
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.client_id || user_id == self.provider_id
    }

    /// The other participant, if `user_id` is one
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.client_id {
            Some(self.provider_id)
        } else if user_id == self.provider_id {
            Some(self.client_id)
        } else {
            None
        }
    }

    pub fn ensure_participant(&self, user_id: Uuid) -> ApiResult<Uuid> {
        self.counterpart_of(user_id).ok_or_else(|| {
            ApiError::forbidden("You are not a participant in this negotiation")
        })
    }

    /// Flip an overdue active negotiation to `expired`. Returns whether the
    /// status changed so the caller knows to persist it.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == NegotiationStatus::Active && now >= self.expires_at {
            self.status = NegotiationStatus::Expired;
            self.close_pending_offers();
            self.updated_at = now;
            return true;
        }
        false
    }

    /// Require the negotiation to still accept offers. Callers must run
    /// [`Negotiation::expire_if_due`] first.
    pub fn ensure_active(&self) -> ApiResult<()> {
        match self.status {
            NegotiationStatus::Active => Ok(()),
            NegotiationStatus::Expired => Err(ApiError::bad_request("Negotiation has expired")),
            other => Err(ApiError::bad_request(format!(
                "Negotiation is not active (status: {:?})",
                other
            ))),
        }
    }

    /// The actionable offer addressed to `user_id`
    pub fn pending_offer_for(&self, user_id: Uuid) -> Option<&Offer> {
        let slot = if user_id == self.client_id {
            self.pending_to_client
        } else if user_id == self.provider_id {
            self.pending_to_provider
        } else {
            None
        }?;
        self.offers.iter().find(|o| o.id == slot)
    }

    /// Append an offer from `from_user` to the counterpart. An earlier pending
    /// offer in the same direction is superseded.
    pub fn push_offer(
        &mut self,
        from_user: Uuid,
        price: Decimal,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> ApiResult<Offer> {
        let to_user = self.ensure_participant(from_user)?;
        self.ensure_active()?;
        self.bounds().check(price)?;

        if let Some(previous) = self.take_pending_slot(to_user) {
            self.set_offer_status(previous, OfferStatus::Superseded);
        }

        let offer = Offer {
            id: Uuid::new_v4(),
            from_user,
            to_user,
            offered_price: price,
            message,
            status: OfferStatus::Pending,
            created_at: now,
        };

        if to_user == self.client_id {
            self.pending_to_client = Some(offer.id);
        } else {
            self.pending_to_provider = Some(offer.id);
        }
        self.offers.push(offer.clone());
        self.current_offer = price;
        self.updated_at = now;

        Ok(offer)
    }

    /// Accept the pending offer addressed to `user_id`. The sole transition
    /// into `completed`.
    pub fn accept(&mut self, user_id: Uuid, now: DateTime<Utc>) -> ApiResult<Decimal> {
        self.ensure_participant(user_id)?;
        self.ensure_active()?;

        let offer_id = self
            .take_pending_slot(user_id)
            .ok_or_else(|| ApiError::bad_request("No pending offer to accept"))?;
        self.set_offer_status(offer_id, OfferStatus::Accepted);

        let price = self
            .offers
            .iter()
            .find(|o| o.id == offer_id)
            .map(|o| o.offered_price)
            .ok_or_else(|| ApiError::InternalError("Pending offer missing from history".into()))?;

        self.status = NegotiationStatus::Completed;
        self.final_price = Some(price);
        self.current_offer = price;
        self.completed_at = Some(now);
        self.close_pending_offers();
        self.updated_at = now;

        Ok(price)
    }

    /// Decline the pending offer addressed to `user_id`, ending the negotiation
    pub fn decline(
        &mut self,
        user_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ApiResult<()> {
        self.ensure_participant(user_id)?;
        self.ensure_active()?;

        let offer_id = self
            .take_pending_slot(user_id)
            .ok_or_else(|| ApiError::bad_request("No pending offer to decline"))?;
        self.set_offer_status(offer_id, OfferStatus::Declined);

        self.status = NegotiationStatus::Cancelled;
        self.cancel_reason = reason.or_else(|| Some("Offer declined".to_string()));
        self.close_pending_offers();
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(
        &mut self,
        user_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ApiResult<()> {
        self.ensure_participant(user_id)?;
        self.ensure_active()?;

        self.status = NegotiationStatus::Cancelled;
        self.cancel_reason = reason;
        self.close_pending_offers();
        self.updated_at = now;
        Ok(())
    }

    /// Mark the record as consumed by a booking
    pub fn mark_booked(&mut self, now: DateTime<Utc>) -> ApiResult<()> {
        if self.status != NegotiationStatus::Completed {
            return Err(ApiError::bad_request(format!(
                "Negotiation cannot be booked from status {:?}",
                self.status
            )));
        }
        self.status = NegotiationStatus::Booked;
        self.updated_at = now;
        Ok(())
    }

    fn take_pending_slot(&mut self, to_user: Uuid) -> Option<Uuid> {
        if to_user == self.client_id {
            self.pending_to_client.take()
        } else if to_user == self.provider_id {
            self.pending_to_provider.take()
        } else {
            None
        }
    }

    fn set_offer_status(&mut self, offer_id: Uuid, status: OfferStatus) {
        if let Some(offer) = self.offers.iter_mut().find(|o| o.id == offer_id) {
            offer.status = status;
        }
    }

    // A closed negotiation has no actionable offers left
    fn close_pending_offers(&mut self) {
        self.pending_to_client = None;
        self.pending_to_provider = None;
        for offer in self.offers.iter_mut() {
            if offer.status == OfferStatus::Pending {
                offer.status = OfferStatus::Superseded;
            }
        }
    }
}

/// Request DTO for opening a negotiation
#[derive(Debug, Deserialize, Validate)]
pub struct StartNegotiationRequest {
    pub service_id: Uuid,
    pub initial_offer: Decimal,
    #[validate(length(max = 1000))]
    pub message: Option<String>,
}

/// Request DTO for a counter offer
#[derive(Debug, Deserialize, Validate)]
pub struct CounterOfferRequest {
    pub counter_offer: Decimal,
    #[validate(length(max = 1000))]
    pub message: Option<String>,
}

/// Request DTO carrying an optional reason (decline / cancel)
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Query parameters for listing negotiations
#[derive(Debug, Deserialize)]
pub struct ListNegotiationsQuery {
    pub status: Option<NegotiationStatus>,
}

/// Negotiation events for real-time updates
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type")]
pub enum NegotiationEvent {
    Started {
        negotiation_id: Uuid,
        client_id: Uuid,
        provider_id: Uuid,
        offer: Decimal,
    },
    OfferMade {
        negotiation_id: Uuid,
        from_user: Uuid,
        to_user: Uuid,
        offer: Decimal,
    },
    Accepted {
        negotiation_id: Uuid,
        final_price: Decimal,
    },
    Declined {
        negotiation_id: Uuid,
        reason: Option<String>,
    },
    Cancelled {
        negotiation_id: Uuid,
    },
}
