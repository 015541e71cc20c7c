//! Price negotiation between a client and a service provider

pub mod model;
pub mod service;

pub use model::{
    CounterOfferRequest, ListNegotiationsQuery, Negotiation, NegotiationEvent, NegotiationStatus,
    Offer, OfferStatus, PriceBounds, ReasonRequest, StartNegotiationRequest,
};
pub use service::NegotiationService;
