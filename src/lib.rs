//! Local-services marketplace backend
//!
//! Price negotiation between clients and providers, booking with per-day and
//! per-negotiation uniqueness, and geospatial dispatch of instant services.

pub mod auth;
pub mod booking;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod instant;
pub mod locks;
pub mod middleware;
pub mod models;
pub mod negotiation;
pub mod presence;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;
