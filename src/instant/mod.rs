//! Instant (on-demand) service dispatch

mod model;
mod service;

pub use model::*;
pub use service::InstantDispatchService;
