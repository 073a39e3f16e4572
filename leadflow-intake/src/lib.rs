//! leadflow-intake library - lead intake service
//!
//! Accepts lead submissions over HTTP, persists each exactly once per
//! idempotency key, and publishes `lead.created` after the commit.

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod idempotency;
pub mod reconcile;
pub mod service;

pub use service::{IntakeError, LeadCreation, LeadService};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LeadService>,
}

impl AppState {
    /// Create new application state
    pub fn new(service: Arc<LeadService>) -> Self {
        Self { service }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::lead_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
