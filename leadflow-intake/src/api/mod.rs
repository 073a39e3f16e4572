//! HTTP API for leadflow-intake

pub mod health;
pub mod leads;

pub use health::health_routes;
pub use leads::lead_routes;
