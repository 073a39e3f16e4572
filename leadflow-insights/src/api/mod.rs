//! HTTP API for leadflow-insights

pub mod health;
pub mod insights;

pub use health::health_routes;
pub use insights::get_insight;
