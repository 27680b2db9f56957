//! HTTP API handlers for hms-wi

pub mod health;
pub mod stats;
pub mod webhooks;

pub use health::health_routes;
pub use stats::stats_routes;
pub use webhooks::webhook_routes;
