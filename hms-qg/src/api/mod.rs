//! HTTP API handlers for hms-qg

pub mod health;
pub mod prompt;
pub mod query;

pub use health::health_routes;
pub use prompt::prompt_routes;
pub use query::query_routes;
