//! # HMS Common Library
//!
//! Shared code for the HMS microservices including:
//! - Evidence record model and integrity digests
//! - Payload helpers (completeness, filter matching, value normalization)
//! - Confidence calculation, aggregation and gating
//! - Webhook event model
//! - Process-wide metrics recorder
//! - Collaborator contracts (source clients, evidence cache, index hooks)
//! - Configuration loading

pub mod cache;
pub mod confidence;
pub mod config;
pub mod error;
pub mod evidence;
pub mod hooks;
pub mod metrics;
pub mod notion;
pub mod payload;
pub mod sources;
pub mod time;
pub mod webhook;

pub use error::{Error, Result};
pub use evidence::{EvidenceRecord, SourceIdentity, SourcePolicy};
pub use metrics::{MetricsRecorder, MetricsState};
pub use webhook::{EventType, WebhookEvent};
