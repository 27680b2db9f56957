//! Confidence pipeline
//!
//! Evidence records flow through three pure stages:
//! 1. [`ConfidenceCalculator`] scores each record on its own
//! 2. [`ConfidenceAggregator`] blends the per-source scores and surfaces conflicts
//! 3. [`decide`] turns the aggregate into "answerable" or "unknown"
//!
//! None of the stages hold mutable state or perform I/O, so they are safe to
//! call concurrently from any number of query-time tasks.

pub mod aggregator;
pub mod calculator;
pub mod gate;
pub mod validation;

pub use aggregator::{AggregateDecision, ConfidenceAggregator, ConflictSide, FieldConflict, ScoredEvidence};
pub use calculator::{ConfidenceCalculator, ConfidenceScore, ScoringWeights};
pub use gate::{decide, GateVerdict, UnknownReason};
pub use validation::{validate_record, RecordIssue};

use thiserror::Error;

/// Default confidence threshold
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Contract violations in the confidence pipeline.
///
/// These are programming errors on the caller's side; they are returned
/// instead of being coerced into a default.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfidenceError {
    /// Threshold outside [0, 1] (or NaN)
    #[error("Invalid threshold {0}: must be within [0, 1]")]
    InvalidThreshold(f64),

    /// Aggregation or gating requested with no evidence
    #[error("No evidence records supplied")]
    EmptyEvidence,

    /// Records and scores are not paired one to one
    #[error("Mismatched input: {records} records but {scores} scores")]
    MismatchedScores { records: usize, scores: usize },

    /// Scoring weights outside [0, 1] or not summing to 1
    #[error("Invalid weights: {0}")]
    InvalidWeights(String),
}

/// Reject thresholds outside [0, 1]
pub fn check_threshold(threshold: f64) -> Result<f64, ConfidenceError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ConfidenceError::InvalidThreshold(threshold))
    }
}
