//! Per-record validation
//!
//! Lists every reason a single scored record should not be trusted on its own.
//! An empty list means the record is usable.

use super::calculator::ConfidenceScore;
use crate::evidence::EvidenceRecord;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum RecordIssue {
    NotVerified,
    BelowThreshold { score: f64, threshold: f64 },
    InformationMissing,
    InvalidOriginId { origin_record_id: String },
    MissingPayload,
    IntegrityMismatch,
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIssue::NotVerified => write!(f, "record not verified against its source"),
            RecordIssue::BelowThreshold { score, threshold } => {
                write!(f, "confidence {:.3} below threshold {:.3}", score, threshold)
            }
            RecordIssue::InformationMissing => write!(f, "source reported information missing"),
            RecordIssue::InvalidOriginId { origin_record_id } => {
                write!(f, "invalid origin record id '{}'", origin_record_id)
            }
            RecordIssue::MissingPayload => write!(f, "record carries no payload"),
            RecordIssue::IntegrityMismatch => write!(f, "payload does not match integrity digest"),
        }
    }
}

/// Collect all issues for one record and its score
pub fn validate_record(record: &EvidenceRecord, score: &ConfidenceScore, threshold: f64) -> Vec<RecordIssue> {
    let mut issues = Vec::new();

    if !record.verified() {
        issues.push(RecordIssue::NotVerified);
    }
    if score.score < threshold {
        issues.push(RecordIssue::BelowThreshold {
            score: score.score,
            threshold,
        });
    }
    if record.information_missing() {
        issues.push(RecordIssue::InformationMissing);
    }
    if !record.has_valid_origin_id() {
        issues.push(RecordIssue::InvalidOriginId {
            origin_record_id: record.origin_record_id().to_string(),
        });
    }
    if !record.information_missing() && record.payload().is_none() {
        issues.push(RecordIssue::MissingPayload);
    }
    if !record.verify_integrity() {
        issues.push(RecordIssue::IntegrityMismatch);
    }

    issues
}
