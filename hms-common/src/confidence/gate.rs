//! Confidence gate
//!
//! Final answerable/unknown decision over an [`AggregateDecision`]. Rules are
//! evaluated in order; the first that matches wins:
//! 1. nothing found in any source: `NoData`
//! 2. aggregate below threshold: `BelowThreshold`
//! 3. no record is verified (a verified `missing` record counts): `NoVerifiedSource`
//! 4. otherwise: `Answerable`, carrying evidence and any conflicts

use super::aggregator::{AggregateDecision, FieldConflict, ScoredEvidence};
use super::{check_threshold, ConfidenceError};
use serde::Serialize;
use std::fmt;

/// Why a query could not be answered
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnknownReason {
    NoData,
    BelowThreshold { confidence: f64, threshold: f64 },
    NoVerifiedSource,
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReason::NoData => write!(f, "no data in any source"),
            UnknownReason::BelowThreshold {
                confidence,
                threshold,
            } => write!(
                f,
                "confidence {:.3} is below threshold {:.3} (gap {:.3})",
                confidence,
                threshold,
                threshold - confidence
            ),
            UnknownReason::NoVerifiedSource => write!(f, "no verified source"),
        }
    }
}

/// Gate outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GateVerdict {
    /// Evidence may be used; conflicts are surfaced, never resolved here
    Answerable {
        aggregated_confidence: f64,
        evidence: Vec<ScoredEvidence>,
        conflicts: Vec<FieldConflict>,
    },
    /// Caller must respond with "I don't know"
    Unknown { reason: UnknownReason },
}

impl GateVerdict {
    pub fn is_answerable(&self) -> bool {
        matches!(self, GateVerdict::Answerable { .. })
    }

    pub fn unknown_reason(&self) -> Option<&UnknownReason> {
        match self {
            GateVerdict::Unknown { reason } => Some(reason),
            GateVerdict::Answerable { .. } => None,
        }
    }
}

/// Decide whether the aggregate may be used as an answer
///
/// # Errors
/// `InvalidThreshold` for a threshold outside [0, 1]; `EmptyEvidence` for a
/// decision that carries no records.
pub fn decide(decision: &AggregateDecision, threshold: f64) -> Result<GateVerdict, ConfidenceError> {
    let threshold = check_threshold(threshold)?;
    if decision.evidence.is_empty() {
        return Err(ConfidenceError::EmptyEvidence);
    }

    let verdict = if decision.information_not_found {
        GateVerdict::Unknown {
            reason: UnknownReason::NoData,
        }
    } else if decision.aggregated_confidence < threshold {
        GateVerdict::Unknown {
            reason: UnknownReason::BelowThreshold {
                confidence: decision.aggregated_confidence,
                threshold,
            },
        }
    } else if decision.verified_sources == 0 {
        GateVerdict::Unknown {
            reason: UnknownReason::NoVerifiedSource,
        }
    } else {
        GateVerdict::Answerable {
            aggregated_confidence: decision.aggregated_confidence,
            evidence: decision.evidence.clone(),
            conflicts: decision.conflicts.clone(),
        }
    };

    match &verdict {
        GateVerdict::Answerable { conflicts, .. } => tracing::debug!(
            confidence = decision.aggregated_confidence,
            threshold,
            conflicts = conflicts.len(),
            "Gate: answerable"
        ),
        GateVerdict::Unknown { reason } => tracing::debug!(
            confidence = decision.aggregated_confidence,
            threshold,
            reason = %reason,
            "Gate: unknown"
        ),
    }

    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::aggregator::ConfidenceAggregator;
    use crate::confidence::calculator::ConfidenceScore;
    use crate::evidence::{EvidenceRecord, SourceIdentity};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn score(value: f64) -> ConfidenceScore {
        ConfidenceScore {
            score: value,
            reasoning: String::new(),
            factors: BTreeMap::new(),
        }
    }

    fn aggregate(records: Vec<EvidenceRecord>, scores: Vec<f64>, threshold: f64) -> AggregateDecision {
        let scores: Vec<_> = scores.into_iter().map(score).collect();
        ConfidenceAggregator::default()
            .aggregate(&records, &scores, threshold)
            .unwrap()
    }

    #[test]
    fn test_no_data_wins_first() {
        let decision = aggregate(vec![EvidenceRecord::missing(SourceIdentity::Supabase)], vec![0.0], 0.0);
        let verdict = decide(&decision, 0.0).unwrap();
        assert_eq!(verdict.unknown_reason(), Some(&UnknownReason::NoData));
    }

    #[test]
    fn test_below_threshold_reports_gap() {
        let decision = aggregate(
            vec![EvidenceRecord::found(SourceIdentity::Supabase, "1", json!({"a": 1}))],
            vec![0.6],
            0.85,
        );
        let verdict = decide(&decision, 0.85).unwrap();
        let reason = verdict.unknown_reason().unwrap();
        assert!(matches!(reason, UnknownReason::BelowThreshold { .. }));
        assert!(reason.to_string().contains("gap 0.250"));
    }

    #[test]
    fn test_unverified_only_is_unknown() {
        let decision = aggregate(
            vec![EvidenceRecord::found(SourceIdentity::Notion, "p", json!({"a": 1})).with_verified(false)],
            vec![0.95],
            0.85,
        );
        let verdict = decide(&decision, 0.85).unwrap();
        assert_eq!(verdict.unknown_reason(), Some(&UnknownReason::NoVerifiedSource));
    }

    #[test]
    fn test_verified_missing_record_lets_unverified_data_through() {
        let decision = aggregate(
            vec![
                EvidenceRecord::found(SourceIdentity::Supabase, "1", json!({"a": 1})).with_verified(false),
                EvidenceRecord::missing(SourceIdentity::Notion),
            ],
            vec![0.985, 0.0],
            0.85,
        );
        assert!(decide(&decision, 0.85).unwrap().is_answerable());
    }

    #[test]
    fn test_answerable_carries_conflicts() {
        let decision = aggregate(
            vec![
                EvidenceRecord::found(SourceIdentity::Supabase, "1", json!({"price": 10})),
                EvidenceRecord::found(SourceIdentity::Notion, "p", json!({"price": 11})),
            ],
            vec![0.95, 0.9],
            0.85,
        );
        match decide(&decision, 0.85).unwrap() {
            GateVerdict::Answerable {
                conflicts, evidence, ..
            } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(evidence.len(), 2);
            }
            other => panic!("expected answerable, got {:?}", other),
        }
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let decision = aggregate(
            vec![EvidenceRecord::found(SourceIdentity::Supabase, "1", json!({"a": 1}))],
            vec![0.85],
            0.85,
        );
        assert!(decide(&decision, 0.85).unwrap().is_answerable());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let decision = aggregate(vec![EvidenceRecord::missing(SourceIdentity::Notion)], vec![0.0], 0.5);
        assert_eq!(decide(&decision, -0.1), Err(ConfidenceError::InvalidThreshold(-0.1)));
        assert!(decide(&decision, f64::NAN).is_err());
    }

    #[test]
    fn test_verdict_serializes_tagged() {
        let decision = aggregate(vec![EvidenceRecord::missing(SourceIdentity::Notion)], vec![0.0], 0.5);
        let json = serde_json::to_value(decide(&decision, 0.5).unwrap()).unwrap();
        assert_eq!(json["verdict"], "unknown");
        assert_eq!(json["reason"]["reason"], "no_data");
    }
}
