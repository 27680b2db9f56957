//! Confidence Aggregator
//!
//! Fuses per-source scores into one decision.
//!
//! # Algorithm
//! 1. Partition records into found and missing
//! 2. No found records: `information_not_found`, confidence 0.0, terminal
//! 3. Weighted mean of found scores by source aggregation weight, normalized by
//!    the weights actually present (absent sources do not dilute the mean)
//! 4. Conflict detection on fields shared by found records of different sources
//! 5. `meets_threshold = confidence >= threshold && !not_found && any verified`,
//!    where "any verified" looks at every record, including `missing` ones
//!
//! Unverified evidence still contributes to the mean. Verification only gates
//! `meets_threshold`; dropping unverified records would hide real conflicts.

use super::calculator::ConfidenceScore;
use super::{check_threshold, ConfidenceError};
use crate::evidence::{EvidenceRecord, SourceIdentity, SourcePolicy};
use crate::payload;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// A record paired with its confidence score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEvidence {
    pub record: EvidenceRecord,
    pub confidence: ConfidenceScore,
}

/// One side of a field-level disagreement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictSide {
    pub origin: SourceIdentity,
    pub origin_record_id: String,
    pub value: Value,
    pub confidence: f64,
}

/// Two sources disagree on one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConflict {
    pub field: String,
    pub left: ConflictSide,
    pub right: ConflictSide,
}

/// Result of aggregating one query's evidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateDecision {
    pub aggregated_confidence: f64,
    pub threshold: f64,
    pub meets_threshold: bool,
    /// True iff every record reported information missing
    pub information_not_found: bool,
    /// Records with `verified` set, found or not; a source that answered
    /// "no data" is a verified answer
    pub verified_sources: usize,
    pub conflicts: Vec<FieldConflict>,
    pub evidence: Vec<ScoredEvidence>,
}

impl AggregateDecision {
    pub fn found_count(&self) -> usize {
        self.evidence
            .iter()
            .filter(|e| !e.record.information_missing())
            .count()
    }
}

/// Multi-source confidence fusion
#[derive(Debug, Clone, Default)]
pub struct ConfidenceAggregator {
    sources: SourcePolicy,
}

impl ConfidenceAggregator {
    pub fn new(sources: SourcePolicy) -> Self {
        Self { sources }
    }

    /// Aggregate records and their scores (paired by index)
    ///
    /// # Errors
    /// Contract violations: empty input, records/scores length mismatch,
    /// threshold outside [0, 1].
    pub fn aggregate(
        &self,
        records: &[EvidenceRecord],
        scores: &[ConfidenceScore],
        threshold: f64,
    ) -> Result<AggregateDecision, ConfidenceError> {
        let threshold = check_threshold(threshold)?;
        if records.is_empty() {
            return Err(ConfidenceError::EmptyEvidence);
        }
        if records.len() != scores.len() {
            return Err(ConfidenceError::MismatchedScores {
                records: records.len(),
                scores: scores.len(),
            });
        }

        let evidence: Vec<ScoredEvidence> = records
            .iter()
            .zip(scores)
            .map(|(record, confidence)| ScoredEvidence {
                record: record.clone(),
                confidence: confidence.clone(),
            })
            .collect();

        let verified_sources = evidence.iter().filter(|e| e.record.verified()).count();

        // Step 1: Partition
        let found: Vec<&ScoredEvidence> = evidence
            .iter()
            .filter(|e| !e.record.information_missing())
            .collect();

        // Step 2: Nothing found anywhere
        if found.is_empty() {
            tracing::debug!(records = records.len(), "Aggregation: no source returned data");
            return Ok(AggregateDecision {
                aggregated_confidence: 0.0,
                threshold,
                meets_threshold: false,
                information_not_found: true,
                verified_sources,
                conflicts: Vec::new(),
                evidence,
            });
        }

        // Step 3: Weighted mean over the sources present
        let (weighted_sum, weight_total) = found.iter().fold((0.0, 0.0), |(sum, total), e| {
            let weight = self.sources.aggregation_weight(e.record.origin()).max(0.0);
            (sum + e.confidence.score * weight, total + weight)
        });
        let aggregated_confidence = if weight_total > 0.0 {
            (weighted_sum / weight_total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Step 4: Conflicts
        let conflicts = detect_conflicts(&found);

        // Step 5: Threshold decision
        let meets_threshold = aggregated_confidence >= threshold && verified_sources > 0;

        tracing::debug!(
            aggregated_confidence,
            threshold,
            found = found.len(),
            verified_sources,
            conflicts = conflicts.len(),
            "Aggregation complete"
        );

        Ok(AggregateDecision {
            aggregated_confidence,
            threshold,
            meets_threshold,
            information_not_found: false,
            verified_sources,
            conflicts,
            evidence,
        })
    }
}

/// Field-level disagreements between found records of different origins
fn detect_conflicts(found: &[&ScoredEvidence]) -> Vec<FieldConflict> {
    let fields: BTreeSet<&String> = found
        .iter()
        .filter_map(|e| e.record.payload())
        .flat_map(payload::field_names)
        .collect();

    let mut conflicts = Vec::new();
    for field in fields {
        let holders: Vec<(&ScoredEvidence, &Value)> = found
            .iter()
            .filter_map(|e| {
                e.record
                    .payload()
                    .and_then(|p| p.get(field.as_str()))
                    .map(|v| (*e, v))
            })
            .collect();

        for (i, (left, left_value)) in holders.iter().enumerate() {
            for (right, right_value) in holders.iter().skip(i + 1) {
                if left.record.origin() == right.record.origin() {
                    continue;
                }
                if !payload::values_agree(left_value, right_value) {
                    conflicts.push(FieldConflict {
                        field: field.clone(),
                        left: side(left, left_value),
                        right: side(right, right_value),
                    });
                }
            }
        }
    }
    conflicts
}

fn side(evidence: &ScoredEvidence, value: &Value) -> ConflictSide {
    ConflictSide {
        origin: evidence.record.origin().clone(),
        origin_record_id: evidence.record.origin_record_id().to_string(),
        value: value.clone(),
        confidence: evidence.confidence.score,
    }
}
