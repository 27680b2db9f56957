//! Confidence Calculator
//!
//! Scores a single evidence record from three factors:
//! - completeness: share of payload fields that carry data
//! - filter match: share of query filters satisfied by the payload
//! - source reliability: fixed per-source weight
//!
//! `score = completeness * 0.3 + filter_match * 0.4 + source_reliability * 0.3`
//! by default. A record flagged "information missing" always scores 0.0.

use super::ConfidenceError;
use crate::evidence::{EvidenceRecord, SourcePolicy};
use crate::payload;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Factor name: completeness
pub const FACTOR_COMPLETENESS: &str = "completeness";
/// Factor name: filter match
pub const FACTOR_FILTER_MATCH: &str = "filter_match";
/// Factor name: source reliability
pub const FACTOR_SOURCE_RELIABILITY: &str = "source_reliability";

/// Weights applied to the three confidence factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    completeness: f64,
    filter_match: f64,
    source_reliability: f64,
}

impl ScoringWeights {
    /// Build a weight set; each weight must be in [0, 1] and they must sum to 1
    pub fn new(completeness: f64, filter_match: f64, source_reliability: f64) -> Result<Self, ConfidenceError> {
        for (name, w) in [
            (FACTOR_COMPLETENESS, completeness),
            (FACTOR_FILTER_MATCH, filter_match),
            (FACTOR_SOURCE_RELIABILITY, source_reliability),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(ConfidenceError::InvalidWeights(format!(
                    "{} weight {} outside [0, 1]",
                    name, w
                )));
            }
        }
        let sum = completeness + filter_match + source_reliability;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfidenceError::InvalidWeights(format!(
                "weights sum to {:.6}, expected 1.0",
                sum
            )));
        }
        Ok(Self {
            completeness,
            filter_match,
            source_reliability,
        })
    }

    pub fn completeness(&self) -> f64 {
        self.completeness
    }

    pub fn filter_match(&self) -> f64 {
        self.filter_match
    }

    pub fn source_reliability(&self) -> f64 {
        self.source_reliability
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            completeness: 0.3,
            filter_match: 0.4,
            source_reliability: 0.3,
        }
    }
}

/// Confidence score with reasoning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Combined score in [0, 1]
    pub score: f64,
    /// Human-readable explanation
    pub reasoning: String,
    /// Named sub-scores, each in [0, 1]
    pub factors: BTreeMap<String, f64>,
}

impl ConfidenceScore {
    pub fn factor(&self, name: &str) -> Option<f64> {
        self.factors.get(name).copied()
    }
}

/// Per-record confidence scoring
#[derive(Debug, Clone, Default)]
pub struct ConfidenceCalculator {
    weights: ScoringWeights,
    sources: SourcePolicy,
}

impl ConfidenceCalculator {
    /// Calculator with default weights and source table
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(weights: ScoringWeights, sources: SourcePolicy) -> Self {
        Self { weights, sources }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score one record against the query filters
    pub fn score(&self, record: &EvidenceRecord, filters: &Map<String, Value>) -> ConfidenceScore {
        let reliability = self.sources.reliability(record.origin()).clamp(0.0, 1.0);

        if record.information_missing() {
            let reasoning = match record.note() {
                Some(note) if !record.verified() => {
                    format!("No data retrieved from {}: query error ({})", record.origin(), note)
                }
                _ => format!("No data found in {}", record.origin()),
            };
            return ConfidenceScore {
                score: 0.0,
                reasoning,
                factors: factors(0.0, 0.0, reliability),
            };
        }

        let (completeness, filter_match) = match record.payload() {
            Some(payload) => (payload::completeness(payload), payload::filter_match(payload, filters)),
            None => (0.0, if filters.is_empty() { 1.0 } else { 0.0 }),
        };

        let score = (completeness * self.weights.completeness
            + filter_match * self.weights.filter_match
            + reliability * self.weights.source_reliability)
            .clamp(0.0, 1.0);

        let reasoning = format!(
            "Data from {} {} source with {:.1}% completeness and {:.1}% filter match",
            if record.verified() { "verified" } else { "unverified" },
            record.origin(),
            completeness * 100.0,
            filter_match * 100.0
        );

        ConfidenceScore {
            score,
            reasoning,
            factors: factors(completeness, filter_match, reliability),
        }
    }
}

fn factors(completeness: f64, filter_match: f64, reliability: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([
        (FACTOR_COMPLETENESS.to_string(), completeness),
        (FACTOR_FILTER_MATCH.to_string(), filter_match),
        (FACTOR_SOURCE_RELIABILITY.to_string(), reliability),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{SourceIdentity, SourceWeights};
    use serde_json::json;

    fn filters(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_complete_supabase_record_without_filters() {
        let calc = ConfidenceCalculator::new();
        let record = EvidenceRecord::found(SourceIdentity::Supabase, "1", json!({"a": 1, "b": "x"}));
        let score = calc.score(&record, &Map::new());

        // 1.0*0.3 + 1.0*0.4 + 0.95*0.3
        assert!((score.score - 0.985).abs() < 1e-9);
        assert_eq!(score.factor(FACTOR_COMPLETENESS), Some(1.0));
        assert_eq!(score.factor(FACTOR_FILTER_MATCH), Some(1.0));
        assert_eq!(score.factor(FACTOR_SOURCE_RELIABILITY), Some(0.95));
        assert!(score.reasoning.contains("verified supabase"));
    }

    #[test]
    fn test_score_matches_weighted_formula() {
        let calc = ConfidenceCalculator::new();
        let record = EvidenceRecord::found(
            SourceIdentity::Notion,
            "p",
            json!({"sku": "A", "price": null, "name": "w", "stock": ""}),
        );
        let f = filters(&[("sku", json!("A")), ("color", json!("red"))]);
        let score = calc.score(&record, &f);

        let expected = 0.5 * 0.3 + 0.5 * 0.4 + 0.90 * 0.3;
        assert!((score.score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_missing_information_forces_zero() {
        let calc = ConfidenceCalculator::new();
        let record = EvidenceRecord::missing(SourceIdentity::Supabase);
        let score = calc.score(&record, &Map::new());
        assert_eq!(score.score, 0.0);
        assert!(score.reasoning.starts_with("No data found"));
    }

    #[test]
    fn test_query_error_reasoning_mentions_error() {
        let calc = ConfidenceCalculator::new();
        let record = EvidenceRecord::query_error(SourceIdentity::Notion, "HTTP 502");
        let score = calc.score(&record, &Map::new());
        assert_eq!(score.score, 0.0);
        assert!(score.reasoning.contains("HTTP 502"));
    }

    #[test]
    fn test_unknown_source_uses_conservative_reliability() {
        let calc = ConfidenceCalculator::new();
        let record = EvidenceRecord::found(SourceIdentity::from("sheets"), "r1", json!({"a": 1}));
        let score = calc.score(&record, &Map::new());
        assert_eq!(score.factor(FACTOR_SOURCE_RELIABILITY), Some(0.5));
    }

    #[test]
    fn test_custom_weights_and_policy() {
        let weights = ScoringWeights::new(0.0, 0.0, 1.0).unwrap();
        let policy = SourcePolicy::new().with_override(
            SourceIdentity::Supabase,
            SourceWeights {
                reliability: 0.7,
                aggregation_weight: 0.5,
            },
        );
        let calc = ConfidenceCalculator::with_policy(weights, policy);
        let record = EvidenceRecord::found(SourceIdentity::Supabase, "1", json!({}));
        assert!((calc.score(&record, &Map::new()).score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(ScoringWeights::new(0.5, 0.5, 0.5).is_err());
        assert!(ScoringWeights::new(-0.1, 0.6, 0.5).is_err());
        assert!(ScoringWeights::new(0.2, 0.5, 0.3).is_ok());
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let calc = ConfidenceCalculator::new();
        let record = EvidenceRecord::found(SourceIdentity::Notion, "p", json!({"a": 1, "b": null}));
        let f = filters(&[("a", json!(1))]);
        assert_eq!(calc.score(&record, &f), calc.score(&record, &f));
    }
}
