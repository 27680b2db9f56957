//! Query gate
//!
//! Fans a query out to every registered source client concurrently, scores
//! each returned record, aggregates the scores and applies the gate.
//!
//! Source clients never fail: a client that returns nothing contributes a
//! synthesized "missing" record, and a client that exceeds the query timeout
//! contributes a query-error record (`verified=false`). The gate therefore sees
//! one uniform evidence list whatever went wrong upstream.

use futures::future::join_all;
use hms_common::confidence::{
    decide, validate_record, AggregateDecision, ConfidenceAggregator, ConfidenceCalculator, ConfidenceError,
    GateVerdict, RecordIssue, ScoringWeights,
};
use hms_common::sources::SourceClient;
use hms_common::{EvidenceRecord, SourceIdentity, SourcePolicy};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No source clients registered")]
    NoSources,

    #[error("Unknown source '{0}'")]
    UnknownSource(SourceIdentity),

    #[error(transparent)]
    Confidence(#[from] ConfidenceError),

    /// `require_verification` was set and the evidence did not pass
    #[error("Data validation failed ({} issues)", .issues.len())]
    VerificationFailed {
        issues: Vec<SourceIssues>,
        evaluation: Box<Evaluation>,
    },
}

/// Scored, aggregated and gated evidence for one query
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub threshold: f64,
    pub decision: AggregateDecision,
    pub verdict: GateVerdict,
}

/// Issues found for one record (or for the aggregate, with no record id)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceIssues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<SourceIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_record_id: Option<String>,
    pub issues: Vec<String>,
}

pub struct QueryGate {
    clients: Vec<Arc<dyn SourceClient>>,
    calculator: ConfidenceCalculator,
    aggregator: ConfidenceAggregator,
    threshold: f64,
    source_timeout: Duration,
}

impl QueryGate {
    /// # Errors
    /// `InvalidThreshold` when the default threshold is outside [0, 1].
    pub fn new(
        weights: ScoringWeights,
        sources: SourcePolicy,
        threshold: f64,
        source_timeout: Duration,
    ) -> Result<Self, ConfidenceError> {
        Ok(Self {
            clients: Vec::new(),
            calculator: ConfidenceCalculator::with_policy(weights, sources.clone()),
            aggregator: ConfidenceAggregator::new(sources),
            threshold: hms_common::confidence::check_threshold(threshold)?,
            source_timeout,
        })
    }

    pub fn with_client(mut self, client: Arc<dyn SourceClient>) -> Self {
        self.clients.push(client);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn registered_sources(&self) -> Vec<SourceIdentity> {
        self.clients.iter().map(|c| c.origin()).collect()
    }

    /// Query the selected sources (all registered ones when `sources` is
    /// `None`) concurrently
    ///
    /// # Errors
    /// `NoSources` when nothing is registered or selected; `UnknownSource`
    /// when a requested source has no client.
    pub async fn gather(
        &self,
        filters: &Map<String, Value>,
        sources: Option<&[SourceIdentity]>,
    ) -> Result<Vec<EvidenceRecord>, QueryError> {
        let selected = self.select(sources)?;

        let queries = selected.into_iter().map(|client| async move {
            let origin = client.origin();
            match tokio::time::timeout(self.source_timeout, client.query(filters)).await {
                Ok(records) if records.is_empty() => {
                    tracing::debug!(origin = %origin, "Source returned no records");
                    vec![EvidenceRecord::missing(origin)]
                }
                Ok(records) => {
                    tracing::debug!(origin = %origin, records = records.len(), "Source answered");
                    records
                }
                Err(_) => {
                    tracing::warn!(
                        origin = %origin,
                        timeout_ms = self.source_timeout.as_millis() as u64,
                        "Source query timed out"
                    );
                    vec![EvidenceRecord::query_error(
                        origin,
                        format!("query timed out after {} ms", self.source_timeout.as_millis()),
                    )]
                }
            }
        });

        Ok(join_all(queries).await.into_iter().flatten().collect())
    }

    /// Score, aggregate and gate a set of records
    ///
    /// # Errors
    /// Contract violations: empty input, threshold outside [0, 1].
    pub fn evaluate(
        &self,
        records: &[EvidenceRecord],
        filters: &Map<String, Value>,
        threshold: Option<f64>,
    ) -> Result<Evaluation, ConfidenceError> {
        let threshold = threshold.unwrap_or(self.threshold);
        let scores: Vec<_> = records.iter().map(|r| self.calculator.score(r, filters)).collect();
        let decision = self.aggregator.aggregate(records, &scores, threshold)?;
        let verdict = decide(&decision, threshold)?;

        tracing::info!(
            records = records.len(),
            found = decision.found_count(),
            aggregated_confidence = decision.aggregated_confidence,
            threshold,
            answerable = verdict.is_answerable(),
            conflicts = decision.conflicts.len(),
            "Evidence evaluated"
        );

        Ok(Evaluation {
            threshold,
            decision,
            verdict,
        })
    }

    /// Gather then evaluate; with `require_verification`, any record issue or
    /// an aggregate below threshold is an error carrying the evaluation
    pub async fn query(
        &self,
        filters: &Map<String, Value>,
        sources: Option<&[SourceIdentity]>,
        threshold: Option<f64>,
        require_verification: bool,
    ) -> Result<Evaluation, QueryError> {
        if let Some(threshold) = threshold {
            hms_common::confidence::check_threshold(threshold)?;
        }
        let records = self.gather(filters, sources).await?;
        let evaluation = self.evaluate(&records, filters, threshold)?;

        if require_verification {
            let issues = verification_issues(&evaluation);
            if !issues.is_empty() {
                tracing::warn!(issues = issues.len(), "Query evidence failed verification");
                return Err(QueryError::VerificationFailed {
                    issues,
                    evaluation: Box::new(evaluation),
                });
            }
        }
        Ok(evaluation)
    }

    fn select(&self, sources: Option<&[SourceIdentity]>) -> Result<Vec<&Arc<dyn SourceClient>>, QueryError> {
        let selected: Vec<_> = match sources {
            None => self.clients.iter().collect(),
            Some(wanted) => {
                if let Some(missing) = wanted
                    .iter()
                    .find(|w| !self.clients.iter().any(|c| &c.origin() == *w))
                {
                    return Err(QueryError::UnknownSource(missing.clone()));
                }
                self.clients
                    .iter()
                    .filter(|c| wanted.contains(&c.origin()))
                    .collect()
            }
        };
        if selected.is_empty() {
            return Err(QueryError::NoSources);
        }
        Ok(selected)
    }
}

/// Per-record issues plus an aggregate-level check
pub fn verification_issues(evaluation: &Evaluation) -> Vec<SourceIssues> {
    let mut all: Vec<SourceIssues> = evaluation
        .decision
        .evidence
        .iter()
        .filter_map(|scored| {
            let issues = validate_record(&scored.record, &scored.confidence, evaluation.threshold);
            (!issues.is_empty()).then(|| SourceIssues {
                origin: Some(scored.record.origin().clone()),
                origin_record_id: Some(scored.record.origin_record_id().to_string()),
                issues: issues.iter().map(RecordIssue::to_string).collect(),
            })
        })
        .collect();

    if evaluation.decision.aggregated_confidence < evaluation.threshold {
        all.push(SourceIssues {
            origin: None,
            origin_record_id: None,
            issues: vec![format!(
                "aggregated confidence {:.3} below threshold {:.3}",
                evaluation.decision.aggregated_confidence, evaluation.threshold
            )],
        });
    }
    all
}
