//! Evidence bundle
//!
//! Everything a language model may be told about a query, in the order the
//! sources were consulted. The rendered context tags every source with a
//! citation handle `[Source: <origin>-<id>]` that answers are expected to use.

use crate::gate::Evaluation;
use hms_common::confidence::{FieldConflict, GateVerdict, ScoredEvidence, UnknownReason};
use hms_common::payload::canonical_json;
use hms_common::SourceIdentity;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleEntry {
    pub origin: SourceIdentity,
    pub origin_record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub score: f64,
    pub reasoning: String,
    pub found: bool,
    pub verified: bool,
    pub payload: Option<Value>,
}

impl BundleEntry {
    fn from_scored(scored: &ScoredEvidence) -> Self {
        let record = &scored.record;
        Self {
            origin: record.origin().clone(),
            origin_record_id: record.origin_record_id().to_string(),
            collection: record.collection().map(str::to_string),
            score: scored.confidence.score,
            reasoning: scored.confidence.reasoning.clone(),
            found: !record.information_missing(),
            verified: record.verified(),
            payload: record.payload().cloned(),
        }
    }

    /// Handle answers cite this entry by
    pub fn citation(&self) -> String {
        format!("[Source: {}-{}]", self.origin, self.origin_record_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceBundle {
    pub query: String,
    pub threshold: f64,
    pub aggregated_confidence: f64,
    pub answerable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_reason: Option<UnknownReason>,
    pub entries: Vec<BundleEntry>,
    pub conflicts: Vec<FieldConflict>,
}

impl EvidenceBundle {
    pub fn from_evaluation(query: impl Into<String>, evaluation: &Evaluation) -> Self {
        Self {
            query: query.into(),
            threshold: evaluation.threshold,
            aggregated_confidence: evaluation.decision.aggregated_confidence,
            answerable: evaluation.verdict.is_answerable(),
            unknown_reason: match &evaluation.verdict {
                GateVerdict::Unknown { reason } => Some(reason.clone()),
                GateVerdict::Answerable { .. } => None,
            },
            entries: evaluation.decision.evidence.iter().map(BundleEntry::from_scored).collect(),
            conflicts: evaluation.decision.conflicts.clone(),
        }
    }

    pub fn found_entries(&self) -> impl Iterator<Item = &BundleEntry> {
        self.entries.iter().filter(|e| e.found)
    }

    pub fn verified_count(&self) -> usize {
        self.entries.iter().filter(|e| e.verified).count()
    }

    /// Mean per-record score over all entries (0 when empty)
    pub fn mean_score(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.entries.iter().map(|e| e.score).sum::<f64>() / self.entries.len() as f64
        }
    }

    /// Numbered plain-text block describing every source
    pub fn render_context(&self) -> String {
        let mut out = String::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            let _ = writeln!(out, "--- Source {} {} ---", idx + 1, entry.citation());
            let _ = writeln!(out, "Origin: {}", entry.origin);
            if let Some(collection) = &entry.collection {
                let _ = writeln!(out, "Collection: {}", collection);
            }
            let _ = writeln!(out, "Confidence: {:.3} ({})", entry.score, entry.reasoning);
            let _ = writeln!(out, "Found: {}  Verified: {}", entry.found, entry.verified);
            match (&entry.payload, entry.found) {
                (Some(payload), true) => {
                    let _ = writeln!(out, "Data: {}", canonical_json(payload));
                }
                _ => {
                    let _ = writeln!(out, "Data: none (not found at source)");
                }
            }
            out.push('\n');
        }

        if !self.conflicts.is_empty() {
            out.push_str("--- Conflicts ---\n");
            for conflict in &self.conflicts {
                let _ = writeln!(
                    out,
                    "{}: {}-{} says {} / {}-{} says {}",
                    conflict.field,
                    conflict.left.origin,
                    conflict.left.origin_record_id,
                    conflict.left.value,
                    conflict.right.origin,
                    conflict.right.origin_record_id,
                    conflict.right.value
                );
            }
            out.push('\n');
        }
        out.push_str("--- End of sources ---\n");
        out
    }
}
