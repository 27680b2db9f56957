//! Prompt strictness
//!
//! How much latitude the model gets, picked from the quality of the evidence:
//! - `Strict`: no verified source, or mean score more than 0.10 below threshold
//! - `Lenient`: mean score at least 0.05 above threshold with two or more
//!   sources that found data
//! - `Moderate`: mean score at or above threshold
//! - otherwise `Strict`

use super::bundle::EvidenceBundle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Below `threshold - STRICT_MARGIN` the prompt is always strict
pub const STRICT_MARGIN: f64 = 0.10;
/// Mean score must clear `threshold + LENIENT_MARGIN` for a lenient prompt
pub const LENIENT_MARGIN: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Strict,
    Moderate,
    Lenient,
}

impl Strictness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strictness::Strict => "strict",
            Strictness::Moderate => "moderate",
            Strictness::Lenient => "lenient",
        }
    }

    pub fn detect(bundle: &EvidenceBundle) -> Self {
        if bundle.entries.is_empty() || bundle.verified_count() == 0 {
            return Strictness::Strict;
        }

        let mean = bundle.mean_score();
        let threshold = bundle.threshold;
        if mean < threshold - STRICT_MARGIN {
            Strictness::Strict
        } else if mean >= threshold + LENIENT_MARGIN && bundle.found_entries().count() >= 2 {
            Strictness::Lenient
        } else if mean >= threshold {
            Strictness::Moderate
        } else {
            Strictness::Strict
        }
    }

    /// Rules appended to the system prompt for this level
    pub fn rules(&self) -> &'static [&'static str] {
        match self {
            Strictness::Strict => &[
                "Use only facts stated in the sources below; do not infer or extrapolate.",
                "Cite every fact with its [Source: ...] tag.",
                "If any needed fact is missing, unverified or low confidence, answer \"I don't know\" and give the reason.",
                "If sources disagree, report the disagreement with both citations instead of choosing.",
            ],
            Strictness::Moderate => &[
                "Use only facts stated in the sources below.",
                "Cite every fact with its [Source: ...] tag.",
                "You may combine facts from several sources, but say so when you do.",
                "If sources disagree, report the disagreement with both citations.",
            ],
            Strictness::Lenient => &[
                "Base the answer on the sources below and cite them with their [Source: ...] tags.",
                "You may summarize and combine facts across sources.",
                "Mention any disagreement between sources.",
            ],
        }
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::bundle::BundleEntry;
    use hms_common::SourceIdentity;
    use serde_json::json;

    fn entry(origin: SourceIdentity, score: f64, found: bool, verified: bool) -> BundleEntry {
        BundleEntry {
            origin,
            origin_record_id: "1".to_string(),
            collection: None,
            score,
            reasoning: String::new(),
            found,
            verified,
            payload: found.then(|| json!({"a": 1})),
        }
    }

    fn bundle(entries: Vec<BundleEntry>) -> EvidenceBundle {
        EvidenceBundle {
            query: "q".to_string(),
            threshold: 0.85,
            aggregated_confidence: 0.0,
            answerable: false,
            unknown_reason: None,
            entries,
            conflicts: Vec::new(),
        }
    }

    #[test]
    fn test_no_verified_source_is_strict() {
        let b = bundle(vec![entry(SourceIdentity::Supabase, 0.99, true, false)]);
        assert_eq!(Strictness::detect(&b), Strictness::Strict);
    }

    #[test]
    fn test_two_strong_sources_are_lenient() {
        let b = bundle(vec![
            entry(SourceIdentity::Supabase, 0.95, true, true),
            entry(SourceIdentity::Notion, 0.92, true, true),
        ]);
        assert_eq!(Strictness::detect(&b), Strictness::Lenient);
    }

    #[test]
    fn test_single_strong_source_is_moderate() {
        let b = bundle(vec![entry(SourceIdentity::Supabase, 0.95, true, true)]);
        assert_eq!(Strictness::detect(&b), Strictness::Moderate);
    }

    #[test]
    fn test_just_below_threshold_is_strict() {
        let b = bundle(vec![entry(SourceIdentity::Supabase, 0.80, true, true)]);
        assert_eq!(Strictness::detect(&b), Strictness::Strict);
        let far = bundle(vec![entry(SourceIdentity::Supabase, 0.50, true, true)]);
        assert_eq!(Strictness::detect(&far), Strictness::Strict);
    }

    #[test]
    fn test_empty_bundle_is_strict() {
        assert_eq!(Strictness::detect(&bundle(Vec::new())), Strictness::Strict);
    }
}
