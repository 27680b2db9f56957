//! "I don't know" responses

use super::bundle::EvidenceBundle;
use hms_common::confidence::UnknownReason;
use std::fmt::Write;

/// Fixed opening every refusal starts with; answer checks look for it
pub const DONT_KNOW: &str = "I don't know";

/// One sentence explaining why the gate refused
pub fn reason_sentence(reason: &UnknownReason) -> String {
    match reason {
        UnknownReason::NoData => "No information was found in any data source.".to_string(),
        UnknownReason::BelowThreshold {
            confidence,
            threshold,
        } => format!(
            "Data confidence ({:.3}) is below the required threshold ({:.3}).",
            confidence, threshold
        ),
        UnknownReason::NoVerifiedSource => "None of the data sources could be verified.".to_string(),
    }
}

/// Refusal with a per-source data quality summary
pub fn dont_know_response(reason: &UnknownReason, bundle: &EvidenceBundle) -> String {
    let mut out = format!("{}. {}\n\nData quality summary:\n", DONT_KNOW, reason_sentence(reason));
    for (idx, entry) in bundle.entries.iter().enumerate() {
        let _ = write!(out, "- Source {} ({}): ", idx + 1, entry.origin);
        if entry.found {
            let _ = writeln!(out, "confidence {:.3}, {}", entry.score, entry.reasoning);
        } else {
            let _ = writeln!(out, "no information found");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::bundle::BundleEntry;
    use hms_common::SourceIdentity;

    #[test]
    fn test_summary_lists_every_source() {
        let bundle = EvidenceBundle {
            query: "q".to_string(),
            threshold: 0.85,
            aggregated_confidence: 0.6,
            answerable: false,
            unknown_reason: None,
            entries: vec![
                BundleEntry {
                    origin: SourceIdentity::Supabase,
                    origin_record_id: "1".to_string(),
                    collection: None,
                    score: 0.6,
                    reasoning: "partial record".to_string(),
                    found: true,
                    verified: true,
                    payload: None,
                },
                BundleEntry {
                    origin: SourceIdentity::Notion,
                    origin_record_id: "none".to_string(),
                    collection: None,
                    score: 0.0,
                    reasoning: String::new(),
                    found: false,
                    verified: true,
                    payload: None,
                },
            ],
            conflicts: Vec::new(),
        };
        let reason = UnknownReason::BelowThreshold {
            confidence: 0.6,
            threshold: 0.85,
        };

        let text = dont_know_response(&reason, &bundle);
        assert!(text.starts_with("I don't know. Data confidence (0.600) is below the required threshold (0.850)."));
        assert!(text.contains("- Source 1 (supabase): confidence 0.600, partial record"));
        assert!(text.contains("- Source 2 (notion): no information found"));
    }

    #[test]
    fn test_no_data_sentence() {
        assert_eq!(
            reason_sentence(&UnknownReason::NoData),
            "No information was found in any data source."
        );
    }
}
