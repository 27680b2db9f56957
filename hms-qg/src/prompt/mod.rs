//! Prompt preparation
//!
//! Turns a gated [`Evaluation`] into the material handed to a language model:
//! the evidence bundle, a system/user prompt pair at the detected strictness,
//! and (when the gate refused) the "I don't know" response to return instead.
//! The model call itself happens elsewhere.

pub mod answer_check;
pub mod bundle;
pub mod dont_know;
pub mod strictness;

pub use answer_check::{check_answer, AnswerCheck, AnswerIssue};
pub use bundle::{BundleEntry, EvidenceBundle};
pub use dont_know::{dont_know_response, DONT_KNOW};
pub use strictness::Strictness;

use crate::gate::Evaluation;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptTemplate {
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedPrompt {
    pub prompt: PromptTemplate,
    pub strictness: Strictness,
    pub should_use_dont_know: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dont_know_response: Option<String>,
    pub bundle: EvidenceBundle,
}

/// Build the prompt for `query`; `strictness` overrides detection
pub fn prepare(query: &str, evaluation: &Evaluation, strictness: Option<Strictness>) -> PreparedPrompt {
    let bundle = EvidenceBundle::from_evaluation(query, evaluation);
    let strictness = strictness.unwrap_or_else(|| Strictness::detect(&bundle));

    let dont_know_response = bundle
        .unknown_reason
        .as_ref()
        .map(|reason| dont_know_response(reason, &bundle));

    tracing::info!(
        strictness = %strictness,
        aggregated_confidence = bundle.aggregated_confidence,
        sources = bundle.entries.len(),
        dont_know = dont_know_response.is_some(),
        "Prompt prepared"
    );

    PreparedPrompt {
        prompt: PromptTemplate {
            system_prompt: system_prompt(strictness),
            user_prompt: user_prompt(&bundle),
        },
        strictness,
        should_use_dont_know: dont_know_response.is_some(),
        dont_know_response,
        bundle,
    }
}

fn system_prompt(strictness: Strictness) -> String {
    let mut prompt = String::from(
        "You answer questions from retrieved records only. Each record below carries a \
         confidence score, a found flag and a verified flag.\n\nRules:\n",
    );
    for (idx, rule) in strictness.rules().iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", idx + 1, rule));
    }
    prompt.push_str(&format!(
        "\nWhen the evidence is insufficient, reply exactly: \"{}. [Reason: ...]\"",
        DONT_KNOW
    ));
    prompt
}

fn user_prompt(bundle: &EvidenceBundle) -> String {
    format!(
        "Query: {}\nConfidence threshold: {:.2}\nAggregated confidence: {:.3}\n\n{}\nAnswer the query using the sources above.",
        bundle.query,
        bundle.threshold,
        bundle.aggregated_confidence,
        bundle.render_context()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::QueryGate;
    use hms_common::confidence::ScoringWeights;
    use hms_common::{EvidenceRecord, SourceIdentity, SourcePolicy};
    use serde_json::{json, Map};
    use std::time::Duration;

    fn evaluate(records: &[EvidenceRecord]) -> Evaluation {
        QueryGate::new(
            ScoringWeights::default(),
            SourcePolicy::default(),
            0.85,
            Duration::from_secs(1),
        )
        .unwrap()
        .evaluate(records, &Map::new(), None)
        .unwrap()
    }

    #[test]
    fn test_answerable_prompt_has_no_refusal() {
        let records = [
            EvidenceRecord::found(SourceIdentity::Supabase, "42", json!({"price": 10})),
            EvidenceRecord::found(SourceIdentity::Notion, "p42", json!({"price": 10})),
        ];
        let prepared = prepare("price of 42", &evaluate(&records), None);

        assert!(!prepared.should_use_dont_know);
        assert!(prepared.dont_know_response.is_none());
        assert_eq!(prepared.strictness, Strictness::Lenient);
        assert!(prepared.prompt.user_prompt.starts_with("Query: price of 42\n"));
        assert!(prepared.prompt.user_prompt.contains("[Source: notion-p42]"));
    }

    #[test]
    fn test_unknown_prompt_carries_refusal() {
        let records = [
            EvidenceRecord::missing(SourceIdentity::Supabase),
            EvidenceRecord::missing(SourceIdentity::Notion),
        ];
        let prepared = prepare("price of 42", &evaluate(&records), None);

        assert!(prepared.should_use_dont_know);
        assert_eq!(prepared.strictness, Strictness::Strict);
        let refusal = prepared.dont_know_response.unwrap();
        assert!(refusal.starts_with("I don't know. No information was found in any data source."));
    }

    #[test]
    fn test_strictness_override() {
        let records = [EvidenceRecord::found(SourceIdentity::Supabase, "42", json!({"price": 10}))];
        let prepared = prepare("q", &evaluate(&records), Some(Strictness::Strict));
        assert_eq!(prepared.strictness, Strictness::Strict);
        assert!(prepared.prompt.system_prompt.contains("do not infer"));
    }
}
