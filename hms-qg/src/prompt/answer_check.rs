//! Model answer checks
//!
//! Cheap structural checks on an answer produced from a bundle: citations must
//! be present when there was evidence, and a refusal is required when the gate
//! decided the query is unanswerable.

use super::bundle::EvidenceBundle;
use super::dont_know::DONT_KNOW;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum AnswerIssue {
    MissingCitations,
    /// Cites a source that is not in the bundle
    UnknownCitation { citation: String },
    MissingDontKnow,
}

impl fmt::Display for AnswerIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerIssue::MissingCitations => write!(f, "answer has no [Source: ...] citations"),
            AnswerIssue::UnknownCitation { citation } => write!(f, "answer cites unknown source {}", citation),
            AnswerIssue::MissingDontKnow => write!(f, "evidence was insufficient but the answer does not say \"I don't know\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerCheck {
    pub is_valid: bool,
    pub has_citations: bool,
    pub says_dont_know: bool,
    pub issues: Vec<AnswerIssue>,
}

pub fn check_answer(answer: &str, bundle: &EvidenceBundle) -> AnswerCheck {
    let citations = citations(answer);
    let has_citations = !citations.is_empty();
    let says_dont_know = answer.to_lowercase().contains(&DONT_KNOW.to_lowercase());

    let mut issues = Vec::new();
    if bundle.answerable {
        if !has_citations && bundle.found_entries().next().is_some() {
            issues.push(AnswerIssue::MissingCitations);
        }
        let known: Vec<String> = bundle.entries.iter().map(|e| e.citation()).collect();
        issues.extend(
            citations
                .into_iter()
                .filter(|c| !known.contains(c))
                .map(|citation| AnswerIssue::UnknownCitation { citation }),
        );
    } else if !says_dont_know {
        issues.push(AnswerIssue::MissingDontKnow);
    }

    AnswerCheck {
        is_valid: issues.is_empty(),
        has_citations,
        says_dont_know,
        issues,
    }
}

/// Every `[Source: ...]` tag in the text
fn citations(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("[Source:") {
        let tail = &rest[start..];
        match tail.find(']') {
            Some(end) => {
                found.push(tail[..=end].to_string());
                rest = &tail[end + 1..];
            }
            None => break,
        }
    }
    found
}
