//! Response validation
//!
//! Cheap relevance check on a specialized tool's answer before it is
//! accepted: the answer has to say something, must not be a polite refusal,
//! and has to mention at least one content word of the question.

use std::collections::HashSet;

use crate::config::RouterConfig;
use crate::matcher::{normalize, tokenize};
use crate::types::ValidationVerdict;

/// Words that carry no topic of their own
const STOPWORDS: &[&str] = &[
    "a", "about", "all", "am", "an", "and", "any", "are", "as", "at", "be", "by", "can", "could",
    "describe", "display", "do", "does", "for", "from", "get", "give", "have", "how", "i", "in",
    "is", "it", "list", "many", "me", "much", "my", "of", "on", "or", "our", "please", "show",
    "tell", "that", "the", "there", "this", "to", "we", "what", "when", "where", "which", "who",
    "why", "with", "you", "your",
];

/// Verdict plus the reasons behind a `Fail`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub verdict: ValidationVerdict,
    pub reasons: Vec<String>,
}

impl Validation {
    fn with(verdict: ValidationVerdict) -> Self {
        Self {
            verdict,
            reasons: Vec::new(),
        }
    }
}

/// Judge whether `answer` plausibly answers `query`.
pub fn validate(
    query: &str,
    answer: &str,
    is_fallback: bool,
    config: &RouterConfig,
) -> ValidationVerdict {
    assess(query, answer, is_fallback, config).verdict
}

/// Same as [`validate`], keeping the failure reasons for logging.
pub fn assess(query: &str, answer: &str, is_fallback: bool, config: &RouterConfig) -> Validation {
    if is_fallback {
        return Validation::with(ValidationVerdict::NotApplicable);
    }
    if !config.validate_responses {
        return Validation::with(ValidationVerdict::Pass);
    }

    let mut reasons = Vec::new();
    let trimmed = answer.trim();

    if trimmed.is_empty() {
        reasons.push("answer is empty".to_string());
    } else if trimmed.chars().count() < config.min_answer_chars {
        reasons.push(format!(
            "answer shorter than {} characters",
            config.min_answer_chars
        ));
    }

    let answer_norm = normalize(trimmed);
    let padded = format!(" {} ", answer_norm);
    if let Some(phrase) = config
        .inability_phrases
        .iter()
        .map(|p| normalize(p))
        .filter(|p| !p.is_empty())
        .find(|p| padded.contains(&format!(" {} ", p)))
    {
        reasons.push(format!("answer signals inability ('{}')", phrase));
    }

    let terms = content_terms(&normalize(query));
    if !terms.is_empty() {
        let answer_terms: HashSet<String> =
            tokenize(&answer_norm).into_iter().map(fold).collect();
        if !terms.iter().any(|t| answer_terms.contains(t)) {
            reasons.push("answer shares no terms with the question".to_string());
        }
    }

    if reasons.is_empty() {
        Validation::with(ValidationVerdict::Pass)
    } else {
        Validation {
            verdict: ValidationVerdict::Fail,
            reasons,
        }
    }
}

/// Topic-bearing words of a normalized query, plural-folded
fn content_terms(normalized: &str) -> HashSet<String> {
    tokenize(normalized)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(t))
        .map(fold)
        .collect()
}

/// Crude plural folding so "instances" and "instance" compare equal
fn fold(token: &str) -> String {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}
