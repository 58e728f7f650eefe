//! Keyword/intent matching
//!
//! Scores a query against every specialized tool's keyword set. Single-word
//! keywords match whole tokens; multi-word keywords match as phrases inside
//! the normalized query. Each hit contributes the keyword's weight, so a
//! query that names a specific phrase ("ec2 instances") outscores one that
//! only shares a generic word ("list").

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::registry::ToolRegistry;

/// Lowercase, drop punctuation, collapse whitespace.
///
/// Hyphens, underscores and slashes separate words ("security-group" becomes
/// "security group"); other punctuation is removed ("don't" becomes "dont").
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                Some(c)
            } else if matches!(c, '-' | '_' | '/') {
                Some(' ')
            } else {
                None
            }
        })
        .collect::<String>()
        .to_lowercase();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace tokens of an already-normalized string
pub fn tokenize(normalized: &str) -> HashSet<&str> {
    normalized.split_whitespace().collect()
}

/// Strategy that decides how much a single keyword hit is worth
pub trait KeywordWeighting: Send + Sync {
    fn weight(&self, keyword: &str) -> f64;
}

/// Default weighting: longer and multi-word keywords count more, configured
/// generic words count less.
#[derive(Debug, Clone)]
pub struct SpecificityWeighting {
    generic: HashSet<String>,
    generic_factor: f64,
}

impl SpecificityWeighting {
    pub fn new<I, S>(generic_keywords: I, generic_factor: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            generic: generic_keywords
                .into_iter()
                .map(|k| normalize(k.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
            generic_factor: generic_factor.clamp(0.0, 1.0),
        }
    }
}

impl Default for SpecificityWeighting {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), 0.5)
    }
}

impl KeywordWeighting for SpecificityWeighting {
    fn weight(&self, keyword: &str) -> f64 {
        let words = keyword.split_whitespace().count().max(1) as f64;
        let letters = keyword.chars().filter(|c| !c.is_whitespace()).count();
        let length_bonus = letters.saturating_sub(3).min(7) as f64 * 0.1;
        let weight = words * (1.0 + length_bonus);
        if self.generic.contains(keyword) {
            weight * self.generic_factor
        } else {
            weight
        }
    }
}

/// A tool paired with its score for one routing decision
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub tool: String,
    /// Registration index, used as the final tie-break
    pub index: usize,
    pub raw_score: f64,
    /// Score if every keyword of the tool had matched
    pub max_score: f64,
    /// Normalized, bias-adjusted score in [0, 1]; filled in by the ranker
    pub confidence: f64,
    /// Learning bias applied by the ranker
    pub bias: f64,
    pub matched_keywords: Vec<String>,
    /// At or above the viability threshold; filled in by the ranker
    pub viable: bool,
}

/// Keyword matcher with a pluggable weighting strategy
#[derive(Clone)]
pub struct KeywordMatcher {
    weighting: Arc<dyn KeywordWeighting>,
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new(Arc::new(SpecificityWeighting::default()))
    }
}

impl KeywordMatcher {
    pub fn new(weighting: Arc<dyn KeywordWeighting>) -> Self {
        Self { weighting }
    }

    /// Score `query` against every specialized tool.
    ///
    /// Returns candidates in registration order; tools with no keyword hit
    /// are left out. An empty result means "go straight to fallback".
    pub fn match_query(&self, query: &str, registry: &ToolRegistry) -> Vec<Candidate> {
        let normalized = normalize(query);
        let tokens = tokenize(&normalized);
        let mut candidates = Vec::new();

        for (index, tool) in registry.specialized() {
            let mut raw_score = 0.0;
            let mut max_score = 0.0;
            let mut matched = Vec::new();

            for keyword in &tool.keywords {
                let weight = self.weighting.weight(keyword);
                max_score += weight;

                let hit = if keyword.contains(' ') {
                    normalized.contains(keyword.as_str())
                } else {
                    tokens.contains(keyword.as_str())
                };
                if hit {
                    raw_score += weight;
                    matched.push(keyword.clone());
                }
            }

            if matched.is_empty() {
                continue;
            }

            debug!(
                "Tool {} matched {:?} (raw {:.2} / max {:.2})",
                tool.name, matched, raw_score, max_score
            );
            candidates.push(Candidate {
                tool: tool.name.clone(),
                index,
                raw_score,
                max_score,
                confidence: 0.0,
                bias: 0.0,
                matched_keywords: matched,
                viable: false,
            });
        }

        candidates
    }
}
