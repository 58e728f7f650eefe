//! Router tuning knobs
//!
//! Every threshold the router uses lives here so it can be supplied from a
//! config file and tuned without touching the routing state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum confidence for a candidate to be tried
    #[serde(default = "default_viability_threshold")]
    pub viability_threshold: f64,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Run the relevance check on specialized answers
    #[serde(default = "default_true")]
    pub validate_responses: bool,
    /// Answers shorter than this (trimmed, in chars) fail validation
    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,
    /// Phrases that mark an answer as "could not help"
    #[serde(default = "default_inability_phrases")]
    pub inability_phrases: Vec<String>,
    /// Keywords that are too common to be strong evidence on their own
    #[serde(default = "default_generic_keywords")]
    pub generic_keywords: Vec<String>,
    /// Weight multiplier applied to generic keywords
    #[serde(default = "default_generic_factor")]
    pub generic_factor: f64,
    /// Record outcomes and let tallies bias ranking
    #[serde(default = "default_true")]
    pub enable_learning: bool,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_max_bias")]
    pub max_bias: f64,
    /// Routing records kept in memory (oldest dropped first)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_viability_threshold() -> f64 {
    0.3
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_min_answer_chars() -> usize {
    10
}

fn default_inability_phrases() -> Vec<String> {
    [
        "i don't know",
        "i do not know",
        "cannot find",
        "can't find",
        "could not find",
        "couldn't find",
        "unable to",
        "no information",
        "not able to",
        "i'm not sure",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_generic_keywords() -> Vec<String> {
    [
        "list", "show", "get", "describe", "info", "count", "each", "type", "state", "summary",
        "total", "issue", "problem", "error", "access", "resource",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_generic_factor() -> f64 {
    0.5
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_max_bias() -> f64 {
    0.1
}

fn default_history_capacity() -> usize {
    1000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            viability_threshold: default_viability_threshold(),
            tool_timeout_secs: default_tool_timeout_secs(),
            validate_responses: true,
            min_answer_chars: default_min_answer_chars(),
            inability_phrases: default_inability_phrases(),
            generic_keywords: default_generic_keywords(),
            generic_factor: default_generic_factor(),
            enable_learning: true,
            learning_rate: default_learning_rate(),
            max_bias: default_max_bias(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl RouterConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}
