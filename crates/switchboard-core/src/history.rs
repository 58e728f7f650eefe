//! Routing history, analysis and recommendations
//!
//! Every routing attempt and every piece of user feedback is kept in a
//! bounded in-memory log. The log drives routing reports and "what worked
//! for similar requests" hints, and can be saved to / loaded from a JSON
//! file between runs.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::matcher::normalize;
use crate::types::{FallbackReason, ValidationVerdict};

/// Records examined when looking for similar requests
const RECOMMENDATION_WINDOW: usize = 100;
/// Minimum word-set overlap for a past request to count as similar
const SIMILARITY_THRESHOLD: f64 = 0.3;
const TOP_SIMILAR: usize = 5;
/// Fallback rate above which the report suggests broadening keywords
const HIGH_FALLBACK_RATE: f64 = 0.3;

/// One attempt to answer a request with one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRecord {
    pub id: String,
    /// Shared by every attempt made for the same request
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub selected_tool: String,
    pub confidence: f64,
    pub fallback_used: bool,
    /// The attempt's answer was accepted
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ValidationVerdict>,
    /// Why the attempt failed, or why the fallback had to answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FallbackReason>,
}

/// A user's judgement of a routed answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub tool: String,
    pub helpful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub count: usize,
    pub success_count: usize,
}

/// Aggregate view over the routing history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingAnalysis {
    pub total_requests: usize,
    pub total_attempts: usize,
    /// Accepted attempts / all attempts
    pub success_rate: f64,
    /// Requests answered by the fallback / all requests
    pub fallback_rate: f64,
    pub tool_usage: BTreeMap<String, ToolUsage>,
    pub common_failures: BTreeMap<String, usize>,
    pub helpful_feedback: usize,
    pub unhelpful_feedback: usize,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarRequest {
    pub query: String,
    pub similarity: f64,
    pub selected_tool: String,
    pub success: bool,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub similar_requests_found: usize,
    pub top_similar: Vec<SimilarRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_tool: Option<String>,
    pub recommendations: Vec<String>,
}

/// On-disk layout of the history file
#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    routing_history: Vec<RoutingRecord>,
    #[serde(default)]
    feedback: Vec<FeedbackRecord>,
    last_updated: DateTime<Utc>,
}

/// Bounded log of routing attempts and feedback
#[derive(Debug, Clone)]
pub struct RoutingHistory {
    capacity: usize,
    records: VecDeque<RoutingRecord>,
    feedback: VecDeque<FeedbackRecord>,
}

impl RoutingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
            feedback: VecDeque::new(),
        }
    }

    pub fn push(&mut self, record: RoutingRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn push_feedback(&mut self, record: FeedbackRecord) {
        if self.feedback.len() == self.capacity {
            self.feedback.pop_front();
        }
        self.feedback.push_back(record);
    }

    /// Oldest first
    pub fn records(&self) -> impl Iterator<Item = &RoutingRecord> {
        self.records.iter()
    }

    pub fn feedback(&self) -> impl Iterator<Item = &FeedbackRecord> {
        self.feedback.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Summarize success/fallback rates, per-tool usage and failure causes.
    pub fn analyze(&self) -> RoutingAnalysis {
        let total_attempts = self.records.len();
        let mut tool_usage: BTreeMap<String, ToolUsage> = BTreeMap::new();
        let mut common_failures: BTreeMap<String, usize> = BTreeMap::new();
        let mut requests: HashSet<&str> = HashSet::new();
        let mut fallback_requests: HashSet<&str> = HashSet::new();
        let mut successes = 0usize;

        for r in &self.records {
            requests.insert(r.request_id.as_str());
            if r.fallback_used {
                fallback_requests.insert(r.request_id.as_str());
            }

            let usage = tool_usage.entry(r.selected_tool.clone()).or_default();
            usage.count += 1;
            if r.success {
                usage.success_count += 1;
                successes += 1;
            } else {
                let cause = match r.reason {
                    Some(reason) if !r.fallback_used => reason.to_string(),
                    _ if r.fallback_used => "fallback_failure".to_string(),
                    _ => "unknown".to_string(),
                };
                *common_failures.entry(cause).or_default() += 1;
            }
        }

        let ratio = |n: usize, d: usize| if d == 0 { 0.0 } else { n as f64 / d as f64 };
        let fallback_rate = ratio(fallback_requests.len(), requests.len());

        let mut suggestions = Vec::new();
        if total_attempts == 0 {
            suggestions.push("No routing history available yet.".to_string());
        }
        if fallback_rate > HIGH_FALLBACK_RATE {
            suggestions.push(
                "High fallback rate detected. Consider expanding specialized tool keywords \
                 or lowering the viability threshold."
                    .to_string(),
            );
        }
        if common_failures.contains_key(&FallbackReason::IrrelevantResponse.to_string()) {
            suggestions.push(
                "Frequent irrelevant responses detected. Consider tightening keywords or \
                 improving the specialized tools' answers."
                    .to_string(),
            );
        }

        RoutingAnalysis {
            total_requests: requests.len(),
            total_attempts,
            success_rate: ratio(successes, total_attempts),
            fallback_rate,
            tool_usage,
            common_failures,
            helpful_feedback: self.feedback.iter().filter(|f| f.helpful).count(),
            unhelpful_feedback: self.feedback.iter().filter(|f| !f.helpful).count(),
            suggestions,
        }
    }

    /// Find recent requests worded like `query` and report which tool
    /// answered them successfully most often.
    pub fn recommendations(&self, query: &str) -> Recommendations {
        let words = word_set(query);
        let skip = self.records.len().saturating_sub(RECOMMENDATION_WINDOW);

        let mut similar: Vec<SimilarRequest> = self
            .records
            .iter()
            .skip(skip)
            .filter_map(|r| {
                let similarity = jaccard(&words, &word_set(&r.query));
                (similarity > SIMILARITY_THRESHOLD).then(|| SimilarRequest {
                    query: r.query.clone(),
                    similarity,
                    selected_tool: r.selected_tool.clone(),
                    success: r.success,
                    fallback_used: r.fallback_used,
                })
            })
            .collect();
        // Stable sort keeps older records first among equals.
        similar.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for s in similar.iter().filter(|s| s.success) {
            let count = counts.entry(s.selected_tool.as_str()).or_default();
            if *count == 0 {
                order.push(s.selected_tool.as_str());
            }
            *count += 1;
        }
        let mut recommended_tool: Option<String> = None;
        let mut best = 0;
        for tool in order {
            if counts[tool] > best {
                best = counts[tool];
                recommended_tool = Some(tool.to_string());
            }
        }

        let recommendations = recommended_tool
            .iter()
            .map(|t| format!("Similar requests were most successful with: {}", t))
            .collect();

        debug!(
            "{} similar requests found for recommendation",
            similar.len()
        );
        Recommendations {
            similar_requests_found: similar.len(),
            top_similar: similar.into_iter().take(TOP_SIMILAR).collect(),
            recommended_tool,
            recommendations,
        }
    }

    /// Load a saved history. A missing file yields an empty history; an
    /// unreadable one is logged and ignored.
    pub fn load(path: &Path, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return history,
            Err(e) => {
                warn!("Could not read routing history {}: {}", path.display(), e);
                return history;
            }
        };
        match serde_json::from_str::<HistoryFile>(&content) {
            Ok(file) => {
                for r in file.routing_history {
                    history.push(r);
                }
                for f in file.feedback {
                    history.push_feedback(f);
                }
                info!(
                    "Loaded {} routing history entries from {}",
                    history.len(),
                    path.display()
                );
            }
            Err(e) => warn!("Could not parse routing history {}: {}", path.display(), e),
        }
        history
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = HistoryFile {
            routing_history: self.records.iter().cloned().collect(),
            feedback: self.feedback.iter().cloned().collect(),
            last_updated: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize history")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write routing history to {}", path.display()))?;
        debug!("Saved {} history entries to {}", self.len(), path.display());
        Ok(())
    }
}

fn word_set(text: &str) -> HashSet<String> {
    normalize(text)
        .split_whitespace()
        .map(|w| w.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
