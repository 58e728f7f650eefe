//! Fallback & learning controller
//!
//! Drives one request through match → rank → execute → validate, walking
//! down the viable candidates until one answer is accepted and handing off
//! to the general fallback tool when none is. Outcomes are fed back into the
//! per-tool tallies that bias future ranking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RouterConfig;
use crate::error::{ExecutionError, RouteError};
use crate::executor::{execute, execute_fallback};
use crate::history::{
    FeedbackRecord, Recommendations, RoutingAnalysis, RoutingHistory, RoutingRecord,
};
use crate::matcher::{Candidate, KeywordMatcher, SpecificityWeighting};
use crate::ranker::rank;
use crate::registry::{RegistryError, ToolDescriptor, ToolRegistry};
use crate::tally::{Tally, ToolTallies};
use crate::types::{FallbackNote, FallbackReason, Query, RoutedAnswer, ValidationVerdict};
use crate::validator::assess;

/// Confidence reported when the fallback tool answers
pub const FALLBACK_CONFIDENCE: f64 = 1.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

/// Reply to a feedback submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAck {
    pub feedback_recorded: bool,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStatus {
    pub name: String,
    pub description: String,
    pub keyword_count: usize,
    pub is_fallback: bool,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub tools: Vec<ToolStatus>,
    pub history_entries: usize,
    pub learning_enabled: bool,
}

/// Controller states for one request
enum State {
    TryCandidate(usize),
    Validate(usize, String),
    Fallback(FallbackReason),
}

/// The request router. Cheap to share behind an `Arc`; concurrent `route`
/// calls only contend on the history lock while appending.
pub struct Router {
    registry: Arc<ToolRegistry>,
    matcher: KeywordMatcher,
    tallies: ToolTallies,
    history: Mutex<RoutingHistory>,
    config: RouterConfig,
}

impl Router {
    /// Build a router over a finished registry. The registry must contain a
    /// fallback tool.
    pub fn new(registry: ToolRegistry, config: RouterConfig) -> Result<Self, RegistryError> {
        if registry.fallback().is_none() {
            return Err(RegistryError::MissingFallback);
        }
        let matcher = KeywordMatcher::new(Arc::new(SpecificityWeighting::new(
            &config.generic_keywords,
            config.generic_factor,
        )));
        let tallies = ToolTallies::for_registry(&registry);
        let history = Mutex::new(RoutingHistory::new(config.history_capacity));
        info!(
            "Router ready with {} tools ({} specialized)",
            registry.len(),
            registry.specialized().count()
        );
        Ok(Self {
            registry: Arc::new(registry),
            matcher,
            tallies,
            history,
            config,
        })
    }

    /// Replace the keyword matcher (and with it the weighting strategy)
    pub fn with_matcher(mut self, matcher: KeywordMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Seed the router with a previously saved history. With learning on,
    /// recorded outcomes and feedback are replayed into the tallies.
    pub fn with_history(self, history: RoutingHistory) -> Self {
        if self.config.enable_learning {
            let outcomes = history
                .records()
                .map(|r| (r.selected_tool.as_str(), r.success))
                .chain(history.feedback().map(|f| (f.tool.as_str(), f.helpful)));
            for (tool, ok) in outcomes {
                if ok {
                    self.tallies.record_success(tool);
                } else {
                    self.tallies.record_failure(tool);
                }
            }
        }
        *self.lock_history() = history;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn tally(&self, tool: &str) -> Tally {
        self.tallies.get(tool)
    }

    /// Ranked candidates for `text` without executing anything
    pub fn candidates(&self, text: &str) -> Vec<Candidate> {
        rank(
            self.matcher.match_query(text, &self.registry),
            &self.tallies,
            &self.config,
        )
    }

    /// Route a query to exactly one tool and return its answer.
    ///
    /// Only `RouteError::FallbackFailure` is ever returned: every failure of
    /// a specialized tool is absorbed by trying the next candidate or the
    /// fallback.
    pub async fn route(&self, query: Query) -> Result<RoutedAnswer, RouteError> {
        self.route_with_cancel(query, &CancellationToken::new()).await
    }

    /// Like [`Router::route`], abandoning the request when `cancel` fires.
    pub async fn route_with_cancel(
        &self,
        query: Query,
        cancel: &CancellationToken,
    ) -> Result<RoutedAnswer, RouteError> {
        let request_id = Uuid::new_v4().to_string();
        let candidates = self.candidates(&query.text);
        let viable: Vec<&Candidate> = candidates.iter().filter(|c| c.viable).collect();
        let timeout = self.config.tool_timeout();

        let mut state = if candidates.is_empty() {
            info!("{}", RouteError::NoMatch);
            State::Fallback(FallbackReason::NoMatch)
        } else if viable.is_empty() {
            info!(
                "No candidate reached the viability threshold ({:.2})",
                self.config.viability_threshold
            );
            State::Fallback(FallbackReason::LowConfidence)
        } else {
            State::TryCandidate(0)
        };
        let mut last_failure = FallbackNote::new(FallbackReason::LowConfidence);

        loop {
            state = match state {
                State::TryCandidate(i) => {
                    let Some(candidate) = viable.get(i) else {
                        break;
                    };
                    let Some(tool) = self.registry.by_index(candidate.index) else {
                        state = State::TryCandidate(i + 1);
                        continue;
                    };
                    info!(
                        "Routing request to {} with confidence {:.2}",
                        tool.name, candidate.confidence
                    );
                    match execute(tool, &query, timeout, cancel).await {
                        Ok(answer) => State::Validate(i, answer),
                        Err(ExecutionError::Cancelled) => {
                            return Err(RouteError::FallbackFailure(ExecutionError::Cancelled));
                        }
                        Err(source) => {
                            last_failure = FallbackNote {
                                failed_tool: Some(tool.name.clone()),
                                error: Some(source.to_string()),
                                ..FallbackNote::new(FallbackReason::AgentError)
                            };
                            let err = RouteError::ExecutionFailure {
                                tool: tool.name.clone(),
                                source,
                            };
                            warn!("{}", err);
                            self.record_attempt(
                                &request_id,
                                &query,
                                candidate,
                                None,
                                FallbackReason::AgentError,
                            );
                            State::TryCandidate(i + 1)
                        }
                    }
                }
                State::Validate(i, answer) => {
                    let candidate = viable[i];
                    let validation = assess(&query.text, &answer, false, &self.config);
                    if validation.verdict == ValidationVerdict::Pass {
                        self.record_accept(
                            &request_id,
                            &query,
                            &candidate.tool,
                            candidate.confidence,
                            ValidationVerdict::Pass,
                            None,
                        );
                        return Ok(RoutedAnswer {
                            chosen_tool: candidate.tool.clone(),
                            confidence: candidate.confidence,
                            answer,
                            fallback_used: false,
                            session_id: query.session_id.clone(),
                            matched_keywords: candidate.matched_keywords.clone(),
                            fallback_reason: None,
                        });
                    }
                    let err = RouteError::ValidationFailure {
                        tool: candidate.tool.clone(),
                    };
                    warn!("{}: {:?}", err, validation.reasons);
                    self.record_attempt(
                        &request_id,
                        &query,
                        candidate,
                        Some(ValidationVerdict::Fail),
                        FallbackReason::IrrelevantResponse,
                    );
                    last_failure = FallbackNote {
                        failed_tool: Some(candidate.tool.clone()),
                        validation_failures: validation.reasons,
                        ..FallbackNote::new(FallbackReason::IrrelevantResponse)
                    };
                    State::TryCandidate(i + 1)
                }
                State::Fallback(reason) => {
                    let note = FallbackNote::new(reason);
                    return self.run_fallback(&request_id, &query, note, cancel).await;
                }
            };
        }

        self.run_fallback(&request_id, &query, last_failure, cancel)
            .await
    }

    async fn run_fallback(
        &self,
        request_id: &str,
        query: &Query,
        note: FallbackNote,
        cancel: &CancellationToken,
    ) -> Result<RoutedAnswer, RouteError> {
        let reason = note.reason;
        let Some(fallback) = self.registry.fallback() else {
            // Router::new refuses registries without a fallback.
            return Err(RouteError::FallbackFailure(ExecutionError::ToolRaised(
                "no fallback tool registered".to_string(),
            )));
        };
        info!("Using fallback {} - reason: {}", fallback.name, reason);

        let timeout = self.config.tool_timeout();
        match execute_fallback(fallback, query, &note, timeout, cancel).await {
            Ok(answer) => {
                let verdict = assess(&query.text, &answer, true, &self.config).verdict;
                self.record_accept(
                    request_id,
                    query,
                    &fallback.name,
                    FALLBACK_CONFIDENCE,
                    verdict,
                    Some(reason),
                );
                Ok(RoutedAnswer {
                    chosen_tool: fallback.name.clone(),
                    confidence: FALLBACK_CONFIDENCE,
                    answer,
                    fallback_used: true,
                    session_id: query.session_id.clone(),
                    matched_keywords: Vec::new(),
                    fallback_reason: Some(reason),
                })
            }
            Err(e) => {
                warn!("Fallback {} also failed: {}", fallback.name, e);
                if e != ExecutionError::Cancelled {
                    self.record_fallback_failure(request_id, query, fallback, reason);
                }
                Err(RouteError::FallbackFailure(e))
            }
        }
    }

    fn record_accept(
        &self,
        request_id: &str,
        query: &Query,
        tool: &str,
        confidence: f64,
        verdict: ValidationVerdict,
        reason: Option<FallbackReason>,
    ) {
        if !self.config.enable_learning {
            return;
        }
        self.tallies.record_success(tool);
        self.lock_history().push(RoutingRecord {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            query: query.text.clone(),
            session_id: query.session_id.clone(),
            selected_tool: tool.to_string(),
            confidence,
            fallback_used: reason.is_some(),
            success: true,
            verdict: Some(verdict),
            reason,
        });
    }

    fn record_attempt(
        &self,
        request_id: &str,
        query: &Query,
        candidate: &Candidate,
        verdict: Option<ValidationVerdict>,
        reason: FallbackReason,
    ) {
        if !self.config.enable_learning {
            return;
        }
        self.tallies.record_failure(&candidate.tool);
        self.lock_history().push(RoutingRecord {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            query: query.text.clone(),
            session_id: query.session_id.clone(),
            selected_tool: candidate.tool.clone(),
            confidence: candidate.confidence,
            fallback_used: false,
            success: false,
            verdict,
            reason: Some(reason),
        });
    }

    fn record_fallback_failure(
        &self,
        request_id: &str,
        query: &Query,
        fallback: &ToolDescriptor,
        reason: FallbackReason,
    ) {
        if !self.config.enable_learning {
            return;
        }
        self.tallies.record_failure(&fallback.name);
        self.lock_history().push(RoutingRecord {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            query: query.text.clone(),
            session_id: query.session_id.clone(),
            selected_tool: fallback.name.clone(),
            confidence: FALLBACK_CONFIDENCE,
            fallback_used: true,
            success: false,
            verdict: None,
            reason: Some(reason),
        });
    }

    /// Record a user's judgement of an answer and adjust the tool's tally.
    pub fn feedback(
        &self,
        query: &str,
        tool: &str,
        helpful: bool,
        note: Option<String>,
    ) -> Result<FeedbackAck, FeedbackError> {
        if self.registry.get(tool).is_none() {
            return Err(FeedbackError::UnknownTool(tool.to_string()));
        }

        let recorded = self.config.enable_learning;
        if recorded {
            if helpful {
                self.tallies.record_success(tool);
            } else {
                self.tallies.record_failure(tool);
            }
            self.lock_history().push_feedback(FeedbackRecord {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                query: query.to_string(),
                tool: tool.to_string(),
                helpful,
                note,
            });
            let kind = if helpful { "positive" } else { "negative" };
            debug!("Recorded {} feedback for {}", kind, tool);
        } else {
            debug!("Learning disabled, feedback for {} not recorded", tool);
        }

        let mut suggestions = Vec::new();
        if !helpful {
            if recorded {
                suggestions.push(
                    "Thank you for the feedback. It will be used to improve routing decisions."
                        .to_string(),
                );
            }
            let others: Vec<String> = self
                .registry
                .names()
                .into_iter()
                .filter(|n| n != tool)
                .collect();
            if !others.is_empty() {
                suggestions.push(format!(
                    "You might try asking differently, or the request could be routed to: {}",
                    others.join(", ")
                ));
            }
        }

        let message = if recorded {
            "Thank you for your feedback! This helps improve the system."
        } else {
            "Thank you for your feedback. Learning is disabled, so it was not recorded."
        };
        Ok(FeedbackAck {
            feedback_recorded: recorded,
            message: message.to_string(),
            suggestions,
        })
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            tools: self
                .registry
                .iter()
                .map(|t| {
                    let tally = self.tallies.get(&t.name);
                    ToolStatus {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        keyword_count: t.keywords.len(),
                        is_fallback: t.is_fallback,
                        successes: tally.successes,
                        failures: tally.failures,
                    }
                })
                .collect(),
            history_entries: self.lock_history().len(),
            learning_enabled: self.config.enable_learning,
        }
    }

    pub fn analyze(&self) -> RoutingAnalysis {
        self.lock_history().analyze()
    }

    pub fn recommendations(&self, query: &str) -> Recommendations {
        self.lock_history().recommendations(query)
    }

    /// Copy of the current history, e.g. for saving
    pub fn history(&self) -> RoutingHistory {
        self.lock_history().clone()
    }

    pub fn save_history(&self, path: &Path) -> Result<()> {
        let snapshot = self.history();
        snapshot.save(path)
    }

    fn lock_history(&self) -> MutexGuard<'_, RoutingHistory> {
        // History is advisory; a panic mid-push must not take routing down.
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}
