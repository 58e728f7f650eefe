//! Shared types for switchboard-core

use serde::{Deserialize, Serialize};

/// One prior exchange in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub answer: String,
}

/// Incoming request to the router
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Opaque correlation key, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Prior turns, most recent last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Turn>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: None,
            context: Vec::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, context: Vec<Turn>) -> Self {
        self.context = context;
        self
    }
}

/// Result of the relevance check on a tool's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationVerdict {
    Pass,
    Fail,
    /// The answer came from the fallback tool and is accepted as-is
    NotApplicable,
}

impl std::fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::NotApplicable => write!(f, "not_applicable"),
        }
    }
}

/// Why the fallback tool ended up answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No tool keyword matched the query
    NoMatch,
    /// Some tools matched, none above the viability threshold
    LowConfidence,
    /// The last viable candidate failed to execute
    AgentError,
    /// The last viable candidate answered, but the answer failed validation
    IrrelevantResponse,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatch => write!(f, "no_match"),
            Self::LowConfidence => write!(f, "low_confidence"),
            Self::AgentError => write!(f, "agent_error"),
            Self::IrrelevantResponse => write!(f, "irrelevant_response"),
        }
    }
}

/// What was tried before the fallback was called, handed to the fallback
/// tool so it can answer with that in mind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackNote {
    pub reason: FallbackReason,
    /// Last specialized tool that was tried, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_tool: Option<String>,
    /// Execution error of that tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why its answer was rejected
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_failures: Vec<String>,
}

impl FallbackNote {
    pub fn new(reason: FallbackReason) -> Self {
        Self {
            reason,
            failed_tool: None,
            error: None,
            validation_failures: Vec::new(),
        }
    }
}

/// Final answer handed back to the caller (CLI, HTTP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedAnswer {
    pub chosen_tool: String,
    pub confidence: f64,
    pub answer: String,
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let q = Query::new("show me ec2 instances")
            .with_session("s-1")
            .with_context(vec![Turn {
                query: "hi".to_string(),
                answer: "hello".to_string(),
            }]);
        assert_eq!(q.session_id.as_deref(), Some("s-1"));
        assert_eq!(q.context.len(), 1);
    }

    #[test]
    fn test_fallback_note_json_shape() {
        let note = FallbackNote {
            failed_tool: Some("aws_resource".to_string()),
            error: Some("tool timed out after 30s".to_string()),
            ..FallbackNote::new(FallbackReason::AgentError)
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["reason"], "agent_error");
        assert_eq!(json["failed_tool"], "aws_resource");
        assert!(json.get("validation_failures").is_none());

        let bare = serde_json::to_value(FallbackNote::new(FallbackReason::NoMatch)).unwrap();
        assert_eq!(bare, serde_json::json!({"reason": "no_match"}));
    }

    #[test]
    fn test_routed_answer_json_shape() {
        let answer = RoutedAnswer {
            chosen_tool: "general".to_string(),
            confidence: 1.0,
            answer: "42".to_string(),
            fallback_used: true,
            session_id: None,
            matched_keywords: vec![],
            fallback_reason: Some(FallbackReason::NoMatch),
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["chosen_tool"], "general");
        assert_eq!(json["fallback_used"], true);
        assert_eq!(json["fallback_reason"], "no_match");
        assert!(json.get("session_id").is_none());
        assert!(json.get("matched_keywords").is_none());
    }

    #[test]
    fn test_query_deserialize_minimal() {
        let q: Query = serde_json::from_str(r#"{"text":"list s3 buckets"}"#).unwrap();
        assert_eq!(q.text, "list s3 buckets");
        assert!(q.session_id.is_none());
        assert!(q.context.is_empty());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ValidationVerdict::NotApplicable.to_string(), "not_applicable");
        assert_eq!(FallbackReason::IrrelevantResponse.to_string(), "irrelevant_response");
    }
}
