//! switchboard-core - Request routing across specialized agents
//!
//! This crate provides:
//! - Tool registry with keyword sets and a mandatory general fallback
//! - Keyword matcher with a pluggable weighting strategy
//! - Confidence ranker biased by per-tool success/failure tallies
//! - Executor enforcing a per-tool timeout and cancellation
//! - Response validator that rejects empty, evasive or off-topic answers
//! - Router that walks the candidates and falls back when none is accepted
//! - Bounded routing history with analysis, recommendations and feedback

pub mod capabilities;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod matcher;
pub mod ranker;
pub mod registry;
pub mod router;
pub mod tally;
pub mod types;
pub mod validator;

// Re-export main types for convenience
pub use capabilities::{
    Capability, CommandCapability, FailureKind, HttpCapability, Invocation, StaticCapability,
};
pub use config::RouterConfig;
pub use error::{ExecutionError, RouteError};
pub use history::{Recommendations, RoutingAnalysis, RoutingHistory, RoutingRecord};
pub use matcher::{Candidate, KeywordMatcher, KeywordWeighting, SpecificityWeighting};
pub use registry::{RegistryError, ToolDescriptor, ToolRegistry};
pub use router::{FeedbackAck, FeedbackError, Router, SystemStatus, ToolStatus};
pub use tally::{Tally, ToolTallies};
pub use types::{FallbackReason, Query, RoutedAnswer, Turn, ValidationVerdict};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = std::mem::size_of::<Router>();
        let _ = std::mem::size_of::<ToolRegistry>();
        let _ = std::mem::size_of::<RoutedAnswer>();
        let _ = std::mem::size_of::<RouteError>();
        let _ = std::mem::size_of::<RoutingHistory>();
    }
}
