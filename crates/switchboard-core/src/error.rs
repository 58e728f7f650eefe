//! Error types for routing and tool execution

use thiserror::Error;

/// Why a single tool execution did not produce a usable answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("tool timed out after {0}s")]
    Timeout(u64),

    #[error("tool raised: {0}")]
    ToolRaised(String),

    #[error("tool returned no usable content")]
    EmptyResult,

    #[error("execution cancelled")]
    Cancelled,
}

/// Routing failure taxonomy.
///
/// Everything below `FallbackFailure` is absorbed inside the router and only
/// shows up in history records; `route` itself returns `FallbackFailure` or
/// nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no registered tool matched the query")]
    NoMatch,

    #[error("tool '{tool}' failed: {source}")]
    ExecutionFailure {
        tool: String,
        #[source]
        source: ExecutionError,
    },

    #[error("answer from tool '{tool}' was judged irrelevant")]
    ValidationFailure { tool: String },

    #[error("the system could not process the request: {0}")]
    FallbackFailure(#[source] ExecutionError),
}
