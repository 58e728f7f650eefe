//! Tool capabilities: the opaque callables behind each registered tool

use async_trait::async_trait;

use crate::types::{FallbackNote, Turn};

pub mod command;
pub mod http;

pub use command::CommandCapability;
pub use http::HttpCapability;

/// Coarse category of a capability-side failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The tool ran and reported an error of its own
    Internal,
    /// The tool's backend could not be reached or started
    Unavailable,
    /// The tool rejected the input
    InvalidInput,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::InvalidInput => write!(f, "invalid_input"),
        }
    }
}

/// Tagged result of a single capability invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Success { text: String },
    Failure { kind: FailureKind, message: String },
}

impl Invocation {
    pub fn success(text: impl Into<String>) -> Self {
        Self::Success { text: text.into() }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }
}

/// Anything that can attempt to answer a query.
///
/// Implementations must not panic on bad input; report it as
/// `Invocation::Failure` instead. Blocking work belongs behind `.await` so the
/// executor's timeout and cancellation can interrupt it.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, input: &str, context: &[Turn]) -> Invocation;

    /// Invoked instead of `invoke` when this capability answers as the
    /// fallback. `note` says which tool was tried last and why it was not
    /// accepted. Capabilities that cannot use it keep the default.
    async fn invoke_fallback(
        &self,
        input: &str,
        context: &[Turn],
        note: &FallbackNote,
    ) -> Invocation {
        let _ = note;
        self.invoke(input, context).await
    }
}

/// Capability that always returns the same text.
///
/// Used as the default general fallback, which must answer honestly even
/// when nothing better is configured.
#[derive(Debug, Clone)]
pub struct StaticCapability {
    text: String,
}

impl StaticCapability {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn unknown_answer() -> Self {
        Self::new(
            "I'm not able to answer that with the tools available. \
             Try rephrasing the request or asking about a specific AWS resource.",
        )
    }
}

#[async_trait]
impl Capability for StaticCapability {
    async fn invoke(&self, _input: &str, _context: &[Turn]) -> Invocation {
        Invocation::success(self.text.clone())
    }
}
