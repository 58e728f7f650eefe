//! Tool execution with timeout and cancellation

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capabilities::Invocation;
use crate::error::ExecutionError;
use crate::registry::ToolDescriptor;
use crate::types::{FallbackNote, Query};

/// Invoke a tool's capability and turn every way it can go wrong into an
/// `ExecutionError`.
///
/// The invocation runs on its own task: a panic inside the capability becomes
/// `ToolRaised`, and on timeout or cancellation the task is aborted, which
/// drops (and for commands, kills) whatever it was waiting on.
pub async fn execute(
    tool: &ToolDescriptor,
    query: &Query,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String, ExecutionError> {
    run(tool, query, None, timeout, cancel).await
}

/// Run the fallback tool, passing along what was tried before it.
pub async fn execute_fallback(
    tool: &ToolDescriptor,
    query: &Query,
    note: &FallbackNote,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String, ExecutionError> {
    run(tool, query, Some(note.clone()), timeout, cancel).await
}

async fn run(
    tool: &ToolDescriptor,
    query: &Query,
    note: Option<FallbackNote>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String, ExecutionError> {
    let capability = tool.capability.clone();
    let text = query.text.clone();
    let context = query.context.clone();
    let mut handle = tokio::spawn(async move {
        match note {
            Some(note) => capability.invoke_fallback(&text, &context, &note).await,
            None => capability.invoke(&text, &context).await,
        }
    });

    debug!("Executing tool {} (timeout {:?})", tool.name, timeout);

    let joined = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            handle.abort();
            return Err(ExecutionError::Cancelled);
        }
        joined = tokio::time::timeout(timeout, &mut handle) => joined,
    };

    let invocation = match joined {
        Err(_) => {
            handle.abort();
            warn!("Tool {} timed out after {:?}", tool.name, timeout);
            return Err(ExecutionError::Timeout(timeout.as_secs()));
        }
        Ok(Err(join_err)) => {
            let message = if join_err.is_panic() {
                "capability panicked".to_string()
            } else {
                join_err.to_string()
            };
            return Err(ExecutionError::ToolRaised(message));
        }
        Ok(Ok(invocation)) => invocation,
    };

    match invocation {
        Invocation::Success { text } if text.trim().is_empty() => Err(ExecutionError::EmptyResult),
        Invocation::Success { text } => Ok(text),
        Invocation::Failure { kind, message } => {
            Err(ExecutionError::ToolRaised(format!("{}: {}", kind, message)))
        }
    }
}
