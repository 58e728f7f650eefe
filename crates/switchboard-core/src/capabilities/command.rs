//! Capability backed by an external read-only command

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Capability, FailureKind, Invocation};
use crate::types::{FallbackNote, Turn};

/// Placeholder in arguments that is replaced by the query text
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Environment variable carrying prior turns as JSON
pub const CONTEXT_ENV: &str = "SWITCHBOARD_CONTEXT";

/// Environment variable carrying the fallback note as JSON; only set when
/// the command runs as the fallback
pub const FALLBACK_ENV: &str = "SWITCHBOARD_FALLBACK";

/// At most this much stdout is kept; the rest is read and discarded
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

const MAX_STDERR_BYTES: usize = 4 * 1024;

/// Runs `program args...`, writes the query to stdin and returns stdout.
///
/// The child is killed when the invocation future is dropped, so the
/// executor's timeout actually stops the process.
#[derive(Debug, Clone)]
pub struct CommandCapability {
    program: String,
    args: Vec<String>,
}

impl CommandCapability {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn render_args(&self, input: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(QUERY_PLACEHOLDER, input))
            .collect()
    }

    async fn run(&self, input: &str, context: &[Turn], note: Option<&FallbackNote>) -> Invocation {
        let context_json = serde_json::to_string(context).unwrap_or_else(|_| "[]".to_string());
        debug!("Spawning {} with {} args", self.program, self.args.len());

        let mut command = Command::new(&self.program);
        command
            .args(self.render_args(input))
            .env(CONTEXT_ENV, context_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(note) = note {
            if let Ok(json) = serde_json::to_string(note) {
                command.env(FALLBACK_ENV, json);
            }
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {}", self.program, e);
                return Invocation::failure(
                    FailureKind::Unavailable,
                    format!("failed to start '{}': {}", self.program, e),
                );
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            // A program that ignores stdin may close it early; that is fine.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!("stdin write to {} failed: {}", self.program, e);
            }
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let ((stdout, truncated), (stderr, _), status) = tokio::join!(
            read_capped(stdout, MAX_OUTPUT_BYTES),
            read_capped(stderr, MAX_STDERR_BYTES),
            child.wait()
        );

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                return Invocation::failure(
                    FailureKind::Internal,
                    format!("failed to wait for '{}': {}", self.program, e),
                );
            }
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Invocation::failure(
                FailureKind::Internal,
                format!("'{}' exited with {}: {}", self.program, status, stderr.trim()),
            );
        }

        if truncated {
            warn!(
                "Output of {} truncated to {} bytes",
                self.program, MAX_OUTPUT_BYTES
            );
        }
        Invocation::success(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// Keep the first `cap` bytes of `reader`, then drain the rest so the child
/// never blocks on a full pipe. The flag is set when anything was dropped.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> (Vec<u8>, bool) {
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };
    let mut buf = Vec::new();
    if let Err(e) = (&mut reader).take(cap as u64).read_to_end(&mut buf).await {
        debug!("Reading child output failed: {}", e);
        return (buf, false);
    }
    let dropped = tokio::io::copy(&mut reader, &mut tokio::io::sink())
        .await
        .unwrap_or(0);
    (buf, dropped > 0)
}

#[async_trait]
impl Capability for CommandCapability {
    async fn invoke(&self, input: &str, context: &[Turn]) -> Invocation {
        self.run(input, context, None).await
    }

    async fn invoke_fallback(
        &self,
        input: &str,
        context: &[Turn],
        note: &FallbackNote,
    ) -> Invocation {
        self.run(input, context, Some(note)).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::types::FallbackReason;

    #[test]
    fn test_render_args() {
        let cap = CommandCapability::new(
            "aws",
            vec!["--query".to_string(), "{query}".to_string()],
        );
        assert_eq!(cap.render_args("ec2"), vec!["--query", "ec2"]);
    }

    #[tokio::test]
    async fn test_echoes_stdin() {
        let cap = CommandCapability::new("cat", vec![]);
        let inv = cap.invoke("list ec2 instances", &[]).await;
        assert_eq!(inv, Invocation::success("list ec2 instances"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let cap = CommandCapability::new("false", vec![]);
        let inv = cap.invoke("anything", &[]).await;
        assert!(matches!(
            inv,
            Invocation::Failure {
                kind: FailureKind::Internal,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let cap = CommandCapability::new("definitely-not-a-real-binary-xyz", vec![]);
        let inv = cap.invoke("anything", &[]).await;
        assert!(matches!(
            inv,
            Invocation::Failure {
                kind: FailureKind::Unavailable,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_context_env_is_passed() {
        let cap = CommandCapability::new(
            "sh",
            vec!["-c".to_string(), format!("printf '%s' \"${}\"", CONTEXT_ENV)],
        );
        let turns = vec![Turn {
            query: "q".to_string(),
            answer: "a".to_string(),
        }];
        match cap.invoke("ignored", &turns).await {
            Invocation::Success { text } => {
                let parsed: Vec<Turn> = serde_json::from_str(&text).unwrap();
                assert_eq!(parsed, turns);
            }
            other => panic!("unexpected invocation: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fallback_note_env_only_for_fallback() {
        let cap = CommandCapability::new(
            "sh",
            vec!["-c".to_string(), format!("printf '%s' \"${{{}:-unset}}\"", FALLBACK_ENV)],
        );
        assert_eq!(cap.invoke("q", &[]).await, Invocation::success("unset"));

        let note = FallbackNote {
            failed_tool: Some("aws_resource".to_string()),
            error: Some("tool timed out after 30s".to_string()),
            ..FallbackNote::new(FallbackReason::AgentError)
        };
        match cap.invoke_fallback("q", &[], &note).await {
            Invocation::Success { text } => {
                let parsed: FallbackNote = serde_json::from_str(&text).unwrap();
                assert_eq!(parsed, note);
            }
            other => panic!("unexpected invocation: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_large_output_is_capped() {
        let cap = CommandCapability::new(
            "sh",
            vec![
                "-c".to_string(),
                "head -c 200000 /dev/zero | tr '\\000' a".to_string(),
            ],
        );
        match cap.invoke("q", &[]).await {
            Invocation::Success { text } => {
                assert_eq!(text.len(), MAX_OUTPUT_BYTES);
                assert!(text.bytes().all(|b| b == b'a'));
            }
            other => panic!("unexpected invocation: {:?}", other),
        }
    }
}
