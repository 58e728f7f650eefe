//! Capability backed by an HTTP agent endpoint

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Capability, FailureKind, Invocation};
use crate::types::{FallbackNote, Turn};

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    question: &'a str,
    context: &'a [Turn],
    /// Present only when called as the fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<&'a FallbackNote>,
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// POSTs `{question, context}` to an agent endpoint and reads `answer` back.
/// As a fallback it also sends `fallback`: the tool tried last and why it
/// was not accepted.
pub struct HttpCapability {
    client: Client,
    url: String,
    bearer_token: Option<String>,
}

impl std::fmt::Debug for HttpCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCapability")
            .field("url", &self.url)
            .field("has_token", &self.bearer_token.is_some())
            .finish()
    }
}

impl HttpCapability {
    pub fn new(url: impl Into<String>, bearer_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        })
    }

    async fn send(
        &self,
        input: &str,
        context: &[Turn],
        fallback: Option<&FallbackNote>,
    ) -> Invocation {
        let mut request = self.client.post(&self.url).json(&AgentRequest {
            question: input,
            context,
            fallback,
        });
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                return Invocation::failure(
                    FailureKind::Unavailable,
                    format!("request to {} failed: {}", self.url, e),
                );
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Invocation::failure(
                FailureKind::Internal,
                format!("{} returned {}: {}", self.url, status, body.trim()),
            );
        }

        match response.json::<AgentResponse>().await {
            Ok(AgentResponse {
                error: Some(error), ..
            }) => Invocation::failure(FailureKind::Internal, error),
            Ok(AgentResponse { answer, .. }) => {
                debug!("Agent at {} answered", self.url);
                Invocation::success(answer.unwrap_or_default())
            }
            Err(e) => Invocation::failure(
                FailureKind::Internal,
                format!("invalid response from {}: {}", self.url, e),
            ),
        }
    }
}

#[async_trait]
impl Capability for HttpCapability {
    async fn invoke(&self, input: &str, context: &[Turn]) -> Invocation {
        self.send(input, context, None).await
    }

    async fn invoke_fallback(
        &self,
        input: &str,
        context: &[Turn],
        note: &FallbackNote,
    ) -> Invocation {
        self.send(input, context, Some(note)).await
    }
}
