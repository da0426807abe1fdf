//! Chat-completion API client
//!
//! Talks to the hosted completion endpoint directly and classifies the
//! upstream statuses the relay has to distinguish (rate limit, quota).

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::RelayConfig;

/// One wire-format turn of a completion request
#[derive(Debug, Serialize)]
pub struct ChatTurn<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Completion request body
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn<'a>],
    temperature: f32,
    max_tokens: u32,
}

/// Completion response body (only the text is extracted)
#[derive(serde::Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(serde::Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(serde::Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Classified completion failures
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Upstream returned its rate-limit status
    #[error("rate limited by completion API")]
    RateLimited,

    /// Upstream returned its quota/billing status
    #[error("completion API usage limit reached")]
    QuotaExceeded,

    /// Any other non-success upstream status
    #[error("completion API error: {status}")]
    Upstream { status: u16 },

    /// Transport failure (connect, TLS, read)
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response parsed but carried no completion text
    #[error("completion response missing choices")]
    Empty,
}

/// Client for the external chat-completion API
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl CompletionClient {
    /// Create a client with the relay's fixed sampling parameters
    #[must_use]
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.completion_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Model identifier this client forwards with
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request one completion for the given turns
    ///
    /// # Errors
    ///
    /// Returns a classified [`CompletionError`] on any failure.
    pub async fn complete(
        &self,
        credential: &SecretString,
        turns: &[ChatTurn<'_>],
    ) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: turns,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(model = %self.model, turns = turns.len(), "calling completion API");

        let response = self
            .client
            .post(&self.url)
            .header(
                "Authorization",
                format!("Bearer {}", credential.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "completion request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "completion API error");

            return Err(match status.as_u16() {
                429 => CompletionError::RateLimited,
                402 => CompletionError::QuotaExceeded,
                code => CompletionError::Upstream { status: code },
            });
        }

        let result: CompletionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse completion response");
            e
        })?;

        let text = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(CompletionError::Empty)?;

        tracing::info!(chars = text.len(), "completion received");
        Ok(text)
    }
}
