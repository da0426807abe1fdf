//! Client side of the relay contract
//!
//! The orchestrator talks to the relay through the [`RelayApi`] seam so
//! tests can script responses without a server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::Message;

/// Failure reported back to the orchestrator
///
/// `message` carries the server-supplied error text when the relay
/// returned one; the orchestrator falls back to a generic notice when it
/// is absent.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .message.as_deref().unwrap_or("relay request failed"))]
pub struct RelayError {
    pub message: Option<String>,
}

impl RelayError {
    /// Error with server-supplied text
    #[must_use]
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Error with no usable text (transport failure, unparseable body)
    #[must_use]
    pub const fn generic() -> Self {
        Self { message: None }
    }
}

/// What the orchestrator needs from a relay
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Send one user message with the prior turns; returns completion text
    async fn send(
        &self,
        message: &str,
        history: &[Message],
    ) -> std::result::Result<String, RelayError>;
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    message: &'a str,
    #[serde(rename = "conversationHistory")]
    conversation_history: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponseBody {
    response: String,
}

#[derive(Deserialize)]
struct ChatErrorBody {
    error: String,
}

/// HTTP client for a running relay
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    url: String,
}

impl RelayClient {
    /// Create a client for the relay chat endpoint URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Chat endpoint URL of a relay on the local host
    #[must_use]
    pub fn local_url(port: u16) -> String {
        format!("http://127.0.0.1:{port}/api/chat")
    }
}

#[async_trait]
impl RelayApi for RelayClient {
    async fn send(
        &self,
        message: &str,
        history: &[Message],
    ) -> std::result::Result<String, RelayError> {
        let body = ChatRequestBody {
            message,
            conversation_history: history,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "relay request failed");
                RelayError::generic()
            })?;

        let status = response.status();
        if !status.is_success() {
            // Error bodies carry a user-displayable message
            let error = response
                .json::<ChatErrorBody>()
                .await
                .ok()
                .map(|b| b.error);
            tracing::warn!(status = %status, "relay returned error");
            return Err(RelayError { message: error });
        }

        let parsed: ChatResponseBody = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse relay response");
            RelayError::generic()
        })?;

        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    #[test]
    fn request_body_uses_wire_field_names() {
        let history = vec![Message::assistant("hello"), Message::user("hi")];
        let body = ChatRequestBody {
            message: "how are you",
            conversation_history: &history,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["message"], "how are you");
        assert_eq!(json["conversationHistory"][0]["role"], "assistant");
        assert_eq!(json["conversationHistory"][1]["content"], "hi");
    }

    #[test]
    fn relay_error_display_falls_back_to_generic() {
        assert_eq!(RelayError::generic().to_string(), "relay request failed");
        assert_eq!(
            RelayError::with_message("Rate limit exceeded").to_string(),
            "Rate limit exceeded"
        );
    }
}
