//! Relay HTTP server
//!
//! Stateless endpoint between the client and the external completion API:
//! it injects the system prompt, forwards the supplied history plus the
//! new user message, and classifies upstream failures into distinct
//! statuses. Every response carries permissive CORS headers; the CORS
//! layer answers `OPTIONS` preflights with an empty success.

mod client;

pub use client::{RelayApi, RelayClient, RelayError};

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{self, CREDENTIAL_VAR};
use crate::conversation::Message;
use crate::llm::{ChatTurn, CompletionClient, CompletionError};
use crate::{Error, Result};

/// Shared state for relay handlers
pub struct RelayState {
    /// Completion API client (fixed model and sampling parameters)
    pub completion: CompletionClient,

    /// System prompt injected ahead of every forwarded conversation
    pub system_prompt: String,

    /// Env var the credential is read from at request time
    pub credential_var: String,
}

impl RelayState {
    /// Create relay state reading the credential from the default env var
    #[must_use]
    pub fn new(completion: CompletionClient, system_prompt: String) -> Self {
        Self {
            completion,
            system_prompt,
            credential_var: CREDENTIAL_VAR.to_string(),
        }
    }

    /// Override the credential env var (used in tests)
    #[must_use]
    pub fn credential_var(mut self, var: impl Into<String>) -> Self {
        self.credential_var = var.into();
        self
    }
}

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The new user message
    pub message: String,

    /// Prior turns of the conversation, oldest first
    #[serde(rename = "conversationHistory", default)]
    pub conversation_history: Vec<Message>,
}

/// Chat success body
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// Completion text
    pub response: String,
}

/// Classified relay failures, rendered as `{"error": ...}` bodies
#[derive(Debug)]
pub enum ChatError {
    /// No API credential configured
    NotConfigured(String),

    /// Upstream rate limit
    RateLimited,

    /// Upstream quota/billing limit
    QuotaExceeded,

    /// Everything else (upstream status, transport, parse)
    Upstream(String),
}

impl From<CompletionError> for ChatError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::RateLimited => Self::RateLimited,
            CompletionError::QuotaExceeded => Self::QuotaExceeded,
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            error: String,
        }

        let (status, message) = match self {
            Self::NotConfigured(msg) | Self::Upstream(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Please wait a moment before trying again.".to_string(),
            ),
            Self::QuotaExceeded => (
                StatusCode::PAYMENT_REQUIRED,
                "AI usage limit reached. Please add credits to continue.".to_string(),
            ),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Handle one chat turn
async fn chat(
    State(state): State<Arc<RelayState>>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, ChatError> {
    tracing::debug!(
        history = request.conversation_history.len(),
        chars = request.message.len(),
        "chat request received"
    );

    // Credential is resolved per request so key rotation needs no restart
    let credential = config::credential_from(&state.credential_var).ok_or_else(|| {
        tracing::error!(var = %state.credential_var, "no API credential configured");
        ChatError::NotConfigured(format!("{} is not configured", state.credential_var))
    })?;

    let turns = build_turns(
        &state.system_prompt,
        &request.conversation_history,
        &request.message,
    );

    let text = state.completion.complete(&credential, &turns).await?;

    Ok(Json(ChatResponse { response: text }))
}

/// Assemble the forwarded turns: system prompt first, then the supplied
/// history, then the new user message
fn build_turns<'a>(
    system_prompt: &'a str,
    history: &'a [Message],
    message: &'a str,
) -> Vec<ChatTurn<'a>> {
    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(ChatTurn {
        role: "system",
        content: system_prompt,
    });
    for entry in history {
        turns.push(ChatTurn {
            role: match entry.role {
                crate::conversation::Role::User => "user",
                crate::conversation::Role::Assistant => "assistant",
            },
            content: &entry.content,
        });
    }
    turns.push(ChatTurn {
        role: "user",
        content: message,
    });
    turns
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Liveness probe
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the relay router with CORS and request tracing
#[must_use]
pub fn router(state: Arc<RelayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Relay server
pub struct RelayServer {
    state: Arc<RelayState>,
    port: u16,
}

impl RelayServer {
    /// Create a server for the given state and port
    #[must_use]
    pub fn new(state: RelayState, port: u16) -> Self {
        Self {
            state: Arc::new(state),
            port,
        }
    }

    /// Run the relay server until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run.
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Relay(format!("failed to bind relay server: {e}")))?;

        tracing::info!(port = self.port, model = %self.state.completion.model(), "relay listening");

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| Error::Relay(format!("relay server error: {e}")))?;

        Ok(())
    }

    /// Run the relay server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_turns_keep_system_prompt_first() {
        let history = vec![
            Message::assistant("greeting"),
            Message::user("question"),
            Message::assistant("answer"),
        ];

        let turns = build_turns("persona prompt", &history, "follow-up");

        assert_eq!(turns.len(), 5);
        assert_eq!(turns[0].role, "system");
        assert_eq!(turns[0].content, "persona prompt");
        assert_eq!(turns[1].role, "assistant");
        assert_eq!(turns[2].role, "user");
        assert_eq!(turns[2].content, "question");
        assert_eq!(turns[4].role, "user");
        assert_eq!(turns[4].content, "follow-up");
    }

    #[test]
    fn empty_history_forwards_system_and_message_only() {
        let turns = build_turns("persona prompt", &[], "hello");

        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, "system");
        assert_eq!(turns[1].role, "user");
        assert_eq!(turns[1].content, "hello");
    }
}
