//! Jiro Gateway - voice-enabled chat assistant
//!
//! This library provides the core functionality for the Jiro gateway:
//! - Speech capture (microphone → finalized transcript)
//! - Speech playback (response text → audio, language-aware voice choice)
//! - Conversation orchestration (turn list, in-flight serialization)
//! - Relay (stateless HTTP endpoint in front of the completion API)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Console UI                        │
//! │        typed input   │   voice input/output          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Orchestrator                         │
//! │   Conversation  │  SpeechCapture  │  SpeechPlayback │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Relay                             │
//! │   system prompt  │  history  │  status mapping      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Completion API (external)               │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod notify;
pub mod prompt;
pub mod relay;
pub mod voice;

pub use config::{Config, PersonaConfig, RelayConfig, VoiceConfig};
pub use conversation::{Conversation, Message, Orchestrator, Role};
pub use error::{Error, Result};
pub use llm::{ChatTurn, CompletionClient, CompletionError};
pub use notify::{Notice, NoticeLevel, NoticeSender};
pub use relay::{RelayApi, RelayClient, RelayError, RelayServer, RelayState};
pub use voice::{SpeechCapture, SpeechPlayback};
