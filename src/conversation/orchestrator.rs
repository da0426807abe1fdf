//! Conversation orchestrator
//!
//! Owns the turn loop: seeds the greeting, serializes one in-flight relay
//! request, hands finished transcripts off as messages, and drives the
//! voice toggles. Every failure path ends back in the idle state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::PersonaConfig;
use crate::conversation::{Conversation, Message};
use crate::notify::NoticeSender;
use crate::relay::RelayApi;
use crate::voice::{SpeechCapture, SpeechPlayback};

/// Delay before the greeting is spoken, so the interface settles first
pub const GREETING_DELAY: Duration = Duration::from_secs(1);

/// Drives one conversation session
pub struct Orchestrator {
    conversation: Mutex<Conversation>,
    relay: Arc<dyn RelayApi>,
    capture: SpeechCapture,
    playback: SpeechPlayback,
    assistant_name: String,
    voice_output: AtomicBool,
    in_flight: AtomicBool,
    pending_greeting: Mutex<Option<JoinHandle<()>>>,
    notices: NoticeSender,
}

impl Orchestrator {
    /// Create a session: seed the greeting and, when voice output is on
    /// and supported, schedule it to be spoken after [`GREETING_DELAY`]
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        persona: &PersonaConfig,
        voice_output_enabled: bool,
        relay: Arc<dyn RelayApi>,
        capture: SpeechCapture,
        playback: SpeechPlayback,
        notices: NoticeSender,
    ) -> Arc<Self> {
        let greeting = persona.greeting.clone();

        let orchestrator = Arc::new(Self {
            conversation: Mutex::new(Conversation::with_greeting(greeting.clone())),
            relay,
            capture,
            playback,
            assistant_name: persona.name.clone(),
            voice_output: AtomicBool::new(voice_output_enabled),
            in_flight: AtomicBool::new(false),
            pending_greeting: Mutex::new(None),
            notices,
        });

        if voice_output_enabled && orchestrator.playback.is_supported() {
            let this = Arc::clone(&orchestrator);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(GREETING_DELAY).await;
                this.playback.speak(&greeting);
            });
            if let Ok(mut pending) = orchestrator.pending_greeting.lock() {
                *pending = Some(handle);
            }
        }

        orchestrator
    }

    /// All turns so far, greeting first
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.conversation
            .lock()
            .map(|c| c.messages().to_vec())
            .unwrap_or_default()
    }

    /// Most recent turn
    #[must_use]
    pub fn last_message(&self) -> Option<Message> {
        self.conversation
            .lock()
            .ok()
            .and_then(|c| c.messages().last().cloned())
    }

    /// Whether a relay request is outstanding
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether responses are spoken aloud
    #[must_use]
    pub fn voice_output_enabled(&self) -> bool {
        self.voice_output.load(Ordering::SeqCst)
    }

    /// Speech capture component
    #[must_use]
    pub fn capture(&self) -> &SpeechCapture {
        &self.capture
    }

    /// Speech playback component
    #[must_use]
    pub fn playback(&self) -> &SpeechPlayback {
        &self.playback
    }

    /// Send one user message through the relay
    ///
    /// No-op on empty/whitespace text or while a request is in flight.
    /// On success the assistant turn is appended and optionally spoken;
    /// on failure a notice is surfaced and the list is left as-is after
    /// the user turn.
    pub async fn send_message(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        // One outstanding request at a time; extra sends are dropped
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("send dropped, request already in flight");
            return;
        }

        let history = {
            let Ok(mut conversation) = self.conversation.lock() else {
                self.in_flight.store(false, Ordering::SeqCst);
                return;
            };
            let history = conversation.messages().to_vec();
            conversation.push_user(text);
            history
        };

        self.capture.reset();

        tracing::info!(history = history.len(), "sending message");

        match self.relay.send(text, &history).await {
            Ok(reply) => {
                if let Ok(mut conversation) = self.conversation.lock() {
                    conversation.push_assistant(reply.clone());
                }
                if self.voice_output_enabled() && self.playback.is_supported() {
                    self.cancel_pending_greeting();
                    self.playback.speak(&reply);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay request failed");
                self.notices.error(e.message.unwrap_or_else(|| {
                    format!("Failed to get response from {}", self.assistant_name)
                }));
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Toggle voice input
    ///
    /// Listening → stop; a non-empty transcript is sent immediately and
    /// cleared. Not listening → clear the transcript and start a session.
    pub async fn toggle_voice_input(&self) {
        if self.capture.is_listening() {
            self.capture.stop();

            let transcript = self.capture.transcript();
            if !transcript.trim().is_empty() {
                self.send_message(&transcript).await;
                self.capture.reset();
            }
        } else {
            self.capture.reset();
            self.capture.start().await;
        }
    }

    /// Toggle voice output; stops playback first when currently speaking
    pub fn toggle_voice_output(&self) {
        if self.voice_output_enabled() && self.playback.is_speaking() {
            self.cancel_pending_greeting();
            self.playback.stop();
        }
        self.voice_output.fetch_xor(true, Ordering::SeqCst);
    }

    /// Cancel a greeting that is still waiting on its render delay
    fn cancel_pending_greeting(&self) {
        if let Ok(mut pending) = self.pending_greeting.lock() {
            if let Some(handle) = pending.take() {
                handle.abort();
            }
        }
    }
}
