//! Shared test utilities
//!
//! Scripted stand-ins for the relay and the speech engines so orchestrator
//! and voice behavior can be exercised without audio hardware or network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use jiro_gateway::conversation::Message;
use jiro_gateway::relay::{RelayApi, RelayError};
use jiro_gateway::voice::{
    RecognitionEngine, RecognitionEvent, SynthesisEngine, Utterance, VoiceInfo,
};

/// Relay fake that replays scripted results and records every call
pub struct ScriptedRelay {
    results: Mutex<Vec<Result<String, RelayError>>>,
    calls: Mutex<Vec<(String, Vec<Message>)>>,
    delay: Option<Duration>,
}

impl ScriptedRelay {
    /// Relay that answers every call with the same reply
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(vec![Ok(reply.to_string())]),
            calls: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// Relay that fails every call with the given error
    pub fn failing(error: RelayError) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(vec![Err(error)]),
            calls: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// Relay that takes `delay` before answering
    pub fn replying_after(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(vec![Ok(reply.to_string())]),
            calls: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    /// Everything sent through this relay, in order
    pub fn calls(&self) -> Vec<(String, Vec<Message>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelayApi for ScriptedRelay {
    async fn send(&self, message: &str, history: &[Message]) -> Result<String, RelayError> {
        self.calls
            .lock()
            .unwrap()
            .push((message.to_string(), history.to_vec()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        // The last scripted result repeats for any extra calls
        let results = self.results.lock().unwrap();
        results
            .last()
            .cloned()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

/// Recognition engine that replays a scripted event sequence per session
pub struct ScriptedRecognitionEngine {
    events: Vec<RecognitionEvent>,
    aborts: AtomicUsize,
}

impl ScriptedRecognitionEngine {
    pub fn new(events: Vec<RecognitionEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            aborts: AtomicUsize::new(0),
        })
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

impl RecognitionEngine for ScriptedRecognitionEngine {
    fn start(&self) -> mpsc::Receiver<RecognitionEvent> {
        let (tx, rx) = mpsc::channel(8);
        let events = self.events.clone();

        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Synthesis engine that records utterance lifecycles instead of playing
pub struct RecordingSynthesisEngine {
    catalog: Vec<VoiceInfo>,
    duration: Duration,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    cancels: AtomicUsize,
}

impl RecordingSynthesisEngine {
    /// Engine whose utterances "play" for the given duration
    pub fn with_duration(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            catalog: vec![VoiceInfo::new("Google US English", "en-US")],
            duration,
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        })
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisEngine for RecordingSynthesisEngine {
    fn voices(&self) -> Vec<VoiceInfo> {
        self.catalog.clone()
    }

    async fn speak(&self, utterance: &Utterance) -> jiro_gateway::Result<()> {
        self.started.lock().unwrap().push(utterance.text.clone());
        tokio::time::sleep(self.duration).await;
        self.completed.lock().unwrap().push(utterance.text.clone());
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}
