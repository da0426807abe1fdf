//! Speech recognition
//!
//! One listening session yields at most one finalized transcript.
//! [`SpeechCapture`] owns the session lifecycle and transcript;
//! [`RecognitionEngine`] is the capability seam, absent when the runtime
//! has no usable recognition backend. The bundled [`TranscriptionEngine`]
//! records from the microphone until an utterance endpoint and transcribes
//! through a hosted Whisper-compatible API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::VoiceConfig;
use crate::notify::NoticeSender;
use crate::voice::capture::{self, AudioCapture, SAMPLE_RATE};
use crate::{Error, Result};

/// Delay between aborting a previous session and starting a new one,
/// so the abort settles before the microphone is reopened
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// How often the recording loop drains the capture buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Events produced by one recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A finalized transcript
    Result { transcript: String },
    /// The session failed
    Error {
        kind: RecognitionErrorKind,
        message: String,
    },
    /// The session ended
    End,
}

/// Classified recognition failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Microphone permission denied or device unavailable
    NotAllowed,
    /// The session ended without usable speech
    NoSpeech,
    /// The session was aborted on purpose; never surfaced to the user
    Aborted,
    /// Anything else
    Other,
}

/// A speech recognition backend
///
/// Sessions are single-shot and final-results-only: implementations emit
/// at most one `Result`, then `End` (or an `Error` followed by `End`).
pub trait RecognitionEngine: Send + Sync {
    /// Begin one listening session; events arrive on the returned channel
    fn start(&self) -> mpsc::Receiver<RecognitionEvent>;

    /// Abort any session in progress
    fn abort(&self);
}

/// Shared session state between the wrapper and its consumer task
struct CaptureShared {
    transcript: Mutex<String>,
    listening: AtomicBool,
}

/// Owns listening sessions and the most recent finalized transcript
pub struct SpeechCapture {
    engine: Option<Arc<dyn RecognitionEngine>>,
    shared: Arc<CaptureShared>,
    session: Mutex<Option<JoinHandle<()>>>,
    notices: NoticeSender,
}

impl SpeechCapture {
    /// Create a capture wrapper; pass `None` when recognition is
    /// unavailable, in which case every operation is a no-op
    #[must_use]
    pub fn new(engine: Option<Arc<dyn RecognitionEngine>>, notices: NoticeSender) -> Self {
        if engine.is_none() {
            tracing::warn!("speech recognition not available");
        }

        Self {
            engine,
            shared: Arc::new(CaptureShared {
                transcript: Mutex::new(String::new()),
                listening: AtomicBool::new(false),
            }),
            session: Mutex::new(None),
            notices,
        }
    }

    /// Whether a recognition backend exists
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    /// Whether a listening session is active
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::SeqCst)
    }

    /// The most recent finalized transcript (empty if none)
    #[must_use]
    pub fn transcript(&self) -> String {
        self.shared
            .transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Clear the transcript
    pub fn reset(&self) {
        if let Ok(mut transcript) = self.shared.transcript.lock() {
            transcript.clear();
        }
    }

    /// Begin a listening session
    ///
    /// Any active session is aborted first; the new one starts after
    /// [`SETTLE_DELAY`] so the abort has completed.
    pub async fn start(&self) {
        let Some(engine) = self.engine.clone() else {
            self.notices
                .error("Voice recognition is not available on this system");
            return;
        };

        engine.abort();
        if let Ok(mut session) = self.session.lock() {
            if let Some(handle) = session.take() {
                handle.abort();
            }
        }

        tokio::time::sleep(SETTLE_DELAY).await;

        self.reset();
        self.shared.listening.store(true, Ordering::SeqCst);

        let mut events = engine.start();
        let shared = Arc::clone(&self.shared);
        let notices = self.notices.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    RecognitionEvent::Result { transcript } => {
                        if let Ok(mut current) = shared.transcript.lock() {
                            // Only the first finalized result of a session counts
                            if current.is_empty() {
                                *current = transcript;
                            }
                        }
                    }
                    RecognitionEvent::Error { kind, message } => {
                        tracing::warn!(?kind, %message, "recognition error");
                        match kind {
                            RecognitionErrorKind::NotAllowed => notices.error(
                                "Microphone access denied. Please enable microphone permissions.",
                            ),
                            RecognitionErrorKind::NoSpeech => {
                                notices.error("No speech detected. Please try again.");
                            }
                            RecognitionErrorKind::Aborted => {}
                            RecognitionErrorKind::Other => {
                                notices.error("Voice recognition error. Please try again.");
                            }
                        }
                        break;
                    }
                    RecognitionEvent::End => break,
                }
            }
            shared.listening.store(false, Ordering::SeqCst);
        });

        if let Ok(mut session) = self.session.lock() {
            *session = Some(handle);
        }

        self.notices.info("Listening... Speak now");
    }

    /// End the session early; a transcript already finalized survives
    pub fn stop(&self) {
        if let Some(engine) = &self.engine {
            engine.abort();
        }
        if let Ok(mut session) = self.session.lock() {
            if let Some(handle) = session.take() {
                handle.abort();
            }
        }
        self.shared.listening.store(false, Ordering::SeqCst);
    }
}

/// Minimum RMS energy to count a chunk as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum accumulated speech before an endpoint is accepted (0.3 s)
const MIN_SPEECH_SAMPLES: usize = 4_800;

/// Trailing silence that finalizes the utterance (0.5 s)
const SILENCE_SAMPLES: usize = 8_000;

/// Lead-in without any speech before the session gives up (8 s)
const NO_SPEECH_TIMEOUT_SAMPLES: usize = SAMPLE_RATE as usize * 8;

/// Hard cap on utterance length (12 s)
const MAX_UTTERANCE_SAMPLES: usize = SAMPLE_RATE as usize * 12;

/// Finds the end of a single spoken utterance in a live sample stream
///
/// Waits for speech energy, accumulates until enough trailing silence,
/// and reports timeout when no speech ever arrives.
#[derive(Debug, Default)]
pub struct EndpointDetector {
    audio: Vec<f32>,
    speech_samples: usize,
    silence_run: usize,
    lead_in: usize,
}

impl EndpointDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed captured samples; returns true when the utterance is complete
    pub fn feed(&mut self, samples: &[f32]) -> bool {
        let is_speech = rms_energy(samples) > ENERGY_THRESHOLD;

        if self.audio.is_empty() && !is_speech {
            self.lead_in += samples.len();
            return false;
        }

        self.audio.extend_from_slice(samples);
        if is_speech {
            self.speech_samples += samples.len();
            self.silence_run = 0;
        } else {
            self.silence_run += samples.len();
        }

        if self.silence_run > SILENCE_SAMPLES && self.speech_samples > MIN_SPEECH_SAMPLES {
            return true;
        }
        if self.audio.len() > MAX_UTTERANCE_SAMPLES {
            return true;
        }

        // A short blip followed by extended silence is noise, not an utterance
        if self.silence_run > SILENCE_SAMPLES * 2 && self.speech_samples <= MIN_SPEECH_SAMPLES {
            self.lead_in += self.audio.len();
            self.audio.clear();
            self.speech_samples = 0;
            self.silence_run = 0;
        }

        false
    }

    /// Whether any speech has been heard yet
    #[must_use]
    pub fn heard_speech(&self) -> bool {
        !self.audio.is_empty()
    }

    /// Whether the lead-in expired without speech
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.audio.is_empty() && self.lead_in > NO_SPEECH_TIMEOUT_SAMPLES
    }

    /// Take the accumulated utterance audio
    pub fn take_audio(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.audio)
    }
}

/// RMS energy of a sample chunk
#[allow(clippy::cast_precision_loss)]
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Outcome of the blocking recording phase
enum RecordOutcome {
    Complete(Vec<f32>),
    NoSpeech,
    Aborted,
}

/// Response from the transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Recognition engine backed by the microphone and a hosted
/// Whisper-compatible transcription API
#[derive(Clone)]
pub struct TranscriptionEngine {
    client: reqwest::Client,
    url: String,
    model: String,
    language: String,
    credential: SecretString,
    generation: Arc<AtomicU64>,
}

impl TranscriptionEngine {
    /// Create an engine for the configured transcription endpoint
    #[must_use]
    pub fn new(credential: SecretString, config: &VoiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.stt_url.clone(),
            model: config.stt_model.clone(),
            language: config.stt_language.clone(),
            credential,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Transcribe WAV audio
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API rejects it.
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Recognition(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(&self.url)
            .header(
                "Authorization",
                format!("Bearer {}", self.credential.expose_secret()),
            )
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Recognition(format!(
                "transcription API error {status}"
            )));
        }

        let result: TranscriptionResponse = response.json().await?;
        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }

    /// Run one session: record, transcribe, emit events
    async fn run_session(self, tx: mpsc::Sender<RecognitionEvent>, session_gen: u64) {
        let session = Uuid::new_v4();
        tracing::debug!(%session, "recognition session started");

        let generation = Arc::clone(&self.generation);
        let recorded =
            tokio::task::spawn_blocking(move || record_utterance(&generation, session_gen)).await;

        let event = match recorded {
            Ok(Ok(RecordOutcome::Complete(samples))) => self.transcribe_samples(samples).await,
            Ok(Ok(RecordOutcome::NoSpeech)) => RecognitionEvent::Error {
                kind: RecognitionErrorKind::NoSpeech,
                message: "no speech detected".to_string(),
            },
            Ok(Ok(RecordOutcome::Aborted)) => RecognitionEvent::Error {
                kind: RecognitionErrorKind::Aborted,
                message: "session aborted".to_string(),
            },
            Ok(Err(e)) => {
                // Device failures present as permission problems to the user
                let kind = match &e {
                    Error::Audio(_) => RecognitionErrorKind::NotAllowed,
                    _ => RecognitionErrorKind::Other,
                };
                RecognitionEvent::Error {
                    kind,
                    message: e.to_string(),
                }
            }
            Err(e) => RecognitionEvent::Error {
                kind: RecognitionErrorKind::Other,
                message: e.to_string(),
            },
        };

        let _ = tx.send(event).await;
        let _ = tx.send(RecognitionEvent::End).await;
        tracing::debug!(%session, "recognition session ended");
    }

    /// Encode and transcribe recorded samples into a session event
    async fn transcribe_samples(&self, samples: Vec<f32>) -> RecognitionEvent {
        let wav = match capture::samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                return RecognitionEvent::Error {
                    kind: RecognitionErrorKind::Other,
                    message: e.to_string(),
                };
            }
        };

        match self.transcribe(wav).await {
            Ok(text) if text.trim().is_empty() => RecognitionEvent::Error {
                kind: RecognitionErrorKind::NoSpeech,
                message: "empty transcript".to_string(),
            },
            Ok(text) => RecognitionEvent::Result { transcript: text },
            Err(e) => RecognitionEvent::Error {
                kind: RecognitionErrorKind::Other,
                message: e.to_string(),
            },
        }
    }
}

impl RecognitionEngine for TranscriptionEngine {
    fn start(&self) -> mpsc::Receiver<RecognitionEvent> {
        let (tx, rx) = mpsc::channel(8);
        let session_gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let engine = self.clone();

        tokio::spawn(async move {
            engine.run_session(tx, session_gen).await;
        });

        rx
    }

    fn abort(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Record one utterance from the microphone (blocking)
///
/// Polls the capture buffer until the endpoint detector finalizes the
/// utterance, the lead-in times out, or the session generation moves on.
fn record_utterance(generation: &AtomicU64, session_gen: u64) -> Result<RecordOutcome> {
    let mut mic = AudioCapture::new()?;
    mic.start()?;

    let mut detector = EndpointDetector::new();
    let outcome = loop {
        std::thread::sleep(POLL_INTERVAL);

        if generation.load(Ordering::SeqCst) != session_gen {
            break RecordOutcome::Aborted;
        }

        let chunk = mic.take_buffer();
        if detector.feed(&chunk) {
            break RecordOutcome::Complete(detector.take_audio());
        }
        if detector.timed_out() {
            break RecordOutcome::NoSpeech;
        }
    };

    mic.stop();
    Ok(outcome)
}
