//! Speech synthesis
//!
//! [`SpeechPlayback`] vocalizes response text with a strict
//! last-write-wins policy: a new utterance always interrupts the current
//! one, nothing is queued. Voice selection is recomputed per utterance
//! from the engine's advertised catalog based on the script of the text.
//! [`SynthesisEngine`] is the capability seam, absent when the runtime
//! has no usable synthesis backend.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::VoiceConfig;
use crate::notify::NoticeSender;
use crate::voice::playback::{self, AudioPlayback};
use crate::{Error, Result};

/// Voice vendors preferred when several voices match a language
const PREFERRED_VENDORS: [&str; 2] = ["Google", "Microsoft"];

/// Script class of an utterance, detected from its characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Latin,
    Bengali,
    Devanagari,
}

/// Detect the script class of a text
///
/// Bengali wins over Devanagari when both are present.
#[must_use]
pub fn detect_script(text: &str) -> Script {
    if text.chars().any(|c| ('\u{0980}'..='\u{09FF}').contains(&c)) {
        Script::Bengali
    } else if text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c)) {
        Script::Devanagari
    } else {
        Script::Latin
    }
}

/// One entry of a synthesis voice catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Voice name as advertised by the engine
    pub name: String,

    /// BCP-47 language tag (e.g. "en-US", "hi-IN", "bn-IN")
    pub lang: String,
}

impl VoiceInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

fn is_preferred_vendor(name: &str) -> bool {
    PREFERRED_VENDORS.iter().any(|vendor| name.contains(vendor))
}

/// Pick the voice for a text from the available catalog
///
/// Deterministic per script class; returns `None` when nothing matches,
/// in which case the engine default is used.
#[must_use]
pub fn select_voice(voices: &[VoiceInfo], text: &str) -> Option<VoiceInfo> {
    let pick = match detect_script(text) {
        Script::Bengali => voices
            .iter()
            .find(|v| v.lang.contains("bn") || v.name.contains("Bengali"))
            .or_else(|| {
                voices
                    .iter()
                    .find(|v| v.lang.contains("hi") && is_preferred_vendor(&v.name))
            }),
        Script::Devanagari => voices
            .iter()
            .find(|v| v.lang.contains("hi") || v.name.contains("Hindi"))
            .or_else(|| voices.iter().find(|v| is_preferred_vendor(&v.name))),
        Script::Latin => voices
            .iter()
            .find(|v| v.lang.contains("en") && is_preferred_vendor(&v.name))
            .or_else(|| voices.iter().find(|v| v.lang.contains("en"))),
    };

    pick.cloned()
}

/// Fixed synthesis parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtteranceParams {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for UtteranceParams {
    fn default() -> Self {
        Self {
            rate: 0.95,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// One utterance handed to a synthesis engine
#[derive(Debug, Clone)]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
    /// Selected voice; `None` means the engine default
    pub voice: Option<VoiceInfo>,
    pub params: UtteranceParams,
}

/// A speech synthesis backend
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Voices currently available
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Synthesize and play one utterance to completion
    ///
    /// Starting a new utterance or calling [`cancel`](Self::cancel)
    /// interrupts any utterance in progress.
    async fn speak(&self, utterance: &Utterance) -> Result<()>;

    /// Interrupt any utterance in progress
    fn cancel(&self);
}

/// Owns utterance playback and the speaking-active flag
pub struct SpeechPlayback {
    engine: Option<Arc<dyn SynthesisEngine>>,
    speaking: Arc<AtomicBool>,
    current: Mutex<Option<JoinHandle<()>>>,
    notices: NoticeSender,
}

impl SpeechPlayback {
    /// Create a playback wrapper; pass `None` when synthesis is
    /// unavailable, in which case every operation is a no-op
    #[must_use]
    pub fn new(engine: Option<Arc<dyn SynthesisEngine>>, notices: NoticeSender) -> Self {
        if engine.is_none() {
            tracing::warn!("speech synthesis not available");
        }

        Self {
            engine,
            speaking: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
            notices,
        }
    }

    /// Whether a synthesis backend exists
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    /// Whether an utterance is currently playing
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Vocalize a text, interrupting any utterance in progress
    pub fn speak(&self, text: &str) {
        let Some(engine) = self.engine.clone() else {
            self.notices
                .error("Text-to-speech is not available on this system");
            return;
        };

        // Last-write-wins: whatever is playing dies now
        engine.cancel();
        if let Ok(mut current) = self.current.lock() {
            if let Some(handle) = current.take() {
                handle.abort();
            }
        }
        self.speaking.store(false, Ordering::SeqCst);

        let utterance = Utterance {
            id: Uuid::new_v4(),
            text: text.to_string(),
            voice: select_voice(&engine.voices(), text),
            params: UtteranceParams::default(),
        };

        tracing::debug!(
            id = %utterance.id,
            voice = utterance.voice.as_ref().map_or("default", |v| v.name.as_str()),
            chars = utterance.text.len(),
            "speaking"
        );

        let speaking = Arc::clone(&self.speaking);
        let notices = self.notices.clone();

        let handle = tokio::spawn(async move {
            speaking.store(true, Ordering::SeqCst);
            if let Err(e) = engine.speak(&utterance).await {
                tracing::warn!(error = %e, "synthesis failed");
                notices.error("Failed to speak text");
            }
            speaking.store(false, Ordering::SeqCst);
        });

        if let Ok(mut current) = self.current.lock() {
            *current = Some(handle);
        }
    }

    /// Cancel playback
    pub fn stop(&self) {
        if let Some(engine) = &self.engine {
            engine.cancel();
        }
        if let Ok(mut current) = self.current.lock() {
            if let Some(handle) = current.take() {
                handle.abort();
            }
        }
        self.speaking.store(false, Ordering::SeqCst);
    }
}

/// TTS request body (default MP3 response format)
#[derive(serde::Serialize)]
struct SynthesisRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

/// Synthesis engine backed by a hosted TTS API and the default output
/// device
///
/// The utterance rate maps to the API speed parameter and the volume to a
/// sample gain; pitch is carried for engines that can apply it.
pub struct HttpSynthesisEngine {
    client: reqwest::Client,
    url: String,
    model: String,
    default_voice: String,
    credential: SecretString,
    catalog: Vec<VoiceInfo>,
    generation: Arc<AtomicU64>,
}

impl HttpSynthesisEngine {
    /// Create an engine for the configured synthesis endpoint
    #[must_use]
    pub fn new(credential: SecretString, config: &VoiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.tts_url.clone(),
            model: config.tts_model.clone(),
            default_voice: config.tts_default_voice.clone(),
            credential,
            catalog: builtin_catalog(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Synthesize one text to MP3 bytes
    async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Vec<u8>> {
        let request = SynthesisRequest {
            model: &self.model,
            input: text,
            voice,
            speed,
        };

        let response = self
            .client
            .post(&self.url)
            .header(
                "Authorization",
                format!("Bearer {}", self.credential.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "synthesis API error");
            return Err(Error::Synthesis(format!("synthesis API error {status}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SynthesisEngine for HttpSynthesisEngine {
    fn voices(&self) -> Vec<VoiceInfo> {
        self.catalog.clone()
    }

    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        // A new utterance invalidates whatever was playing
        let session = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let voice = utterance
            .voice
            .as_ref()
            .map_or(self.default_voice.as_str(), |v| v.name.as_str());

        let audio = self
            .synthesize(&utterance.text, voice, utterance.params.rate)
            .await?;

        if self.generation.load(Ordering::SeqCst) != session {
            // Cancelled while the API call was in flight
            return Ok(());
        }

        let volume = utterance.params.volume;
        let generation = Arc::clone(&self.generation);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut samples = playback::decode_mp3(&audio)?;
            if (volume - 1.0).abs() > f32::EPSILON {
                for sample in &mut samples {
                    *sample *= volume;
                }
            }

            let speaker = AudioPlayback::new()?;
            speaker.play(samples, &|| {
                generation.load(Ordering::SeqCst) != session
            })
        })
        .await
        .map_err(|e| Error::Synthesis(e.to_string()))??;

        Ok(())
    }

    fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Voices the hosted TTS API serves; it exposes no catalog endpoint, so
/// the known set is advertised with its English locale
fn builtin_catalog() -> Vec<VoiceInfo> {
    ["alloy", "echo", "fable", "onyx", "nova", "shimmer"]
        .into_iter()
        .map(|name| VoiceInfo::new(name, "en-US"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_detection_by_unicode_block() {
        assert_eq!(detect_script("hello there"), Script::Latin);
        assert_eq!(detect_script("আপনি কেমন আছেন"), Script::Bengali);
        assert_eq!(detect_script("आप कैसे हैं"), Script::Devanagari);
        // Bengali wins when both scripts are present
        assert_eq!(detect_script("নমস্কার नमस्ते"), Script::Bengali);
    }

    #[test]
    fn params_default_to_fixed_values() {
        let params = UtteranceParams::default();
        assert!((params.rate - 0.95).abs() < f32::EPSILON);
        assert!((params.pitch - 1.0).abs() < f32::EPSILON);
        assert!((params.volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn bengali_prefers_bengali_voice() {
        let voices = vec![
            VoiceInfo::new("Google US English", "en-US"),
            VoiceInfo::new("Google বাংলা", "bn-IN"),
            VoiceInfo::new("Google हिन्दी", "hi-IN"),
        ];

        let picked = select_voice(&voices, "আপনার নাম কি").unwrap();
        assert_eq!(picked.lang, "bn-IN");
    }

    #[test]
    fn bengali_falls_back_to_preferred_hindi() {
        let voices = vec![
            VoiceInfo::new("Google US English", "en-US"),
            VoiceInfo::new("Microsoft Swara - Hindi", "hi-IN"),
        ];

        let picked = select_voice(&voices, "ধন্যবাদ").unwrap();
        assert_eq!(picked.lang, "hi-IN");
    }

    #[test]
    fn devanagari_prefers_hindi_voice() {
        let voices = vec![
            VoiceInfo::new("Google US English", "en-US"),
            VoiceInfo::new("Lekha", "hi-IN"),
        ];

        let picked = select_voice(&voices, "नमस्ते").unwrap();
        assert_eq!(picked.name, "Lekha");
    }

    #[test]
    fn latin_prefers_vendor_english_voice() {
        let voices = vec![
            VoiceInfo::new("Daniel", "en-GB"),
            VoiceInfo::new("Google US English", "en-US"),
        ];

        let picked = select_voice(&voices, "hello").unwrap();
        assert_eq!(picked.name, "Google US English");
    }

    #[test]
    fn latin_never_selects_indic_voices() {
        let voices = vec![
            VoiceInfo::new("Google বাংলা", "bn-IN"),
            VoiceInfo::new("Google हिन्दी", "hi-IN"),
        ];

        assert_eq!(select_voice(&voices, "plain english text"), None);
    }

    #[test]
    fn empty_catalog_selects_nothing() {
        assert_eq!(select_voice(&[], "hello"), None);
        assert_eq!(select_voice(&[], "নমস্কার"), None);
    }
}
