//! Configuration management for the Jiro gateway
//!
//! Defaults cover a working local setup; an optional `jiro.toml` in the
//! platform config directory overlays them, and a handful of env vars
//! override both. The completion API credential is deliberately NOT part
//! of [`Config`]: it is resolved from the process environment at request
//! time so a rotated key takes effect without a restart.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;

use crate::{Error, Result};

/// Environment variable holding the completion API credential
pub const CREDENTIAL_VAR: &str = "OPENAI_API_KEY";

/// Jiro gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Assistant persona (name, creator, greeting)
    pub persona: PersonaConfig,

    /// Relay server configuration
    pub relay: RelayConfig,

    /// Voice input/output configuration
    pub voice: VoiceConfig,
}

/// Assistant persona data injected into the system prompt and greeting
///
/// These are product copy, not technical contract, so they are plain
/// configuration with the shipped values as defaults.
#[derive(Debug, Clone)]
pub struct PersonaConfig {
    /// Assistant name
    pub name: String,

    /// Creator acknowledged by the identification rule in the prompt
    pub creator: String,

    /// Greeting seeded as the first assistant message of every session
    pub greeting: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "Jiro".to_string(),
            creator: "Sanket".to_string(),
            greeting: "Hello. Jiro AI assistant online and ready to assist you. \
                       How may I help you today?"
                .to_string(),
        }
    }
}

/// Relay server and completion API configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Port the relay listens on
    pub port: u16,

    /// Chat-completion endpoint URL
    pub completion_url: String,

    /// Completion model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Response token cap
    pub max_tokens: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            completion_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Start sessions with voice output enabled
    pub output_enabled: bool,

    /// Transcription endpoint URL
    pub stt_url: String,

    /// Transcription model (e.g. "whisper-1")
    pub stt_model: String,

    /// Recognition language tag
    pub stt_language: String,

    /// Synthesis endpoint URL
    pub tts_url: String,

    /// Synthesis model (e.g. "tts-1")
    pub tts_model: String,

    /// Fallback voice when no catalog entry matches the utterance script
    pub tts_default_voice: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            output_enabled: true,
            stt_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            stt_model: "whisper-1".to_string(),
            stt_language: "en".to_string(),
            tts_url: "https://api.openai.com/v1/audio/speech".to_string(),
            tts_model: "tts-1".to_string(),
            tts_default_voice: "alloy".to_string(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the optional TOML overlay
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self {
            persona: PersonaConfig::default(),
            relay: RelayConfig::default(),
            voice: VoiceConfig::default(),
        };

        if let Some(path) = config_file_path() {
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                let file: ConfigFile = toml::from_str(&raw)?;
                tracing::debug!(path = %path.display(), "loaded config file");
                config.apply_file(file);
            }
        }

        Ok(config)
    }

    /// Overlay values from a parsed config file
    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(name) = file.persona.name {
            self.persona.name = name;
        }
        if let Some(creator) = file.persona.creator {
            self.persona.creator = creator;
        }
        if let Some(greeting) = file.persona.greeting {
            self.persona.greeting = greeting;
        }

        if let Some(port) = file.relay.port {
            self.relay.port = port;
        }
        if let Some(url) = file.relay.completion_url {
            self.relay.completion_url = url;
        }
        if let Some(model) = file.relay.model {
            self.relay.model = model;
        }

        if let Some(enabled) = file.voice.output_enabled {
            self.voice.output_enabled = enabled;
        }
        if let Some(model) = file.voice.stt_model {
            self.voice.stt_model = model;
        }
        if let Some(language) = file.voice.stt_language {
            self.voice.stt_language = language;
        }
        if let Some(model) = file.voice.tts_model {
            self.voice.tts_model = model;
        }
        if let Some(voice) = file.voice.tts_default_voice {
            self.voice.tts_default_voice = voice;
        }
    }
}

/// Resolve the completion API credential from the process environment
///
/// Empty values count as unset.
#[must_use]
pub fn api_credential() -> Option<SecretString> {
    credential_from(CREDENTIAL_VAR)
}

/// Resolve a credential from a named environment variable
#[must_use]
pub fn credential_from(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

/// Require the completion API credential, failing with a config error
///
/// # Errors
///
/// Returns `Error::Config` when the variable is unset or empty.
pub fn require_api_credential() -> Result<SecretString> {
    api_credential().ok_or_else(|| Error::Config(format!("{CREDENTIAL_VAR} is not configured")))
}

/// Path of the optional TOML config file
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "jiro", "jiro")
        .map(|dirs| dirs.config_dir().join("jiro.toml"))
}

/// Top-level TOML configuration file schema
///
/// All fields are optional, the file is a partial overlay on top of
/// defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    persona: PersonaFileConfig,

    #[serde(default)]
    relay: RelayFileConfig,

    #[serde(default)]
    voice: VoiceFileConfig,
}

#[derive(Debug, Default, Deserialize)]
struct PersonaFileConfig {
    name: Option<String>,
    creator: Option<String>,
    greeting: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayFileConfig {
    port: Option<u16>,
    completion_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VoiceFileConfig {
    output_enabled: Option<bool>,
    stt_model: Option<String>,
    stt_language: Option<String>,
    tts_model: Option<String>,
    tts_default_voice: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_persona() {
        let persona = PersonaConfig::default();
        assert_eq!(persona.name, "Jiro");
        assert_eq!(persona.creator, "Sanket");
        assert!(persona.greeting.starts_with("Hello."));
    }

    #[test]
    fn file_overlay_is_partial() {
        let mut config = Config {
            persona: PersonaConfig::default(),
            relay: RelayConfig::default(),
            voice: VoiceConfig::default(),
        };

        let file: ConfigFile = toml::from_str(
            r#"
            [relay]
            port = 9000

            [voice]
            output_enabled = false
            "#,
        )
        .unwrap();
        config.apply_file(file);

        assert_eq!(config.relay.port, 9000);
        assert!(!config.voice.output_enabled);
        // Untouched fields keep their defaults
        assert_eq!(config.relay.model, "gpt-3.5-turbo");
        assert_eq!(config.persona.name, "Jiro");
    }

    #[test]
    fn missing_credential_var_is_none() {
        assert!(credential_from("JIRO_TEST_UNSET_CREDENTIAL").is_none());
    }
}
