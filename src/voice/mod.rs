//! Voice processing
//!
//! Speech capture (microphone → transcript) and speech playback
//! (text → audio). Both sit behind engine traits so the rest of the
//! system treats missing audio support as a degraded mode, not an error.

pub mod capture;
pub mod playback;
pub mod recognition;
pub mod synthesis;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::AudioPlayback;
pub use recognition::{
    EndpointDetector, RecognitionEngine, RecognitionErrorKind, RecognitionEvent, SETTLE_DELAY,
    SpeechCapture, TranscriptionEngine,
};
pub use synthesis::{
    HttpSynthesisEngine, Script, SpeechPlayback, SynthesisEngine, Utterance, UtteranceParams,
    VoiceInfo, detect_script, select_voice,
};
