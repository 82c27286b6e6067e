//! Voice processing module
//!
//! Handles audio capture, wake word detection, voice activity detection,
//! endpointed recording, and spoken feedback.

mod capture;
pub mod endpoint;
mod feedback;
mod playback;
mod recorder;
#[cfg(feature = "rustpotter")]
mod rustpotter;
pub mod spectrum;
mod stt;
mod tts;
pub mod vad;
mod wake_word;

pub use capture::{
    CpalMicrophone, MicStream, Microphone, SAMPLE_RATE, StreamControl, samples_to_wav, to_pcm16,
};
pub use endpoint::{EndpointDecision, StopReason};
pub use feedback::{SPEECH_CEILING, SilentFeedback, SpeechFeedback, SynthesizedFeedback};
pub use playback::{AudioPlayback, DecodedAudio, decode_mp3};
pub use recorder::{AudioClip, POLL_INTERVAL, RecordingSession, record};
#[cfg(feature = "rustpotter")]
pub use rustpotter::RustpotterSpotter;
pub use spectrum::SpectrumAnalyzer;
pub use stt::{SpeechToText, Transcriber};
pub use tts::TextToSpeech;
pub use vad::{EndpointThresholds, RecordingMode, VadDecision, VadFrame, VadState};
pub use wake_word::{
    Detection, KeywordSpotter, PhraseSpotter, SegmentState, WakeWordListener, spotter_from_config,
};
