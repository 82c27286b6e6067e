//! Wake word detection
//!
//! The listener owns a long-lived microphone stream and feeds fixed-size
//! 16-bit frames to a [`KeywordSpotter`]. The default spotter uses local
//! energy segmentation and verifies candidate segments by transcription.

use std::rc::Rc;

use async_trait::async_trait;
use tokio::time::Instant;

use super::capture::{MicStream, Microphone, SAMPLE_RATE, samples_to_wav, to_pcm16};
use super::stt::{SpeechToText, Transcriber};
use crate::config::{Config, WakeEngine};
use crate::{Error, Result};

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to verify (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Longest segment worth verifying; wake phrases are short
const MAX_SEGMENT_SAMPLES: usize = 48000; // 3 seconds

/// Frame length fed to the phrase spotter
const PHRASE_FRAME_LENGTH: usize = 512;

/// A keyword engine fed fixed-length 16-bit frames
#[async_trait(?Send)]
pub trait KeywordSpotter {
    /// Samples per frame expected by [`process`](Self::process)
    fn frame_length(&self) -> usize;

    /// Process one frame, returning the index of the detected keyword
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails irrecoverably
    async fn process(&mut self, frame: &[i16]) -> Result<Option<usize>>;

    /// Drop any partially accumulated audio
    fn reset(&mut self);

    /// Update the phrase the engine listens for, where supported
    fn set_wake_phrase(&mut self, _phrase: &str) {}
}

/// State of the phrase segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Waiting for speech
    Idle,
    /// Detected potential speech, accumulating
    Listening,
}

/// Energy segmentation followed by transcript matching
pub struct PhraseSpotter {
    phrases: Vec<String>,
    transcriber: Box<dyn Transcriber>,
    state: SegmentState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl PhraseSpotter {
    /// Create a spotter for the given phrases
    #[must_use]
    pub fn new(phrases: &[String], transcriber: Box<dyn Transcriber>) -> Self {
        let phrases: Vec<String> = phrases.iter().map(|p| normalize(p)).collect();
        tracing::debug!(phrases = ?phrases, "phrase spotter initialized");

        Self {
            phrases,
            transcriber,
            state: SegmentState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Feed samples to the segmenter
    ///
    /// Returns true when a complete speech segment is ready for verification.
    pub fn push_samples(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmentState::Idle => {
                if is_speech {
                    self.state = SegmentState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
            }
            SegmentState::Listening => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES
                    && self.speech_buffer.len() > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(samples = self.speech_buffer.len(), "speech segment complete");
                    return true;
                }

                if self.silence_counter > SILENCE_SAMPLES * 2
                    || self.speech_buffer.len() > MAX_SEGMENT_SAMPLES
                {
                    tracing::trace!("segment discarded");
                    self.clear();
                }
            }
        }

        false
    }

    /// Check if transcribed text contains one of the phrases
    #[must_use]
    pub fn match_phrase(&self, transcript: &str) -> Option<usize> {
        let normalized = normalize(transcript);
        self.phrases
            .iter()
            .position(|phrase| !phrase.is_empty() && normalized.contains(phrase.as_str()))
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    fn clear(&mut self) {
        self.state = SegmentState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }
}

#[async_trait(?Send)]
impl KeywordSpotter for PhraseSpotter {
    fn frame_length(&self) -> usize {
        PHRASE_FRAME_LENGTH
    }

    async fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        let samples: Vec<f32> = frame.iter().map(|&s| f32::from(s) / 32768.0).collect();
        if !self.push_samples(&samples) {
            return Ok(None);
        }

        let segment = std::mem::take(&mut self.speech_buffer);
        self.clear();

        let wav = samples_to_wav(&segment, SAMPLE_RATE)?;
        let transcript = match self.transcriber.transcribe(&wav).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "wake phrase verification failed");
                return Ok(None);
            }
        };

        let detected = self.match_phrase(&transcript);
        match detected {
            Some(index) => tracing::info!(%transcript, index, "wake phrase detected"),
            None => tracing::debug!(%transcript, "segment did not contain wake phrase"),
        }
        Ok(detected)
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn set_wake_phrase(&mut self, phrase: &str) {
        self.phrases = vec![normalize(phrase)];
    }
}

/// Lowercase and strip punctuation so "Hey, Chat!" matches "hey chat"
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Build the keyword engine selected in the configuration
///
/// # Errors
///
/// Returns [`Error::WakeWord`] if the engine's credential or model asset is
/// missing, or the engine is not compiled in
pub fn spotter_from_config(config: &Config) -> Result<Box<dyn KeywordSpotter>> {
    match config.wake.engine {
        WakeEngine::Phrase => {
            let stt = SpeechToText::from_config(&config.stt)
                .map_err(|e| Error::WakeWord(format!("missing access key: {e}")))?;
            Ok(Box::new(PhraseSpotter::new(
                std::slice::from_ref(&config.settings.wake_phrase),
                Box::new(stt),
            )))
        }
        #[cfg(feature = "rustpotter")]
        WakeEngine::Rustpotter => {
            let spotter = super::rustpotter::RustpotterSpotter::from_config(&config.wake)?;
            Ok(Box::new(spotter))
        }
        #[cfg(not(feature = "rustpotter"))]
        WakeEngine::Rustpotter => Err(Error::WakeWord(
            "built without the rustpotter feature".to_string(),
        )),
    }
}

/// A wake word detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub keyword_index: usize,
}

/// Long-lived wake word listener
///
/// Holds one microphone stream while started. The stream is suspended while
/// a command is in flight and restarted afterwards.
pub struct WakeWordListener {
    microphone: Rc<dyn Microphone>,
    spotter: Box<dyn KeywordSpotter>,
    stream: Option<MicStream>,
    frame_buffer: Vec<i16>,
    last_activity: Instant,
}

impl WakeWordListener {
    #[must_use]
    pub fn new(microphone: Rc<dyn Microphone>, spotter: Box<dyn KeywordSpotter>) -> Self {
        Self {
            microphone,
            spotter,
            stream: None,
            frame_buffer: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    /// Acquire the microphone and begin listening
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        self.stream = Some(self.microphone.open()?);
        self.spotter.reset();
        self.frame_buffer.clear();
        self.last_activity = Instant::now();
        tracing::info!("wake word listener started");
        Ok(())
    }

    /// Release the microphone
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!("wake word listener stopped");
        }
        self.frame_buffer.clear();
    }

    /// Stop and start again with a fresh stream
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be reopened
    pub fn restart(&mut self) -> Result<()> {
        self.stop();
        self.start()
    }

    /// Pause audio delivery while keeping the stream attached
    ///
    /// # Errors
    ///
    /// Returns error if the backend refuses to pause
    pub fn suspend(&mut self) -> Result<()> {
        self.frame_buffer.clear();
        self.spotter.reset();
        match self.stream.as_mut() {
            Some(stream) => stream.suspend(),
            None => Ok(()),
        }
    }

    /// Whether a stream is held, suspended or not
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether the listener is receiving audio
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !s.is_suspended())
    }

    /// When audio last reached the spotter
    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Change the phrase listened for
    pub fn set_wake_phrase(&mut self, phrase: &str) {
        self.spotter.set_wake_phrase(phrase);
    }

    /// Wait for the next detection
    ///
    /// Cancel safe: a dropped call loses at most the frame being processed.
    ///
    /// # Errors
    ///
    /// Returns error if the listener is not started, the stream closed, or
    /// the keyword engine failed
    pub async fn next_trigger(&mut self) -> Result<Detection> {
        loop {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| Error::WakeWord("listener not started".to_string()))?;

            let chunk = stream
                .next_chunk()
                .await
                .ok_or_else(|| Error::Audio("microphone stream closed".to_string()))?;

            self.last_activity = Instant::now();
            self.frame_buffer.extend(to_pcm16(&chunk));

            let frame_length = self.spotter.frame_length().max(1);
            while self.frame_buffer.len() >= frame_length {
                let frame: Vec<i16> = self.frame_buffer.drain(..frame_length).collect();
                if let Some(keyword_index) = self.spotter.process(&frame).await? {
                    self.frame_buffer.clear();
                    return Ok(Detection { keyword_index });
                }
            }
        }
    }
}
