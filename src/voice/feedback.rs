//! Spoken feedback to the user

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::playback::AudioPlayback;
use super::tts::TextToSpeech;
use crate::{Error, Result};

/// Ceiling on synthesis plus playback of one utterance
pub const SPEECH_CEILING: Duration = Duration::from_secs(30);

/// Speaks text to the user
#[async_trait]
pub trait SpeechFeedback: Send + Sync {
    /// Speak `text`, resolving once it has finished playing
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str) -> Result<()>;

    /// Apply a new speech rate multiplier
    async fn set_rate(&self, _rate: f32) {}
}

/// Cloud synthesis played through the default output device
pub struct SynthesizedFeedback {
    tts: Mutex<TextToSpeech>,
    ceiling: Duration,
}

impl SynthesizedFeedback {
    #[must_use]
    pub fn new(tts: TextToSpeech) -> Self {
        Self {
            tts: Mutex::new(tts),
            ceiling: SPEECH_CEILING,
        }
    }

    async fn synthesize_and_play(&self, text: &str) -> Result<()> {
        let audio = self.tts.lock().await.synthesize(text).await?;

        // Dropping this future (reset, timeout) silences the blocking player
        let stop = StopOnDrop::default();
        let flag = stop.flag();
        let played = tokio::task::spawn_blocking(move || AudioPlayback::play_mp3(&audio, &flag))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?;
        drop(stop);
        played
    }
}

/// Sets its flag when dropped
#[derive(Debug, Default)]
struct StopOnDrop(Arc<AtomicBool>);

impl StopOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl SpeechFeedback for SynthesizedFeedback {
    async fn speak(&self, text: &str) -> Result<()> {
        tokio::time::timeout(self.ceiling, self.synthesize_and_play(text))
            .await
            .map_err(|_| Error::Timeout("speech playback".to_string()))?
    }

    async fn set_rate(&self, rate: f32) {
        self.tts.lock().await.set_rate(rate);
    }
}

/// Feedback that only writes to the log, used when speech output is off
#[derive(Debug, Default)]
pub struct SilentFeedback;

#[async_trait]
impl SpeechFeedback for SilentFeedback {
    async fn speak(&self, text: &str) -> Result<()> {
        tracing::info!(text, "feedback");
        Ok(())
    }
}
