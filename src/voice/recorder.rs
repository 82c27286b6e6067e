//! Voice-activity-terminated recording sessions

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use super::capture::{MicStream, Microphone, samples_to_wav};
use super::endpoint::{self, EndpointDecision, StopReason};
use super::spectrum::{FFT_SIZE, SpectrumAnalyzer};
use super::vad::{self, RecordingMode, VadFrame, VadState};
use crate::Result;

/// Interval between endpoint evaluations
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A finished recording
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// 16-bit mono WAV
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    pub duration: Duration,
    pub mode: RecordingMode,
    /// Whether any tick was classified as speech
    pub had_speech: bool,
    pub stop_reason: StopReason,
}

/// One transient microphone stream recording until the utterance ends
///
/// Dropping the session at any point releases the microphone.
pub struct RecordingSession {
    stream: MicStream,
    mode: RecordingMode,
}

impl RecordingSession {
    /// Acquire the microphone for a new session
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened
    pub fn open(microphone: &dyn Microphone, mode: RecordingMode) -> Result<Self> {
        let stream = microphone.open()?;
        tracing::debug!(?mode, "recording session opened");
        Ok(Self { stream, mode })
    }

    /// Record until the endpoint policy or the ceiling timer ends the session
    ///
    /// # Errors
    ///
    /// Returns error if the recording cannot be encoded
    pub async fn run(mut self) -> Result<AudioClip> {
        let thresholds = self.mode.thresholds();
        let sample_rate = self.stream.sample_rate();
        let started = Instant::now();

        let mut analyzer = SpectrumAnalyzer::new(sample_rate);
        let bin_hz = analyzer.bin_hz();
        let mut state = VadState::new();
        let mut samples: Vec<f32> = Vec::new();

        let ceiling = tokio::time::sleep(thresholds.max_recording_time);
        tokio::pin!(ceiling);

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let stop_reason = loop {
            tokio::select! {
                biased;

                () = &mut ceiling => break StopReason::CeilingTimer,

                _ = ticker.tick() => {
                    samples.extend(self.stream.drain());
                    let now = started.elapsed();

                    if samples.len() >= FFT_SIZE {
                        let window = &samples[samples.len() - FFT_SIZE..];
                        let spectrum = analyzer.analyze(window);
                        let frame = VadFrame { spectrum, samples: window, bin_hz };
                        let decision = vad::analyze(&frame, &mut state, thresholds);
                        state.observe(decision.is_speech, now, thresholds);

                        tracing::trace!(
                            energy = decision.energy,
                            threshold = decision.threshold,
                            confidence = decision.confidence,
                            speech = decision.is_speech,
                            "vad tick"
                        );
                    }

                    if let EndpointDecision::Stop(reason) = endpoint::evaluate(&state, thresholds, now) {
                        break reason;
                    }
                }
            }
        };

        samples.extend(self.stream.drain());
        let duration = started.elapsed();
        drop(self.stream);

        tracing::info!(
            mode = ?self.mode,
            duration_ms = duration.as_millis(),
            had_speech = state.speech_started(),
            reason = %stop_reason,
            "recording finished"
        );

        Ok(AudioClip {
            wav: samples_to_wav(&samples, sample_rate)?,
            sample_rate,
            duration,
            mode: self.mode,
            had_speech: state.speech_started(),
            stop_reason,
        })
    }
}

/// Open a session and record one utterance
///
/// # Errors
///
/// Returns error if the microphone cannot be opened or the clip encoded
pub async fn record(microphone: &dyn Microphone, mode: RecordingMode) -> Result<AudioClip> {
    RecordingSession::open(microphone, mode)?.run().await
}
