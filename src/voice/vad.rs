//! Per-tick voice activity detection
//!
//! A frame counts as speech when enough of three independent cues agree:
//! total spectral energy above an adaptive threshold, energy concentrated in
//! the fundamental voice band, and a zero-crossing rate typical of voiced
//! audio. Fresh commands need two cues, confirmation replies only one.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Energy samples kept for the noise baseline
const ENERGY_HISTORY_LEN: usize = 20;

/// Leading samples averaged into the noise baseline
const BASELINE_SAMPLES: usize = 10;

/// What a recording session is listening for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    /// A full command after activation
    FreshCommand,
    /// A short answer to a pending confirmation
    ConfirmationReply,
}

impl RecordingMode {
    /// Thresholds tuned for this mode
    #[must_use]
    pub const fn thresholds(self) -> &'static EndpointThresholds {
        match self {
            Self::FreshCommand => &EndpointThresholds::FRESH_COMMAND,
            Self::ConfirmationReply => &EndpointThresholds::CONFIRMATION_REPLY,
        }
    }
}

/// Detection and endpointing parameters for one recording mode
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointThresholds {
    /// Lower bound of the speech threshold (0-255 energy scale)
    pub initial_silence_threshold: f32,
    /// Noise baseline multiplier
    pub speech_threshold_multiplier: f32,
    /// Absolute minimum energy for speech
    pub min_speech_energy: f32,
    /// Scale applied to the threshold for the total energy cue
    pub energy_scale: f32,
    /// Fraction of the threshold the voice band must reach
    pub voice_band_fraction: f32,
    /// Fundamental voice band in Hz
    pub voice_band_hz: (f32, f32),
    /// Accepted zero-crossing rate (crossings per sample)
    pub zcr_range: (f32, f32),
    /// Cues required for a speech frame
    pub min_conditions: u8,
    /// Continuous silence that ends the recording
    pub silence_duration: Duration,
    /// Pause after speech that is not yet counted as silence
    pub trailing_silence_grace: Duration,
    /// Speech required before silence can end the recording
    pub min_speech_duration: Duration,
    /// Hard cap on recording length
    pub max_recording_time: Duration,
    /// Initial period in which the recording never stops
    pub startup_grace: Duration,
    /// Consecutive silent ticks that end the recording
    pub silence_frames_to_stop: u32,
}

impl EndpointThresholds {
    pub const FRESH_COMMAND: Self = Self {
        initial_silence_threshold: 25.0,
        speech_threshold_multiplier: 1.8,
        min_speech_energy: 30.0,
        energy_scale: 1.0,
        voice_band_fraction: 0.6,
        voice_band_hz: (85.0, 255.0),
        zcr_range: (0.01, 0.30),
        min_conditions: 2,
        silence_duration: Duration::from_millis(1500),
        trailing_silence_grace: Duration::from_millis(300),
        min_speech_duration: Duration::from_millis(500),
        max_recording_time: Duration::from_secs(15),
        startup_grace: Duration::from_millis(500),
        silence_frames_to_stop: 30,
    };

    pub const CONFIRMATION_REPLY: Self = Self {
        initial_silence_threshold: 20.0,
        speech_threshold_multiplier: 1.5,
        min_speech_energy: 22.0,
        energy_scale: 0.8,
        voice_band_fraction: 0.5,
        voice_band_hz: (85.0, 255.0),
        zcr_range: (0.005, 0.45),
        min_conditions: 1,
        silence_duration: Duration::from_millis(1000),
        trailing_silence_grace: Duration::from_millis(200),
        min_speech_duration: Duration::from_millis(200),
        max_recording_time: Duration::from_secs(6),
        startup_grace: Duration::from_millis(300),
        silence_frames_to_stop: 20,
    };
}

/// One analysis tick: the byte-scaled spectrum and the raw samples behind it
#[derive(Debug, Clone, Copy)]
pub struct VadFrame<'a> {
    pub spectrum: &'a [f32],
    pub samples: &'a [f32],
    pub bin_hz: f32,
}

/// Result of analysing one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadDecision {
    pub energy: f32,
    pub voice_band_energy: f32,
    pub zero_crossing_rate: f32,
    pub threshold: f32,
    pub is_speech: bool,
    /// 0-100
    pub confidence: f32,
}

/// Mutable detection state for one recording session
///
/// Offsets are measured from the start of the session.
#[derive(Debug, Clone, Default)]
pub struct VadState {
    energy_history: VecDeque<f32>,
    baseline_noise: f32,
    speech_started: bool,
    speech_started_at: Option<Duration>,
    last_speech_at: Option<Duration>,
    silence_started_at: Option<Duration>,
    silence_frames: u32,
}

impl VadState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick's decision into the session timeline
    pub fn observe(&mut self, is_speech: bool, at: Duration, thresholds: &EndpointThresholds) {
        if is_speech {
            if !self.speech_started {
                self.speech_started = true;
                self.speech_started_at = Some(at);
                tracing::debug!(at_ms = at.as_millis(), "speech started");
            }
            self.last_speech_at = Some(at);
            self.silence_started_at = None;
            self.silence_frames = 0;
            return;
        }

        if !self.speech_started {
            return;
        }

        self.silence_started_at.get_or_insert(at);

        let in_grace = self
            .last_speech_at
            .is_some_and(|last| at.saturating_sub(last) < thresholds.trailing_silence_grace);
        if !in_grace {
            self.silence_frames += 1;
        }
    }

    #[must_use]
    pub const fn speech_started(&self) -> bool {
        self.speech_started
    }

    #[must_use]
    pub const fn speech_started_at(&self) -> Option<Duration> {
        self.speech_started_at
    }

    #[must_use]
    pub const fn last_speech_at(&self) -> Option<Duration> {
        self.last_speech_at
    }

    #[must_use]
    pub const fn silence_started_at(&self) -> Option<Duration> {
        self.silence_started_at
    }

    #[must_use]
    pub const fn silence_frames(&self) -> u32 {
        self.silence_frames
    }

    #[must_use]
    pub const fn baseline_noise(&self) -> f32 {
        self.baseline_noise
    }

    /// Length of detected speech so far
    #[must_use]
    pub fn speech_duration(&self) -> Duration {
        match (self.speech_started_at, self.last_speech_at) {
            (Some(start), Some(last)) => last.saturating_sub(start),
            _ => Duration::ZERO,
        }
    }
}

/// Classify one frame and update the energy baseline
pub fn analyze(
    frame: &VadFrame<'_>,
    state: &mut VadState,
    thresholds: &EndpointThresholds,
) -> VadDecision {
    let energy = mean(frame.spectrum);
    let voice_band_energy = voice_band_energy(frame, thresholds.voice_band_hz);
    let zero_crossing_rate = zero_crossing_rate(frame.samples);

    state.energy_history.push_back(energy);
    if state.energy_history.len() > ENERGY_HISTORY_LEN {
        state.energy_history.pop_front();
    }

    // Baseline freezes once speech has been heard
    if !state.speech_started {
        let leading = state.energy_history.len().min(BASELINE_SAMPLES);
        let sum: f32 = state.energy_history.iter().take(leading).sum();
        #[allow(clippy::cast_precision_loss)]
        let baseline = sum / leading as f32;
        state.baseline_noise = baseline;
    }

    let threshold = thresholds
        .initial_silence_threshold
        .max(state.baseline_noise * thresholds.speech_threshold_multiplier)
        .max(thresholds.min_speech_energy);

    let cues = [
        energy > threshold * thresholds.energy_scale,
        voice_band_energy > threshold * thresholds.voice_band_fraction,
        (thresholds.zcr_range.0..=thresholds.zcr_range.1).contains(&zero_crossing_rate),
    ];
    let met = u8::try_from(cues.iter().filter(|&&c| c).count()).unwrap_or(u8::MAX);

    VadDecision {
        energy,
        voice_band_energy,
        zero_crossing_rate,
        threshold,
        is_speech: met >= thresholds.min_conditions,
        confidence: (energy / threshold * 100.0).min(100.0),
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let len = values.len() as f32;
    values.iter().sum::<f32>() / len
}

fn voice_band_energy(frame: &VadFrame<'_>, (low_hz, high_hz): (f32, f32)) -> f32 {
    if frame.spectrum.is_empty() || frame.bin_hz <= 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let low = (low_hz / frame.bin_hz).floor() as usize;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let high = ((high_hz / frame.bin_hz).ceil() as usize).min(frame.spectrum.len() - 1);
    if low > high {
        return 0.0;
    }
    mean(&frame.spectrum[low..=high])
}

/// Sign changes per sample
#[must_use]
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    #[allow(clippy::cast_precision_loss)]
    let rate = crossings as f32 / (samples.len() - 1) as f32;
    rate
}
