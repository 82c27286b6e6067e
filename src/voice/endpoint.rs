//! Decide when a recording session has heard a complete utterance

use std::fmt;
use std::time::Duration;

use super::vad::{EndpointThresholds, VadState};

/// Why a recording session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Enough consecutive silent ticks after speech
    ContinuousSilenceFrames,
    /// Silence lasted the configured duration
    TimeBasedSilence,
    /// The mode's maximum recording time elapsed
    MaxTimeReached,
    /// The hard ceiling timer fired
    CeilingTimer,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ContinuousSilenceFrames => "continuous_silence_frames",
            Self::TimeBasedSilence => "time_based_silence",
            Self::MaxTimeReached => "max_time_reached",
            Self::CeilingTimer => "ceiling_timer",
        };
        f.write_str(reason)
    }
}

/// Why a recording session keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueReason {
    StartupGrace,
    AwaitingSpeech,
    MinSpeechNotMet,
    Speaking,
}

/// Outcome of one endpoint evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDecision {
    Continue(ContinueReason),
    Stop(StopReason),
}

impl EndpointDecision {
    #[must_use]
    pub const fn should_stop(self) -> bool {
        matches!(self, Self::Stop(_))
    }
}

/// Evaluate the stop rules, in priority order, at offset `now` into the session
#[must_use]
pub fn evaluate(state: &VadState, thresholds: &EndpointThresholds, now: Duration) -> EndpointDecision {
    if now < thresholds.startup_grace {
        return EndpointDecision::Continue(ContinueReason::StartupGrace);
    }

    if !state.speech_started() {
        return EndpointDecision::Continue(ContinueReason::AwaitingSpeech);
    }

    if state.speech_duration() < thresholds.min_speech_duration {
        return EndpointDecision::Continue(ContinueReason::MinSpeechNotMet);
    }

    if state.silence_frames() >= thresholds.silence_frames_to_stop {
        return EndpointDecision::Stop(StopReason::ContinuousSilenceFrames);
    }

    if state
        .silence_started_at()
        .is_some_and(|start| now.saturating_sub(start) >= thresholds.silence_duration)
    {
        return EndpointDecision::Stop(StopReason::TimeBasedSilence);
    }

    if now >= thresholds.max_recording_time {
        return EndpointDecision::Stop(StopReason::MaxTimeReached);
    }

    EndpointDecision::Continue(ContinueReason::Speaking)
}
