//! Single-writer engine state
//!
//! Every transition checks the state it starts from and fails with
//! [`Error::InvalidTransition`] otherwise, so a lost event surfaces as an
//! error instead of a stuck flag.

use crate::voice::RecordingMode;
use crate::{Error, Result};

use super::pending::PendingAction;

/// Where the engine is in handling a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for a trigger
    Idle,
    /// Waiting for a trigger, with an action awaiting the user's reply
    AwaitingReply,
    /// A recording session holds the microphone
    Recording(RecordingMode),
    /// Waiting for the command service
    Processing,
    /// Executing an action
    Dispatching,
    /// Speaking feedback
    Speaking,
}

/// Which component holds the microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicHolder {
    /// Nobody (push-to-talk between commands, or stopped)
    Released,
    /// The wake word listener, active or suspended
    WakeListener,
    /// A recording session
    Recorder,
}

#[derive(Debug)]
pub struct EngineState {
    phase: Phase,
    mic: MicHolder,
    in_flight: bool,
    pending: Option<PendingAction>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            mic: MicHolder::Released,
            in_flight: false,
            pending: None,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn mic(&self) -> MicHolder {
        self.mic
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub const fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Whether a wake word detection would be accepted now
    #[must_use]
    pub fn accepts_wake_word(&self) -> bool {
        !self.in_flight && self.mic == MicHolder::WakeListener
    }

    /// Claim the command slot
    ///
    /// Returns false if a command is already in flight.
    pub fn begin_command(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Hand the microphone to a recording session
    ///
    /// # Errors
    ///
    /// Fails outside a command, while recording, or while dispatching
    pub fn start_recording(&mut self, mode: RecordingMode) -> Result<()> {
        if !self.in_flight {
            return Err(transition("start recording", "no command in flight"));
        }
        match self.phase {
            Phase::Idle | Phase::AwaitingReply | Phase::Processing | Phase::Speaking => {}
            other => return Err(transition("start recording", other)),
        }
        if self.mic == MicHolder::Recorder {
            return Err(transition("start recording", "recorder already holds microphone"));
        }
        self.phase = Phase::Recording(mode);
        self.mic = MicHolder::Recorder;
        Ok(())
    }

    /// Take the microphone back from a finished recording session
    ///
    /// # Errors
    ///
    /// Fails unless a recording is in progress
    pub fn end_recording(&mut self, listener_attached: bool) -> Result<()> {
        if !matches!(self.phase, Phase::Recording(_)) {
            return Err(transition("end recording", self.phase));
        }
        self.phase = Phase::Processing;
        self.mic = holder(listener_attached);
        Ok(())
    }

    /// Start executing an action
    ///
    /// # Errors
    ///
    /// Fails unless a response is being processed
    pub fn begin_dispatch(&mut self) -> Result<()> {
        if self.phase != Phase::Processing {
            return Err(transition("dispatch", self.phase));
        }
        self.phase = Phase::Dispatching;
        Ok(())
    }

    /// Start speaking feedback
    ///
    /// # Errors
    ///
    /// Fails outside a command or while recording
    pub fn begin_speaking(&mut self) -> Result<()> {
        if !self.in_flight {
            return Err(transition("speak", "no command in flight"));
        }
        if let Phase::Recording(_) = self.phase {
            return Err(transition("speak", self.phase));
        }
        self.phase = Phase::Speaking;
        Ok(())
    }

    /// Release the command slot once the command has finished
    ///
    /// # Errors
    ///
    /// Fails if no command is in flight or a recording is still open
    pub fn finish_command(&mut self, listener_attached: bool) -> Result<()> {
        if !self.in_flight {
            return Err(transition("finish command", "no command in flight"));
        }
        if let Phase::Recording(_) = self.phase {
            return Err(transition("finish command", self.phase));
        }
        self.settle(listener_attached);
        Ok(())
    }

    /// Unconditionally return to rest, keeping any pending action
    ///
    /// Used after a command is aborted, where the phase it stopped in is
    /// not known.
    pub fn settle(&mut self, listener_attached: bool) {
        self.in_flight = false;
        self.mic = holder(listener_attached);
        self.phase = if self.pending.is_some() {
            Phase::AwaitingReply
        } else {
            Phase::Idle
        };
    }

    /// Store a pending action, returning the one it replaced
    pub fn set_pending(&mut self, action: PendingAction) -> Option<PendingAction> {
        let replaced = self.pending.replace(action);
        if let Some(old) = &replaced {
            tracing::info!(replaced = old.kind(), "pending action replaced");
        }
        replaced
    }

    /// Remove and return the pending action
    pub fn take_pending(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }

    /// Return to a clean idle state with no pending action
    pub fn reset(&mut self, listener_attached: bool) {
        self.pending = None;
        self.settle(listener_attached);
    }
}

const fn holder(listener_attached: bool) -> MicHolder {
    if listener_attached {
        MicHolder::WakeListener
    } else {
        MicHolder::Released
    }
}

fn transition(action: &str, from: impl std::fmt::Debug) -> Error {
    Error::InvalidTransition(format!("cannot {action} from {from:?}"))
}
