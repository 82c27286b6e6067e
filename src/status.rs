//! User-visible status line

use std::fmt;

/// What the assistant is doing, published on a `watch` channel
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    /// Not listening (push-to-talk mode between commands)
    #[default]
    Idle,
    /// Waiting for the wake phrase
    Listening,
    /// Capturing a command or reply
    Recording,
    /// Waiting for the command service
    Processing,
    /// Speaking feedback
    Speaking(String),
    /// An action waits for the user's reply; holds the prompt
    AwaitingReply(String),
    /// Voice commands are off for this session
    Disabled(String),
    /// The engine has shut down
    Stopped,
}

impl Status {
    /// Whether the engine can still accept commands
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disabled(_) | Self::Stopped)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Recording => write!(f, "recording"),
            Self::Processing => write!(f, "processing"),
            Self::Speaking(text) => write!(f, "speaking: {text}"),
            Self::AwaitingReply(prompt) if prompt.is_empty() => write!(f, "awaiting reply"),
            Self::AwaitingReply(prompt) => write!(f, "awaiting reply: {prompt}"),
            Self::Disabled(reason) => write!(f, "disabled: {reason}"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
