//! Error types for the voice command engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice command engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone access was denied or no input device exists
    #[error("microphone unavailable: {0}")]
    Permission(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Keyword engine could not be initialised or failed while processing
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// The command service could not be reached
    #[error("command service unreachable: {0}")]
    Unreachable(String),

    /// The command service answered with an error status
    #[error("command service error {status}: {body}")]
    Service {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The command service answered with a body we could not understand
    #[error("invalid service response: {0}")]
    InvalidResponse(String),

    /// A chat collaborator rejected an action
    #[error("chat service error: {0}")]
    Chat(String),

    /// An engine state transition was attempted from the wrong state
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A wait exceeded its ceiling
    #[error("timed out: {0}")]
    Timeout(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error ends the feature for the session
    ///
    /// Permission and initialisation failures are reported once and never
    /// retried.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Permission(_) | Self::WakeWord(_) | Self::Config(_))
    }
}
