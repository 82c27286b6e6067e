//! Voice Command Engine - hands-free voice control for a chat client
//!
//! This library provides the client-side audio and dialogue engine:
//! - Wake word gating of a shared microphone
//! - Adaptive voice activity detection and endpointing
//! - Command round trips to a speech-understanding service, with retry
//! - Confirmation dialogue over a single pending action
//! - Chat actions (messages, stickers, groups, calls, search) with spoken
//!   feedback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Microphone                        │
//! │     WakeWordListener   ⇄   RecordingSession (VAD)   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ clip
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Assistant                          │
//! │  CommandRoundTrip │ dialogue │ ActionExecutor │ TTS │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │      Command service        │     Chat REST API      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod chat;
pub mod config;
pub mod error;
pub mod service;
pub mod status;
pub mod voice;

pub use assistant::{Assistant, AssistantHandle, Collaborators, ControlCommand};
pub use config::{ActivationMode, Config, Settings};
pub use error::{Error, Result};
pub use status::Status;
