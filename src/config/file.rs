//! TOML configuration file loading
//!
//! Supports `~/.config/vocmd/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{ActivationMode, SttProvider, TtsProvider, WakeEngine};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Per-session assistant settings
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Remote command service
    #[serde(default)]
    pub service: ServiceFileConfig,

    /// Chat REST collaborators
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Keyword engine
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Speech synthesis
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Transcription used for wake phrase verification
    #[serde(default)]
    pub stt: SttFileConfig,
}

/// Assistant settings overlay
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// `wake_word` or `push_to_talk`
    pub activation_mode: Option<ActivationMode>,

    /// Spoken wake phrase (e.g. "hey chat")
    pub wake_phrase: Option<String>,

    /// TTS speed multiplier
    pub speech_rate: Option<f32>,

    /// Enable voice command capture
    pub stt_enabled: Option<bool>,

    /// Enable spoken feedback
    pub tts_enabled: Option<bool>,
}

/// Command service overlay
#[derive(Debug, Default, Deserialize)]
pub struct ServiceFileConfig {
    /// Base URL of the speech-understanding service
    pub url: Option<String>,

    /// Bearer token
    pub token: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Maximum retries on unreachable service
    pub max_retries: Option<u32>,
}

/// Chat REST overlay
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Base URL of the chat REST API
    pub url: Option<String>,

    /// Bearer token
    pub token: Option<String>,
}

/// Keyword engine overlay
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// `phrase` or `rustpotter`
    pub engine: Option<WakeEngine>,

    /// Access credential for the engine
    pub access_key: Option<String>,

    /// Compiled keyword model
    pub keyword_path: Option<PathBuf>,

    /// Shared parameter file
    pub model_path: Option<PathBuf>,
}

/// TTS overlay
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub provider: Option<TtsProvider>,
    pub api_key: Option<String>,
    pub voice: Option<String>,
    pub model: Option<String>,
}

/// STT overlay
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    pub provider: Option<SttProvider>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

/// Load the TOML config file from `path`
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/vocmd/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "vocmd", "vocmd").map(|d| d.config_dir().join("config.toml"))
}
