//! Configuration management for the voice command engine
//!
//! Values are resolved with priority: environment → config file → defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

pub use file::{ConfigFile, config_file_path, load_config_file};

/// How a command is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Passive listening for the wake phrase
    #[default]
    WakeWord,
    /// Explicit trigger from the control surface
    PushToTalk,
}

impl std::str::FromStr for ActivationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "wake_word" | "wakeword" => Ok(Self::WakeWord),
            "push_to_talk" | "ptt" => Ok(Self::PushToTalk),
            other => Err(Error::Config(format!("unknown activation mode: {other}"))),
        }
    }
}

/// Keyword engine backing the wake word listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeEngine {
    /// Energy segmentation verified by transcription
    #[default]
    Phrase,
    /// Compiled keyword model (requires the `rustpotter` feature)
    Rustpotter,
}

/// TTS provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    OpenAI,
    ElevenLabs,
}

/// STT provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    #[default]
    Whisper,
    Deepgram,
}

/// Per-session assistant settings
///
/// Immutable for the lifetime of an engine session; a change tears the
/// engine down and starts it again.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// How commands are started
    pub activation_mode: ActivationMode,

    /// Wake phrase label
    pub wake_phrase: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub speech_rate: f32,

    /// Voice command capture enabled
    pub stt_enabled: bool,

    /// Spoken feedback enabled
    pub tts_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            activation_mode: ActivationMode::WakeWord,
            wake_phrase: "hey chat".to_string(),
            speech_rate: 1.0,
            stt_enabled: true,
            tts_enabled: true,
        }
    }
}

/// Remote command service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL
    pub url: String,

    /// Bearer token
    pub token: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,

    /// Maximum retries when the service is unreachable
    pub max_retries: u32,
}

/// Chat REST configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL
    pub url: String,

    /// Bearer token
    pub token: Option<String>,
}

/// Keyword engine configuration
#[derive(Debug, Clone, Default)]
pub struct WakeConfig {
    /// Engine kind
    pub engine: WakeEngine,

    /// Access credential
    pub access_key: Option<String>,

    /// Compiled keyword model path
    pub keyword_path: Option<PathBuf>,

    /// Shared parameter file path
    pub model_path: Option<PathBuf>,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Default)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub api_key: Option<String>,
    pub voice: String,
    pub model: String,
}

/// Transcription configuration (wake phrase verification)
#[derive(Debug, Clone, Default)]
pub struct SttConfig {
    pub provider: SttProvider,
    pub api_key: Option<String>,
    pub model: String,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Assistant settings
    pub settings: Settings,

    /// Remote command service
    pub service: ServiceConfig,

    /// Chat REST collaborators
    pub chat: ChatConfig,

    /// Keyword engine
    pub wake: WakeConfig,

    /// Speech synthesis
    pub tts: TtsConfig,

    /// Transcription
    pub stt: SttConfig,
}

impl Config {
    /// Load configuration from the config file and the process environment
    ///
    /// `path` overrides the standard config file location.
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path.map(Path::to_path_buf).or_else(config_file_path) {
            Some(path) => load_config_file(&path),
            None => ConfigFile::default(),
        };

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Resolve a config from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn resolve(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flag = |key: &str| env(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let activation_mode = match env("VOCMD_ACTIVATION_MODE") {
            Some(mode) => mode.parse()?,
            None => file.assistant.activation_mode.unwrap_or_default(),
        };

        let speech_rate = match env("VOCMD_SPEECH_RATE") {
            Some(rate) => rate
                .parse::<f32>()
                .map_err(|e| Error::Config(format!("invalid VOCMD_SPEECH_RATE: {e}")))?,
            None => file.assistant.speech_rate.unwrap_or(1.0),
        };

        let defaults = Settings::default();
        let settings = Settings {
            activation_mode,
            wake_phrase: env("VOCMD_WAKE_PHRASE")
                .or(file.assistant.wake_phrase)
                .unwrap_or(defaults.wake_phrase),
            speech_rate: speech_rate.clamp(0.25, 4.0),
            stt_enabled: flag("VOCMD_STT_ENABLED")
                .or(file.assistant.stt_enabled)
                .unwrap_or(true),
            tts_enabled: flag("VOCMD_TTS_ENABLED")
                .or(file.assistant.tts_enabled)
                .unwrap_or(true),
        };

        let max_retries = match env("VOCMD_SERVICE_MAX_RETRIES") {
            Some(n) => n
                .parse()
                .map_err(|e| Error::Config(format!("invalid VOCMD_SERVICE_MAX_RETRIES: {e}")))?,
            None => file.service.max_retries.unwrap_or(3),
        };

        let service = ServiceConfig {
            url: env("VOCMD_SERVICE_URL")
                .or(file.service.url)
                .unwrap_or_else(|| "http://localhost:5000/api".to_string()),
            token: env("VOCMD_SERVICE_TOKEN").or(file.service.token),
            timeout: Duration::from_secs(file.service.timeout_secs.unwrap_or(30)),
            max_retries,
        };

        let chat = ChatConfig {
            url: env("VOCMD_CHAT_URL")
                .or(file.chat.url)
                .unwrap_or_else(|| service.url.clone()),
            token: env("VOCMD_CHAT_TOKEN")
                .or(file.chat.token)
                .or_else(|| service.token.clone()),
        };

        let wake_engine = match env("VOCMD_WAKE_ENGINE").as_deref() {
            Some("rustpotter") => WakeEngine::Rustpotter,
            Some("phrase") => WakeEngine::Phrase,
            Some(other) => {
                return Err(Error::Config(format!("unknown wake engine: {other}")));
            }
            None => file.wake.engine.unwrap_or_default(),
        };

        let wake = WakeConfig {
            engine: wake_engine,
            access_key: env("VOCMD_WAKE_ACCESS_KEY").or(file.wake.access_key),
            keyword_path: env("VOCMD_WAKE_KEYWORD_PATH")
                .map(PathBuf::from)
                .or(file.wake.keyword_path),
            model_path: env("VOCMD_WAKE_MODEL_PATH")
                .map(PathBuf::from)
                .or(file.wake.model_path),
        };

        let tts_provider = file.tts.provider.unwrap_or_default();
        let tts = TtsConfig {
            provider: tts_provider,
            api_key: match tts_provider {
                TtsProvider::OpenAI => env("OPENAI_API_KEY"),
                TtsProvider::ElevenLabs => env("ELEVENLABS_API_KEY"),
            }
            .or(file.tts.api_key),
            voice: env("VOCMD_TTS_VOICE")
                .or(file.tts.voice)
                .unwrap_or_else(|| "alloy".to_string()),
            model: env("VOCMD_TTS_MODEL")
                .or(file.tts.model)
                .unwrap_or_else(|| match tts_provider {
                    TtsProvider::OpenAI => "tts-1".to_string(),
                    TtsProvider::ElevenLabs => "eleven_multilingual_v2".to_string(),
                }),
        };

        let stt_provider = file.stt.provider.unwrap_or_default();
        let stt = SttConfig {
            provider: stt_provider,
            api_key: match stt_provider {
                SttProvider::Whisper => env("OPENAI_API_KEY"),
                SttProvider::Deepgram => env("DEEPGRAM_API_KEY"),
            }
            .or(file.stt.api_key),
            model: env("VOCMD_STT_MODEL")
                .or(file.stt.model)
                .unwrap_or_else(|| match stt_provider {
                    SttProvider::Whisper => "whisper-1".to_string(),
                    SttProvider::Deepgram => "nova-2".to_string(),
                }),
        };

        Ok(Self {
            settings,
            service,
            chat,
            wake,
            tts,
            stt,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::resolve(ConfigFile::default(), env_of(&[])).unwrap();

        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.service.max_retries, 3);
        assert_eq!(config.chat.url, config.service.url);
        assert_eq!(config.wake.engine, WakeEngine::Phrase);
        assert_eq!(config.tts.model, "tts-1");
    }

    #[test]
    fn file_overlays_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"
[assistant]
activation_mode = "push_to_talk"
wake_phrase = "ok bạn ơi"
speech_rate = 1.5

[service]
url = "https://voice.example.com"
max_retries = 5

[tts]
provider = "elevenlabs"
voice = "vi-female"
"#
        )
        .unwrap();

        let file = load_config_file(tmp.path());
        let config = Config::resolve(file, env_of(&[])).unwrap();

        assert_eq!(config.settings.activation_mode, ActivationMode::PushToTalk);
        assert_eq!(config.settings.wake_phrase, "ok bạn ơi");
        assert!((config.settings.speech_rate - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.service.url, "https://voice.example.com");
        assert_eq!(config.service.max_retries, 5);
        assert_eq!(config.tts.provider, TtsProvider::ElevenLabs);
        assert_eq!(config.tts.model, "eleven_multilingual_v2");
    }

    #[test]
    fn env_overrides_file() {
        let file = ConfigFile {
            assistant: file::AssistantFileConfig {
                wake_phrase: Some("from file".to_string()),
                tts_enabled: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };

        let config = Config::resolve(
            file,
            env_of(&[
                ("VOCMD_WAKE_PHRASE", "from env"),
                ("VOCMD_TTS_ENABLED", "false"),
                ("VOCMD_ACTIVATION_MODE", "ptt"),
                ("VOCMD_SPEECH_RATE", "9"),
            ]),
        )
        .unwrap();

        assert_eq!(config.settings.wake_phrase, "from env");
        assert!(!config.settings.tts_enabled);
        assert_eq!(config.settings.activation_mode, ActivationMode::PushToTalk);
        assert!((config.settings.speech_rate - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_unknown_activation_mode() {
        let result = Config::resolve(
            ConfigFile::default(),
            env_of(&[("VOCMD_ACTIVATION_MODE", "clap")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "this is = = not toml").unwrap();

        let file = load_config_file(tmp.path());
        assert!(file.assistant.wake_phrase.is_none());
    }
}
