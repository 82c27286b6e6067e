//! Speech synthesis for spoken feedback

use serde_json::json;

use crate::config::{TtsConfig, TtsProvider};
use crate::{Error, Result};

const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const ELEVENLABS_SPEECH_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Accepted speech rate range
const RATE_RANGE: (f32, f32) = (0.25, 4.0);

/// ElevenLabs only honours a narrower range
const ELEVENLABS_RATE_RANGE: (f32, f32) = (0.7, 1.2);

/// Synthesizes feedback sentences to MP3
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    model: String,
    provider: TtsProvider,
    rate: f32,
}

impl TextToSpeech {
    /// Create a synthesizer speaking at `rate`
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(config: &TtsConfig, rate: f32) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "{} API key required for spoken feedback",
                    provider_name(config.provider)
                ))
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: config.voice.clone(),
            model: config.model.clone(),
            provider: config.provider,
            rate: clamp_rate(rate, RATE_RANGE),
        })
    }

    /// Change the speech rate for later sentences
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = clamp_rate(rate, RATE_RANGE);
    }

    /// Synthesize one sentence to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the request
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let provider = provider_name(self.provider);
        tracing::debug!(provider, chars = text.chars().count(), rate = self.rate, "synthesizing");

        let response = self
            .request(text)
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("{provider} returned {status}: {body}")));
        }

        let audio = response.bytes().await.map_err(|e| Error::Tts(e.to_string()))?;
        Ok(audio.to_vec())
    }

    fn request(&self, text: &str) -> reqwest::RequestBuilder {
        match self.provider {
            TtsProvider::OpenAI => self
                .client
                .post(OPENAI_SPEECH_URL)
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": self.model,
                    "input": text,
                    "voice": self.voice,
                    "speed": self.rate,
                    "response_format": "mp3",
                })),
            TtsProvider::ElevenLabs => self
                .client
                .post(format!(
                    "{ELEVENLABS_SPEECH_URL}/{}",
                    urlencoding::encode(&self.voice)
                ))
                .header("xi-api-key", &self.api_key)
                .json(&json!({
                    "text": text,
                    "model_id": self.model,
                    "voice_settings": { "speed": clamp_rate(self.rate, ELEVENLABS_RATE_RANGE) },
                })),
        }
    }
}

const fn provider_name(provider: TtsProvider) -> &'static str {
    match provider {
        TtsProvider::OpenAI => "OpenAI",
        TtsProvider::ElevenLabs => "ElevenLabs",
    }
}

fn clamp_rate(rate: f32, (min, max): (f32, f32)) -> f32 {
    if rate.is_finite() { rate.clamp(min, max) } else { 1.0 }
}
