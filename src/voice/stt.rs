//! Cloud transcription, used only to verify candidate wake phrase segments

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::{SttConfig, SttProvider};
use crate::{Error, Result};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

/// Turns a short WAV clip into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// Cloud transcription client
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a client for the configured provider
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(config: &SttConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "{} API key required for wake phrase verification",
                    provider_name(config.provider)
                ))
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            provider: config.provider,
        })
    }

    fn request(&self, wav: &[u8]) -> Result<reqwest::RequestBuilder> {
        let request = match self.provider {
            SttProvider::Whisper => {
                let file = reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("segment.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?;
                let form = reqwest::multipart::Form::new()
                    .part("file", file)
                    .text("model", self.model.clone());
                self.client
                    .post(WHISPER_URL)
                    .bearer_auth(&self.api_key)
                    .multipart(form)
            }
            SttProvider::Deepgram => self
                .client
                .post(format!(
                    "{DEEPGRAM_URL}?model={}&punctuate=true",
                    urlencoding::encode(&self.model)
                ))
                .header(AUTHORIZATION, format!("Token {}", self.api_key))
                .header(CONTENT_TYPE, "audio/wav")
                .body(wav.to_vec()),
        };
        Ok(request)
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let provider = provider_name(self.provider);
        tracing::debug!(provider, bytes = wav.len(), "transcribing segment");

        let response = self
            .request(wav)?
            .send()
            .await
            .map_err(|e| Error::Stt(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("{provider} returned {status}: {body}")));
        }

        let body: Value = response.json().await.map_err(|e| Error::Stt(e.to_string()))?;
        let text = transcript(self.provider, &body);
        tracing::debug!(provider, transcript = %text, "segment transcribed");
        Ok(text)
    }
}

const fn provider_name(provider: SttProvider) -> &'static str {
    match provider {
        SttProvider::Whisper => "OpenAI",
        SttProvider::Deepgram => "Deepgram",
    }
}

/// Pull the best transcript out of a provider response
fn transcript(provider: SttProvider, body: &Value) -> String {
    let pointer = match provider {
        SttProvider::Whisper => "/text",
        SttProvider::Deepgram => "/results/channels/0/alternatives/0/transcript",
    };
    body.pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}
