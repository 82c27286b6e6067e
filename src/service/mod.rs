//! Remote speech-understanding service
//!
//! Each finished recording is uploaded once per attempt; only failures to
//! reach the service are retried.

pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assistant::pending::{ClientAction, PendingAction, PendingUpdate, RawClientAction};
use crate::config::ServiceConfig;
use crate::voice::{AudioClip, RecordingMode};
use crate::{Error, Result};

pub use retry::{RetryPolicy, delay_for_attempt, is_retryable};

/// Upload body for one recording
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub request_id: Uuid,
    /// Base64 WAV
    pub audio: String,
    pub mime_type: String,
    pub sample_rate: u32,
    pub duration_ms: u64,
    pub mode: RecordingMode,
    /// Locally held pending action, for context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingAction>,
}

impl CommandRequest {
    /// Build the upload for a clip
    #[must_use]
    pub fn from_clip(clip: &AudioClip, pending: Option<&PendingAction>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            audio: base64::engine::general_purpose::STANDARD.encode(&clip.wav),
            mime_type: "audio/wav".to_string(),
            sample_rate: clip.sample_rate,
            duration_ms: u64::try_from(clip.duration.as_millis()).unwrap_or(u64::MAX),
            mode: clip.mode,
            pending: pending.cloned(),
        }
    }
}

/// Service response as sent on the wire
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub needs_confirmation: bool,
    /// Absent, `null`, or an action
    #[serde(default, deserialize_with = "present")]
    pub pending: Option<serde_json::Value>,
    #[serde(default)]
    pub client_action: Option<RawClientAction>,
}

/// Keep an explicit `null` distinguishable from an absent field
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// Interpreted result of one round trip
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub transcript: String,
    pub reply: String,
    pub needs_confirmation: bool,
    pub pending: PendingUpdate,
    pub client_action: Option<ClientAction>,
}

impl TryFrom<CommandResponse> for CommandResult {
    type Error = Error;

    fn try_from(response: CommandResponse) -> Result<Self> {
        let client_action = response
            .client_action
            .map(ClientAction::try_from)
            .transpose()?;

        Ok(Self {
            transcript: response.transcript,
            reply: response.response,
            needs_confirmation: response.needs_confirmation,
            pending: PendingUpdate::from_field(response.pending),
            client_action,
        })
    }
}

/// Transport to the command service
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Upload one recording
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unreachable`] when the service cannot be reached,
    /// [`Error::Service`] for error statuses, [`Error::InvalidResponse`] for
    /// bodies that cannot be interpreted
    async fn post_command(&self, request: &CommandRequest) -> Result<CommandResult>;

    /// Tell the service to forget any pending action
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn clear_pending(&self) -> Result<()>;
}

/// HTTP transport using `reqwest`
pub struct HttpCommandTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCommandTransport {
    /// Create a transport for the configured service
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    async fn send(&self, path: &str, body: &impl Serialize) -> Result<reqwest::Response> {
        let mut request = self.client.post(format!("{}{path}", self.base_url)).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Service {
            status: status.as_u16(),
            body,
        })
    }
}

/// Map transport failures: connection and timeout errors are unreachable
fn classify(error: reqwest::Error) -> Error {
    if error.is_connect() || error.is_timeout() {
        Error::Unreachable(error.to_string())
    } else {
        Error::Http(error)
    }
}

#[async_trait]
impl CommandTransport for HttpCommandTransport {
    async fn post_command(&self, request: &CommandRequest) -> Result<CommandResult> {
        let response = self.send("/voice/command", request).await?;
        let body = response.text().await.map_err(classify)?;
        let parsed: CommandResponse = serde_json::from_str(&body)
            .map_err(|e| Error::InvalidResponse(format!("{e}: {body}")))?;
        CommandResult::try_from(parsed)
    }

    async fn clear_pending(&self) -> Result<()> {
        self.send("/voice/pending/clear", &serde_json::json!({})).await?;
        Ok(())
    }
}

/// Upload-and-interpret with bounded retry on unreachable service
pub struct CommandRoundTrip {
    transport: Arc<dyn CommandTransport>,
    policy: RetryPolicy,
}

impl CommandRoundTrip {
    #[must_use]
    pub fn new(transport: Arc<dyn CommandTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Upload a clip and interpret the response
    ///
    /// At most `max_retries + 1` attempts are made.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or any
    /// non-retryable error immediately
    pub async fn send(
        &self,
        clip: &AudioClip,
        pending: Option<&PendingAction>,
    ) -> Result<CommandResult> {
        let request = CommandRequest::from_clip(clip, pending);
        let mut attempt = 0;

        loop {
            match self.transport.post_command(&request).await {
                Ok(result) => {
                    tracing::debug!(
                        request_id = %request.request_id,
                        attempt,
                        needs_confirmation = result.needs_confirmation,
                        "command round trip complete"
                    );
                    return Ok(result);
                }
                Err(e) if is_retryable(&e) && attempt < self.policy.max_retries => {
                    let delay = delay_for_attempt(&self.policy, attempt);
                    tracing::warn!(
                        request_id = %request.request_id,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "command service unreachable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(request_id = %request.request_id, attempt, error = %e, "command round trip failed");
                    return Err(e);
                }
            }
        }
    }

    /// Shared handle to the transport, for requests outside a round trip
    #[must_use]
    pub fn transport(&self) -> Arc<dyn CommandTransport> {
        Arc::clone(&self.transport)
    }
}
