//! Chat platform collaborators
//!
//! Messaging, groups, calls, and search are reached through the chat app's
//! REST API. The engine only sees the [`ChatServices`] trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::{Error, Result};

/// Where a message or call goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Existing conversation
    Conversation(String),
    /// Group conversation
    Group(String),
    /// Direct message to a user without a known conversation
    User(String),
}

/// Sticker to send, by id or by spoken description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StickerRef {
    Id(String),
    Description(String),
}

/// A newly created group
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    /// `message`, `file`, `image`, `user`, `group`, ...
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl SearchHit {
    /// Whether the hit is a file that can be sent on
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        matches!(self.kind.as_str(), "file" | "image" | "video" | "audio")
    }
}

/// Search results with an optional spoken summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub items: Vec<SearchHit>,
}

/// Chat operations the action executor can perform
#[async_trait]
pub trait ChatServices: Send + Sync {
    /// Send a text message
    async fn send_message(&self, to: &Recipient, content: &str) -> Result<()>;

    /// Send a sticker
    async fn send_sticker(&self, to: &Recipient, sticker: &StickerRef) -> Result<()>;

    /// Send an emoji, given as the emoji itself or a description of it
    async fn send_emoji(&self, to: &Recipient, emoji: &str) -> Result<()>;

    /// Create a group with the given members
    async fn create_group(&self, name: &str, member_ids: &[String]) -> Result<GroupInfo>;

    /// Ask to join an existing group
    async fn request_join_group(&self, group_id: &str) -> Result<()>;

    /// Add members to a group
    async fn add_group_members(&self, group_id: &str, member_ids: &[String]) -> Result<()>;

    /// Start an outgoing call
    async fn start_call(&self, to: &Recipient, video: bool) -> Result<()>;

    /// Accept or decline an incoming call
    async fn answer_call(&self, call_id: &str, accept: bool) -> Result<()>;

    /// Search messages, files, and contacts
    async fn search(&self, query: &str) -> Result<SearchResults>;

    /// Forward an existing attachment
    async fn send_attachment(&self, to: &Recipient, attachment_id: &str) -> Result<()>;
}

/// REST client for the chat app
pub struct HttpChatServices {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChatServices {
    /// Create a client for the configured chat API
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Chat(e.to_string()))?;
        check(response).await
    }

    async fn post_message(&self, to: &Recipient, mut body: serde_json::Value) -> Result<()> {
        let (key, id) = match to {
            Recipient::Conversation(id) => ("conversationId", id),
            Recipient::Group(id) => ("groupId", id),
            Recipient::User(id) => ("receiverId", id),
        };
        body[key] = serde_json::Value::String(id.clone());
        self.post("/messages", &body).await?;
        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, body = %body, "chat API error");
    Err(Error::Chat(format!("{status}: {body}")))
}

#[async_trait]
impl ChatServices for HttpChatServices {
    async fn send_message(&self, to: &Recipient, content: &str) -> Result<()> {
        self.post_message(to, serde_json::json!({ "type": "text", "content": content }))
            .await
    }

    async fn send_sticker(&self, to: &Recipient, sticker: &StickerRef) -> Result<()> {
        let body = match sticker {
            StickerRef::Id(id) => serde_json::json!({ "type": "sticker", "stickerId": id }),
            StickerRef::Description(query) => {
                serde_json::json!({ "type": "sticker", "stickerQuery": query })
            }
        };
        self.post_message(to, body).await
    }

    async fn send_emoji(&self, to: &Recipient, emoji: &str) -> Result<()> {
        self.post_message(to, serde_json::json!({ "type": "emoji", "content": emoji }))
            .await
    }

    async fn create_group(&self, name: &str, member_ids: &[String]) -> Result<GroupInfo> {
        let response = self
            .post("/groups", &serde_json::json!({ "name": name, "memberIds": member_ids }))
            .await?;
        response
            .json()
            .await
            .map_err(|e| Error::Chat(format!("invalid group response: {e}")))
    }

    async fn request_join_group(&self, group_id: &str) -> Result<()> {
        let path = format!("/groups/{}/join-requests", urlencoding::encode(group_id));
        self.post(&path, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn add_group_members(&self, group_id: &str, member_ids: &[String]) -> Result<()> {
        let path = format!("/groups/{}/members", urlencoding::encode(group_id));
        self.post(&path, &serde_json::json!({ "memberIds": member_ids }))
            .await?;
        Ok(())
    }

    async fn start_call(&self, to: &Recipient, video: bool) -> Result<()> {
        let mut body = serde_json::json!({ "video": video });
        match to {
            Recipient::Conversation(id) => body["conversationId"] = id.clone().into(),
            Recipient::Group(id) => body["groupId"] = id.clone().into(),
            Recipient::User(id) => body["receiverId"] = id.clone().into(),
        }
        self.post("/calls", &body).await?;
        Ok(())
    }

    async fn answer_call(&self, call_id: &str, accept: bool) -> Result<()> {
        let path = format!("/calls/{}/answer", urlencoding::encode(call_id));
        self.post(&path, &serde_json::json!({ "accept": accept }))
            .await?;
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<SearchResults> {
        let url = format!("{}?q={}", self.url("/search"), urlencoding::encode(query));
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::Chat(e.to_string()))?;
        check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Chat(format!("invalid search response: {e}")))
    }

    async fn send_attachment(&self, to: &Recipient, attachment_id: &str) -> Result<()> {
        self.post_message(
            to,
            serde_json::json!({ "type": "attachment", "attachmentId": attachment_id }),
        )
        .await
    }
}
