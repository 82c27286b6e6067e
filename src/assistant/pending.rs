//! Pending and immediate actions carried in service responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::Recipient;
use crate::{Error, Result};

/// Who an action is aimed at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Target {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

impl Target {
    /// Resolve the most specific destination
    #[must_use]
    pub fn recipient(&self) -> Option<Recipient> {
        let non_empty = |id: &Option<String>| id.clone().filter(|id| !id.trim().is_empty());
        non_empty(&self.conversation_id)
            .map(Recipient::Conversation)
            .or_else(|| non_empty(&self.group_id).map(Recipient::Group))
            .or_else(|| non_empty(&self.receiver_id).map(Recipient::User))
    }

    /// Name to use in spoken feedback
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.target_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("người nhận")
    }
}

/// A file offered for selection after a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentCandidate {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// What a pending action does once confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        #[serde(default)]
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    SendSticker {
        #[serde(default)]
        sticker_id: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SendEmoji {
        #[serde(default)]
        emoji: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    CreateGroup {
        #[serde(default)]
        group_name: String,
        #[serde(default)]
        member_ids: Vec<String>,
    },
    JoinGroup {},
    #[serde(rename_all = "camelCase")]
    InviteToGroup {
        #[serde(default)]
        member_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    MakeCall {
        #[serde(default)]
        is_video: bool,
    },
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        #[serde(default)]
        call_id: String,
        #[serde(default)]
        is_video: bool,
    },
    #[serde(rename_all = "camelCase")]
    SearchSmart {
        #[serde(default)]
        query: String,
    },
    #[serde(rename_all = "camelCase")]
    ChooseAttachment {
        #[serde(default)]
        candidates: Vec<AttachmentCandidate>,
    },
}

impl ActionPayload {
    /// Wire name of the action type
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::SendSticker { .. } => "send_sticker",
            Self::SendEmoji { .. } => "send_emoji",
            Self::CreateGroup { .. } => "create_group",
            Self::JoinGroup {} => "join_group",
            Self::InviteToGroup { .. } => "invite_to_group",
            Self::MakeCall { .. } => "make_call",
            Self::IncomingCall { .. } => "incoming_call",
            Self::SearchSmart { .. } => "search_smart",
            Self::ChooseAttachment { .. } => "choose_attachment",
        }
    }
}

/// An action awaiting the user's yes/no (or selection) reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    #[serde(flatten)]
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(flatten)]
    pub payload: ActionPayload,
}

impl PendingAction {
    /// Pending answer to an incoming call
    #[must_use]
    pub fn incoming_call(call_id: &str, caller_name: &str, is_video: bool) -> Self {
        Self {
            target: Target {
                target_name: Some(caller_name.to_string()),
                ..Target::default()
            },
            prompt: Some(super::phrases::incoming_call_prompt(caller_name, is_video)),
            payload: ActionPayload::IncomingCall {
                call_id: call_id.to_string(),
                is_video,
            },
        }
    }

    /// Wire name of the action type
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// How a response changes the pending slot
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PendingUpdate {
    /// Field absent: keep whatever is pending
    #[default]
    Unchanged,
    /// Explicit `null`: nothing is pending any more
    Clear,
    /// A new pending action replaces the current one
    Set(PendingAction),
}

impl PendingUpdate {
    /// Interpret the raw `pending` field of a response
    ///
    /// A present value that is not a known action is logged and ignored.
    #[must_use]
    pub fn from_field(field: Option<Value>) -> Self {
        match field {
            None => Self::Unchanged,
            Some(Value::Null) => Self::Clear,
            Some(value) => match serde_json::from_value::<PendingAction>(value) {
                Ok(action) => Self::Set(action),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unrecognised pending action");
                    Self::Unchanged
                }
            },
        }
    }
}

/// Raw `clientAction` envelope
#[derive(Debug, Clone, Deserialize)]
pub struct RawClientAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// An action the service asks the client to perform immediately
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    CreateGroup {
        group_name: String,
        member_ids: Vec<String>,
    },
    JoinGroup {
        group_id: String,
        group_name: Option<String>,
    },
    InviteToGroup {
        group_id: String,
        group_name: Option<String>,
        member_ids: Vec<String>,
    },
    SearchSmart {
        query: String,
        target: Option<Target>,
    },
    /// Universal cancel of whatever is pending
    Cancel { cancelled_type: Option<String> },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupPayload {
    #[serde(default)]
    group_id: String,
    #[serde(default)]
    group_name: Option<String>,
    #[serde(default)]
    member_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload {
    #[serde(default)]
    query: String,
    #[serde(flatten)]
    target: Target,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelPayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    cancelled_type: Option<String>,
}

impl TryFrom<RawClientAction> for ClientAction {
    type Error = Error;

    fn try_from(raw: RawClientAction) -> Result<Self> {
        let payload = if raw.payload.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            raw.payload
        };

        let invalid = |e: serde_json::Error| {
            Error::InvalidResponse(format!("bad {} client action: {e}", raw.kind))
        };

        // A cancel can arrive under any type
        if let Ok(cancel) = serde_json::from_value::<CancelPayload>(payload.clone())
            && (raw.kind == "cancel" || cancel.action.as_deref() == Some("cancel"))
        {
            return Ok(Self::Cancel {
                cancelled_type: cancel.cancelled_type.or_else(|| {
                    (raw.kind != "cancel").then(|| raw.kind.clone())
                }),
            });
        }

        match raw.kind.as_str() {
            "create_group" => {
                let group: GroupPayload = serde_json::from_value(payload).map_err(invalid)?;
                Ok(Self::CreateGroup {
                    group_name: group.group_name.unwrap_or_default(),
                    member_ids: group.member_ids,
                })
            }
            "join_group" => {
                let group: GroupPayload = serde_json::from_value(payload).map_err(invalid)?;
                Ok(Self::JoinGroup {
                    group_id: group.group_id,
                    group_name: group.group_name,
                })
            }
            "invite_to_group" => {
                let group: GroupPayload = serde_json::from_value(payload).map_err(invalid)?;
                Ok(Self::InviteToGroup {
                    group_id: group.group_id,
                    group_name: group.group_name,
                    member_ids: group.member_ids,
                })
            }
            "search_smart" => {
                let search: SearchPayload = serde_json::from_value(payload).map_err(invalid)?;
                let target = (search.target != Target::default()).then_some(search.target);
                Ok(Self::SearchSmart {
                    query: search.query,
                    target,
                })
            }
            other => Err(Error::InvalidResponse(format!(
                "unknown client action: {other}"
            ))),
        }
    }
}
