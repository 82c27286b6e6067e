//! Perform confirmed actions against the chat services
//!
//! Handlers validate the identifiers they need, call [`ChatServices`], and
//! turn every result into a spoken sentence. Nothing here returns an error.

use std::sync::Arc;

use crate::chat::{ChatServices, SearchResults, StickerRef};

use super::confirmation::{extract_emoji_description, extract_sticker_description};
use super::pending::{ActionPayload, AttachmentCandidate, ClientAction, PendingAction, Target};
use super::phrases;

/// Result of executing an action
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Sentence to speak
    pub speech: String,
    /// Whether the chat service accepted the action
    pub success: bool,
    /// New pending action that continues the dialogue (file selection)
    pub follow_up: Option<PendingAction>,
}

impl Outcome {
    fn done(speech: String) -> Self {
        Self {
            speech,
            success: true,
            follow_up: None,
        }
    }

    fn failed(speech: String) -> Self {
        Self {
            speech,
            success: false,
            follow_up: None,
        }
    }
}

/// One handler per action kind
pub struct ActionExecutor {
    chat: Arc<dyn ChatServices>,
}

impl ActionExecutor {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatServices>) -> Self {
        Self { chat }
    }

    /// Run a pending action the user confirmed
    ///
    /// `selection` is the 1-based index for `choose_attachment`.
    pub async fn execute(&self, action: &PendingAction, selection: Option<usize>) -> Outcome {
        let target = &action.target;
        let name = target.display_name();
        let kind = action.kind();
        tracing::info!(kind, target = name, "executing pending action");

        match &action.payload {
            ActionPayload::SendMessage { content } => {
                let Some(to) = target.recipient() else {
                    return missing(kind, "người nhận");
                };
                if content.trim().is_empty() {
                    return missing(kind, "nội dung tin nhắn");
                }
                match self.chat.send_message(&to, content).await {
                    Ok(()) => Outcome::done(phrases::message_sent(name)),
                    Err(e) => {
                        tracing::warn!(kind, error = %e, "send message failed");
                        Outcome::failed(phrases::message_failed(name))
                    }
                }
            }
            ActionPayload::SendSticker {
                sticker_id,
                description,
            } => {
                let sticker = non_empty(sticker_id.as_deref())
                    .map(StickerRef::Id)
                    .or_else(|| {
                        non_empty(description.as_deref())
                            .or_else(|| action.prompt.as_deref().and_then(extract_sticker_description))
                            .map(StickerRef::Description)
                    });
                self.send_sticker(target, sticker).await
            }
            ActionPayload::SendEmoji { emoji, description } => {
                let emoji = non_empty(emoji.as_deref())
                    .or_else(|| non_empty(description.as_deref()))
                    .or_else(|| action.prompt.as_deref().and_then(extract_emoji_description));
                self.send_emoji(target, emoji).await
            }
            ActionPayload::CreateGroup {
                group_name,
                member_ids,
            } => self.create_group(group_name, member_ids).await,
            ActionPayload::JoinGroup {} => {
                let Some(group_id) = non_empty(target.group_id.as_deref()) else {
                    return missing(kind, "nhóm");
                };
                self.join_group(&group_id, target.target_name.as_deref()).await
            }
            ActionPayload::InviteToGroup { member_ids } => {
                let Some(group_id) = non_empty(target.group_id.as_deref()) else {
                    return missing(kind, "nhóm");
                };
                self.invite(&group_id, target.target_name.as_deref(), member_ids)
                    .await
            }
            ActionPayload::MakeCall { is_video } => {
                let Some(to) = target.recipient() else {
                    return missing(kind, "người nhận");
                };
                report(kind, self.chat.start_call(&to, *is_video).await, || {
                    phrases::calling(name, *is_video)
                })
            }
            ActionPayload::IncomingCall { call_id, .. } => {
                if call_id.trim().is_empty() {
                    return missing(kind, "cuộc gọi");
                }
                report(kind, self.chat.answer_call(call_id, true).await, || {
                    phrases::CALL_ACCEPTED.to_string()
                })
            }
            ActionPayload::SearchSmart { query } => self.search(query, Some(target)).await,
            ActionPayload::ChooseAttachment { candidates } => {
                self.send_choice(target, candidates, selection).await
            }
        }
    }

    /// Run an action the service asked for directly
    pub async fn execute_client(&self, action: &ClientAction) -> Outcome {
        tracing::info!(?action, "executing client action");

        match action {
            ClientAction::CreateGroup {
                group_name,
                member_ids,
            } => self.create_group(group_name, member_ids).await,
            ClientAction::JoinGroup {
                group_id,
                group_name,
            } => match non_empty(Some(group_id.as_str())) {
                Some(id) => self.join_group(&id, group_name.as_deref()).await,
                None => missing("join_group", "nhóm"),
            },
            ClientAction::InviteToGroup {
                group_id,
                group_name,
                member_ids,
            } => match non_empty(Some(group_id.as_str())) {
                Some(id) => self.invite(&id, group_name.as_deref(), member_ids).await,
                None => missing("invite_to_group", "nhóm"),
            },
            ClientAction::SearchSmart { query, target } => {
                self.search(query, target.as_ref()).await
            }
            ClientAction::Cancel { cancelled_type } => {
                Outcome::done(phrases::cancelled(cancelled_type.as_deref()))
            }
        }
    }

    /// Handle a "no" to a pending action
    ///
    /// Declining an incoming call tells the chat service; everything else
    /// is dropped locally.
    pub async fn reject(&self, action: &PendingAction) -> Outcome {
        let kind = action.kind();
        tracing::info!(kind, "pending action rejected");

        match &action.payload {
            ActionPayload::IncomingCall { call_id, .. } if !call_id.trim().is_empty() => {
                let name = action.target.display_name();
                report(kind, self.chat.answer_call(call_id, false).await, || {
                    phrases::call_declined(name)
                })
            }
            _ => Outcome::done(phrases::cancelled(Some(kind))),
        }
    }

    async fn send_sticker(&self, target: &Target, sticker: Option<StickerRef>) -> Outcome {
        let kind = "send_sticker";
        let Some(to) = target.recipient() else {
            return missing(kind, "người nhận");
        };
        let Some(sticker) = sticker else {
            return missing(kind, "sticker");
        };
        report(kind, self.chat.send_sticker(&to, &sticker).await, || {
            phrases::sticker_sent(target.display_name())
        })
    }

    async fn send_emoji(&self, target: &Target, emoji: Option<String>) -> Outcome {
        let kind = "send_emoji";
        let Some(to) = target.recipient() else {
            return missing(kind, "người nhận");
        };
        let Some(emoji) = emoji else {
            return missing(kind, "biểu tượng cảm xúc");
        };
        report(kind, self.chat.send_emoji(&to, &emoji).await, || {
            phrases::emoji_sent(target.display_name())
        })
    }

    async fn create_group(&self, group_name: &str, member_ids: &[String]) -> Outcome {
        let kind = "create_group";
        if group_name.trim().is_empty() {
            return missing(kind, "tên nhóm");
        }
        if member_ids.is_empty() {
            return missing(kind, "thành viên");
        }
        match self.chat.create_group(group_name, member_ids).await {
            Ok(group) => {
                tracing::info!(group_id = %group.id, "group created");
                Outcome::done(phrases::group_created(group_name))
            }
            Err(e) => fail(kind, &e),
        }
    }

    async fn join_group(&self, group_id: &str, group_name: Option<&str>) -> Outcome {
        let label = group_name.unwrap_or(group_id);
        report(
            "join_group",
            self.chat.request_join_group(group_id).await,
            || phrases::join_requested(label),
        )
    }

    async fn invite(&self, group_id: &str, group_name: Option<&str>, members: &[String]) -> Outcome {
        if members.is_empty() {
            return missing("invite_to_group", "thành viên");
        }
        let label = group_name.unwrap_or(group_id);
        report(
            "invite_to_group",
            self.chat.add_group_members(group_id, members).await,
            || phrases::members_added(members.len(), label),
        )
    }

    async fn search(&self, query: &str, target: Option<&Target>) -> Outcome {
        let kind = "search_smart";
        if query.trim().is_empty() {
            return missing(kind, "nội dung tìm kiếm");
        }
        match self.chat.search(query).await {
            Ok(results) => search_outcome(query, results, target),
            Err(e) => fail(kind, &e),
        }
    }

    async fn send_choice(
        &self,
        target: &Target,
        candidates: &[AttachmentCandidate],
        selection: Option<usize>,
    ) -> Outcome {
        let kind = "choose_attachment";
        let Some(chosen) = selection
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| candidates.get(i))
        else {
            return Outcome::failed(phrases::INVALID_SELECTION.to_string());
        };
        let Some(to) = target.recipient() else {
            return missing(kind, "người nhận");
        };
        let file = if chosen.name.is_empty() {
            chosen.id.as_str()
        } else {
            chosen.name.as_str()
        };
        report(kind, self.chat.send_attachment(&to, &chosen.id).await, || {
            phrases::attachment_sent(file, target.display_name())
        })
    }
}

/// Turn search hits into speech, offering attachments for forwarding
fn search_outcome(query: &str, results: SearchResults, target: Option<&Target>) -> Outcome {
    let attachments: Vec<AttachmentCandidate> = results
        .items
        .iter()
        .filter(|hit| hit.is_attachment())
        .map(|hit| AttachmentCandidate {
            id: hit.id.clone(),
            name: hit.title.clone(),
        })
        .collect();

    if let Some(target) = target.filter(|t| t.recipient().is_some())
        && !attachments.is_empty()
    {
        let names: Vec<String> = attachments.iter().map(|a| a.name.clone()).collect();
        let prompt = phrases::choose_attachment_prompt(&names);
        tracing::debug!(candidates = attachments.len(), "offering attachments");
        return Outcome {
            speech: prompt.clone(),
            success: true,
            follow_up: Some(PendingAction {
                target: target.clone(),
                prompt: Some(prompt),
                payload: ActionPayload::ChooseAttachment {
                    candidates: attachments,
                },
            }),
        };
    }

    if results.items.is_empty() {
        return Outcome::done(phrases::NO_RESULTS.to_string());
    }
    let speech = results
        .summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| phrases::search_found(results.items.len(), query));
    Outcome::done(speech)
}

fn report(kind: &str, result: crate::Result<()>, success: impl FnOnce() -> String) -> Outcome {
    match result {
        Ok(()) => Outcome::done(success()),
        Err(e) => fail(kind, &e),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn missing(kind: &str, what: &str) -> Outcome {
    tracing::warn!(kind, missing = what, "action is missing required information");
    Outcome::failed(phrases::missing(what))
}

fn fail(kind: &str, error: &crate::Error) -> Outcome {
    tracing::warn!(kind, error = %error, "action failed");
    Outcome::failed(phrases::action_failed(phrases::action_label(kind)))
}
