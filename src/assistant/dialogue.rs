//! Decide what a service response means for the pending slot
//!
//! Order of precedence:
//! 1. an immediate client action (including universal cancel)
//! 2. a reply to a pending file selection
//! 3. a yes/no reply to any other pending action
//! 4. the service's own pending update and reply text

use crate::service::CommandResult;

use super::confirmation::{is_confirmation, parse_selection_index};
use super::pending::{ActionPayload, ClientAction, PendingAction, PendingUpdate};
use super::phrases;
use super::state::EngineState;

/// What the engine should do with a response
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Run the pending action the user confirmed
    ExecutePending {
        action: PendingAction,
        /// 1-based choice for file selections
        selection: Option<usize>,
    },
    /// Run an action the service asked for directly
    ExecuteClient(ClientAction),
    /// The user said no to the pending action
    Reject(PendingAction),
    /// The service cancelled whatever was pending
    Cancelled { cancelled_type: Option<String> },
    /// A selection was out of range; the pending action stays
    InvalidSelection,
    /// Speak text; a pending action, if any, awaits a reply
    Speak(String),
}

/// Resolve a response against the engine state
///
/// `was_reply` is true when the clip was recorded as an answer to a
/// pending action.
pub fn decide(state: &mut EngineState, result: &CommandResult, was_reply: bool) -> Decision {
    if let Some(action) = &result.client_action {
        if let ClientAction::Cancel { cancelled_type } = action {
            let cleared = state.take_pending();
            return Decision::Cancelled {
                cancelled_type: cancelled_type
                    .clone()
                    .or_else(|| cleared.map(|p| p.kind().to_string())),
            };
        }
        apply_update(state, &result.pending);
        return Decision::ExecuteClient(action.clone());
    }

    if was_reply && let Some(pending) = state.pending() {
        let choices = match &pending.payload {
            ActionPayload::ChooseAttachment { candidates } => Some(candidates.len()),
            _ => None,
        };

        if let Some(available) = choices
            && let Some(index) = parse_selection_index(&result.transcript)
        {
            if (1..=available).contains(&index)
                && let Some(action) = state.take_pending()
            {
                return Decision::ExecutePending {
                    action,
                    selection: Some(index),
                };
            }
            tracing::info!(index, available, "selection out of range");
            return Decision::InvalidSelection;
        }

        let verdict = is_confirmation(&result.transcript);
        if verdict.is_rejected
            && let Some(action) = state.take_pending()
        {
            return Decision::Reject(action);
        }
        if verdict.is_confirmed
            && choices.is_none()
            && let Some(action) = state.take_pending()
        {
            return Decision::ExecutePending {
                action,
                selection: None,
            };
        }
    }

    apply_update(state, &result.pending);

    if result.needs_confirmation
        && let Some(pending) = state.pending()
    {
        let speech = if result.reply.trim().is_empty() {
            pending
                .prompt
                .clone()
                .unwrap_or_else(|| phrases::DEFAULT_CONFIRM.to_string())
        } else {
            result.reply.clone()
        };
        return Decision::Speak(speech);
    }

    Decision::Speak(result.reply.clone())
}

fn apply_update(state: &mut EngineState, update: &PendingUpdate) {
    match update {
        PendingUpdate::Unchanged => {}
        PendingUpdate::Clear => {
            if let Some(cleared) = state.take_pending() {
                tracing::debug!(kind = cleared.kind(), "service cleared pending action");
            }
        }
        PendingUpdate::Set(action) => {
            state.set_pending(action.clone());
        }
    }
}
