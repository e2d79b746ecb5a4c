//! Inbound message value types.

use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointKey;
use crate::{AWAITING_STATE_TAG, COMMAND_SENTINEL};

/// Payload of an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    /// Anything that isn't plain text (photo, document, voice, ...).
    /// Forwarded by reference rather than re-rendered.
    Media { media_kind: String, file_ref: String },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Media { .. } => None,
        }
    }
}

/// An inbound message as handed to the dispatch layer by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Sender's user id.
    pub from_id: i64,
    /// Group the message arrived in, if any.
    pub group_id: Option<i64>,
    /// Sub-channel thread within the group, if any.
    pub thread_id: Option<i64>,
    pub content: MessageContent,
}

impl InboundMessage {
    pub fn direct(from_id: i64, content: MessageContent) -> Self {
        Self {
            from_id,
            group_id: None,
            thread_id: None,
            content,
        }
    }

    pub fn in_thread(from_id: i64, group_id: i64, thread_id: i64, content: MessageContent) -> Self {
        Self {
            from_id,
            group_id: Some(group_id),
            thread_id: Some(thread_id),
            content,
        }
    }

    /// Whether the text starts with the staff-command sentinel.
    pub fn is_command(&self) -> bool {
        self.content
            .as_text()
            .is_some_and(|t| t.starts_with(COMMAND_SENTINEL))
    }

    /// The dispatch key this message should be matched against.
    ///
    /// Thread messages resolve to the thread key; direct messages to the
    /// sender's user key (with the awaiting-state tag baked in, see
    /// [`AWAITING_STATE_TAG`]).
    pub fn dispatch_key(&self) -> EndpointKey {
        match (self.group_id, self.thread_id) {
            (Some(group_id), Some(thread_id)) => EndpointKey::thread(group_id, thread_id),
            _ => EndpointKey::user(self.from_id),
        }
    }
}
