//! Endpoints and their dispatch keys.
//!
//! An endpoint is where a message is sent or received: a direct-message user
//! (the client side) or a sub-channel thread inside the staff group (the
//! staff side).  Each live registration in the handler registry is keyed by
//! the endpoint's stable string key:
//!
//! - `user:<id>:<state-tag>`       (client, tag = `has_ticket`)
//! - `thread:<groupId>:<threadId>` (staff sub-channel)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AWAITING_STATE_TAG;

/// An addressable target for sending and receiving messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    /// A direct-message user.
    User { id: i64 },
    /// A sub-channel thread within a group.
    ChannelThread { group_id: i64, thread_id: i64 },
}

impl Endpoint {
    pub fn user(id: i64) -> Self {
        Self::User { id }
    }

    pub fn thread(group_id: i64, thread_id: i64) -> Self {
        Self::ChannelThread {
            group_id,
            thread_id,
        }
    }

    /// The dispatch key this endpoint registers under.
    pub fn key(&self) -> EndpointKey {
        match self {
            Self::User { id } => EndpointKey::user(*id),
            Self::ChannelThread {
                group_id,
                thread_id,
            } => EndpointKey::thread(*group_id, *thread_id),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { id } => write!(f, "user {id}"),
            Self::ChannelThread {
                group_id,
                thread_id,
            } => write!(f, "thread {thread_id} in group {group_id}"),
        }
    }
}

/// Stable string key a handler registers under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointKey(String);

impl EndpointKey {
    /// Key for a client's DM handler.  Includes the awaiting-state tag so
    /// the handler only matches while the client holds an open ticket.
    pub fn user(id: i64) -> Self {
        Self(format!("user:{id}:{AWAITING_STATE_TAG}"))
    }

    /// Key for a staff sub-channel handler.
    pub fn thread(group_id: i64, thread_id: i64) -> Self {
        Self(format!("thread:{group_id}:{thread_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
