//! Session state machine.
//!
//! `SessionStatus` is the coarse active/closed flag the store indexes on;
//! `SessionState` is the fine-grained stage that drives command gating.
//! The declaration order of `SessionState` is its total order, used for
//! `min_state` comparisons:
//! `WAITING_STAFF < IN_PROGRESS < RESOLVED < CLOSED < SPAM`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coarse status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fine-grained state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Ticket opened, waiting for a staff member to accept it.
    WaitingStaff,
    /// Staff accepted, conversation running.
    InProgress,
    /// Staff marked the issue resolved.
    Resolved,
    /// Terminal.  A reused ticket needs a new session id.
    Closed,
    /// Marked as spam.
    Spam,
}

impl SessionState {
    /// String form used in storage and templates.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingStaff => "waiting_staff",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Spam => "spam",
        }
    }

    /// Whether `self -> to` is a legal transition.
    ///
    /// The machine is `WAITING_STAFF -> IN_PROGRESS -> {RESOLVED, SPAM} ->
    /// CLOSED`, plus a direct `* -> CLOSED` edge for abandonment, timeout,
    /// and cancellation.  `CLOSED` is terminal.
    pub fn can_transition(&self, to: SessionState) -> bool {
        if *self == SessionState::Closed {
            return false;
        }
        match to {
            SessionState::Closed => true,
            SessionState::InProgress => *self == SessionState::WaitingStaff,
            SessionState::Resolved | SessionState::Spam => *self == SessionState::InProgress,
            SessionState::WaitingStaff => false,
        }
    }

    /// Lenient parse for values read back from storage.
    ///
    /// Unknown strings fall back to `WaitingStaff`, loudly: this is recovery
    /// behavior for corrupt rows, never a silent default.  Boundary input
    /// goes through the strict `FromStr` instead.
    pub fn parse_lenient(raw: &str) -> SessionState {
        match raw.parse() {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!(raw, "unrecognized session state in storage, falling back");
                SessionState::WaitingStaff
            }
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "waiting_staff" => Ok(Self::WaitingStaff),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            "spam" => Ok(Self::Spam),
            other => Err(crate::error::Error::Other(format!(
                "unknown session state: {other}"
            ))),
        }
    }
}
