//! Durable records: sessions, clients (with the persisted session pointer),
//! and tickets.
//!
//! Sessions are never deleted.  Closing flips `status` and fills the closure
//! fields; the row stays for audit and export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use dr_domain::{Endpoint, SessionState, SessionStatus};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One tracked client↔staff conversation, bound to a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Stable id derived from the ticket (`support_<ticketId>`).
    pub session_id: String,
    pub ticket_id: i64,
    pub client_id: i64,
    #[serde(default)]
    pub staff_id: Option<i64>,
    /// Staff group the sub-channel lives in.
    pub group_id: i64,
    /// Staff-side sub-channel.  Mutable: endpoint recreation re-points it.
    pub thread_id: i64,
    pub status: SessionStatus,
    /// Reads recover from unrecognized stored values instead of failing
    /// the whole record.
    #[serde(deserialize_with = "lenient_state")]
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    /// `"client"`, `"staff"`, or `"system"`.
    #[serde(default)]
    pub closed_by: Option<String>,
    #[serde(default)]
    pub close_reason: Option<String>,
    #[serde(default)]
    pub message_count: u64,
    /// Opaque key/value bag for handler-specific data.
    #[serde(default)]
    pub context: Map<String, Value>,
}

fn lenient_state<'de, D>(deserializer: D) -> Result<SessionState, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(SessionState::parse_lenient(&raw))
}

impl SessionRecord {
    /// Derive the stable session id for a ticket.
    pub fn id_for_ticket(ticket_id: i64) -> String {
        format!("support_{ticket_id}")
    }

    pub fn new(
        ticket_id: i64,
        client_id: i64,
        staff_id: i64,
        group_id: i64,
        thread_id: i64,
        context: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Self::id_for_ticket(ticket_id),
            ticket_id,
            client_id,
            staff_id: Some(staff_id),
            group_id,
            thread_id,
            status: SessionStatus::Active,
            state: SessionState::InProgress,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
            closed_at: None,
            closed_by: None,
            close_reason: None,
            message_count: 0,
            context,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn client_endpoint(&self) -> Endpoint {
        Endpoint::user(self.client_id)
    }

    pub fn staff_endpoint(&self) -> Endpoint {
        Endpoint::thread(self.group_id, self.thread_id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client + pointer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The durable pointer naming a client's current active session, if any.
///
/// Invariant (eventually, within one audit interval): non-empty iff the
/// client has exactly one active session, with matching `session_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPointer {
    pub session_id: String,
    pub ticket_id: i64,
    pub thread_id: i64,
    #[serde(default)]
    pub staff_id: Option<i64>,
    pub saved_at: DateTime<Utc>,
}

/// A client as far as the router cares: identity plus the session pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: i64,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub pointer: Option<SessionPointer>,
}

impl ClientRecord {
    pub fn new(client_id: i64) -> Self {
        Self {
            client_id,
            display_name: None,
            pointer: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ticket
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Spam,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Spam => "spam",
        }
    }
}

/// The support ticket a session is bound to.  Only the fields the router
/// and command handlers touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRecord {
    pub ticket_id: i64,
    pub client_id: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TicketStatus,
    #[serde(default)]
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TicketRecord {
    pub fn new(ticket_id: i64, client_id: i64) -> Self {
        Self {
            ticket_id,
            client_id,
            category: None,
            subject: None,
            description: None,
            status: TicketStatus::Open,
            resolution: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}
