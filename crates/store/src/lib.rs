//! Durable storage for DeskRelay.
//!
//! The engine sees storage through the [`SupportStore`] trait: synchronous,
//! short-lived transactions over session, client, and ticket rows.  The
//! operations that must be atomic as a unit (`create_session`,
//! `close_session`) are single trait calls, so any implementation can wrap
//! them in one transaction.
//!
//! [`JsonFileStore`] is the reference implementation, persisting everything
//! to a single JSON file under a state directory.

pub mod file;
pub mod records;

pub use file::JsonFileStore;
pub use records::{ClientRecord, SessionPointer, SessionRecord, TicketRecord, TicketStatus};

use dr_domain::Result;

/// Transactional CRUD contract for the persistent store.
///
/// All methods are short-lived transactions: commit-on-success, rollback on
/// error.  Nothing here is async; callers hold no locks across these calls.
pub trait SupportStore: Send + Sync {
    // ── Sessions ─────────────────────────────────────────────────────

    /// Insert a new session row and set the owning client's pointer, as one
    /// transaction.  Fails with `Error::Store` if the session id exists.
    fn create_session(&self, record: SessionRecord, pointer: SessionPointer) -> Result<()>;

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// The active session bound to a ticket, if any.  Precondition check for
    /// session creation; always hits the store, never a cache.
    fn active_session_for_ticket(&self, ticket_id: i64) -> Result<Option<SessionRecord>>;

    fn active_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// Apply a mutation to a session row.  Returns `false` if the row is
    /// absent.  `updated_at` is the mutator's responsibility.
    fn update_session(
        &self,
        session_id: &str,
        mutate: &mut dyn FnMut(&mut SessionRecord),
    ) -> Result<bool>;

    /// Close a session: mark `status=closed`, fill the closure fields, and
    /// clear the owning client's pointer **iff it still names this session**
    /// — all one transaction.  Returns the updated row, or `None` if the
    /// session is absent or already closed (idempotent close).
    fn close_session(
        &self,
        session_id: &str,
        closed_by: &str,
        reason: Option<&str>,
    ) -> Result<Option<SessionRecord>>;

    // ── Clients & pointers ───────────────────────────────────────────

    fn get_client(&self, client_id: i64) -> Result<Option<ClientRecord>>;

    fn upsert_client(&self, client: ClientRecord) -> Result<()>;

    /// Fresh read of the client's persisted session pointer.
    fn pointer(&self, client_id: i64) -> Result<Option<SessionPointer>>;

    fn set_pointer(&self, client_id: i64, pointer: SessionPointer) -> Result<()>;

    /// Clear the pointer only if it currently names `session_id`.  Returns
    /// whether it was cleared.  Guards against clobbering a pointer that was
    /// already reassigned to a newer session.
    fn clear_pointer_if(&self, client_id: i64, session_id: &str) -> Result<bool>;

    /// Unconditional pointer clear.  Returns whether a pointer was present.
    fn clear_pointer(&self, client_id: i64) -> Result<bool>;

    /// Every client currently holding a non-empty pointer.  Audit input.
    fn clients_with_pointer(&self) -> Result<Vec<(i64, SessionPointer)>>;

    // ── Tickets ──────────────────────────────────────────────────────

    fn get_ticket(&self, ticket_id: i64) -> Result<Option<TicketRecord>>;

    fn upsert_ticket(&self, ticket: TicketRecord) -> Result<()>;

    /// Apply a mutation to a ticket row.  Returns `false` if absent.
    fn update_ticket(
        &self,
        ticket_id: i64,
        mutate: &mut dyn FnMut(&mut TicketRecord),
    ) -> Result<bool>;

    /// Most recent tickets for a client, newest first.
    fn tickets_for_client(&self, client_id: i64, limit: usize) -> Result<Vec<TicketRecord>>;
}
