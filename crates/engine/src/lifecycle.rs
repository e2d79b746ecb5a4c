//! Session lifecycle: create, transition, close, restore, and the two
//! reconciliation loop bodies (stale-session reaper, pointer auditor).
//!
//! Two sources of truth exist by design: the durable session row + client
//! pointer in the store, and the in-memory handler registry.  Creation and
//! closing keep them in step inside one call; the auditor re-converges them
//! after anything slips through (spec'd to within one audit interval).
//! On restore the durable session row wins — the pointer may itself be
//! stale.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

use dr_domain::{EndpointKey, Error, Result, SessionState};
use dr_store::{SessionPointer, SessionRecord, TicketRecord, TicketStatus};

use crate::handlers::session_handlers;
use crate::Engine;

impl Engine {
    /// Create a session for a waiting ticket accepted by `staff_id`.
    ///
    /// Order matters: the sub-channel is allocated first, so a gateway
    /// failure aborts with nothing persisted; the session row and pointer
    /// then commit as one store transaction; handler registration and
    /// welcome notices follow.
    pub async fn create_session(
        self: &Arc<Self>,
        ticket_id: i64,
        staff_id: i64,
        context: Map<String, Value>,
    ) -> Result<String> {
        let ticket = self
            .store
            .get_ticket(ticket_id)?
            .ok_or_else(|| Error::Other(format!("ticket {ticket_id} not found")))?;

        // Checked against the store, never a cache.
        if self.store.active_session_for_ticket(ticket_id)?.is_some() {
            return Err(Error::SessionAlreadyActive { ticket_id });
        }

        let group_id = self.config.group_id;
        if group_id == 0 {
            return Err(Error::Config("group_id not configured".into()));
        }

        let client_name = self
            .store
            .get_client(ticket.client_id)?
            .and_then(|c| c.display_name)
            .unwrap_or_else(|| format!("Client {}", ticket.client_id));

        let thread_id = self
            .gateway
            .create_sub_channel(group_id, &open_topic_name(&ticket))
            .await?;

        let record = SessionRecord::new(
            ticket_id,
            ticket.client_id,
            staff_id,
            group_id,
            thread_id,
            context,
        );
        let session_id = record.session_id.clone();
        let pointer = SessionPointer {
            session_id: session_id.clone(),
            ticket_id,
            thread_id,
            staff_id: Some(staff_id),
            saved_at: Utc::now(),
        };
        self.store.create_session(record.clone(), pointer)?;

        self.register_session_handlers(&record);

        self.store.update_ticket(ticket_id, &mut |t| {
            t.status = TicketStatus::InProgress;
        })?;

        let category = ticket.category.clone().unwrap_or_else(|| "general".into());
        self.outbound.notify(
            record.client_endpoint(),
            "dialogue_started",
            &json!({ "ticket_id": ticket_id, "category": category }),
        );
        self.outbound.notify(
            record.staff_endpoint(),
            "staff_ticket_info",
            &json!({
                "ticket_id": ticket_id,
                "client_name": client_name,
                "client_id": ticket.client_id,
                "category": category,
                "subject": ticket.subject.clone().unwrap_or_else(|| "No subject".into()),
                "description": ticket.description.clone().unwrap_or_else(|| "No description".into()),
            }),
        );

        tracing::info!(
            session_id = %session_id,
            ticket_id,
            staff_id,
            thread_id,
            "session created"
        );
        Ok(session_id)
    }

    /// Close a session.  Idempotent: closing an already-closed (or unknown)
    /// session returns `Ok(false)` and touches nothing.
    pub async fn close_session(
        &self,
        session_id: &str,
        closed_by: &str,
        reason: Option<&str>,
    ) -> Result<bool> {
        // Status flip + guarded pointer clear, one store transaction.
        let Some(closed) = self.store.close_session(session_id, closed_by, reason)? else {
            tracing::debug!(session_id, "close requested for non-active session");
            return Ok(false);
        };

        // Rename the sub-channel to show its outcome.  Best effort: the
        // thread may already be gone.
        let closed_name = closed_topic_name(closed.state, closed.ticket_id);
        if let Err(e) = self
            .gateway
            .rename_sub_channel(closed.group_id, closed.thread_id, &closed_name)
            .await
        {
            tracing::warn!(session_id, error = %e, "failed to rename closed sub-channel");
        }

        let reason_text = reason.unwrap_or("No reason provided").to_owned();
        let (ticket_status, resolution) = match closed.state {
            SessionState::Spam => (TicketStatus::Spam, "Marked as spam".to_owned()),
            SessionState::Resolved => (TicketStatus::Resolved, reason_text.clone()),
            _ => (
                TicketStatus::Closed,
                format!("Closed by {closed_by}"),
            ),
        };
        self.store.update_ticket(closed.ticket_id, &mut |t| {
            t.status = ticket_status;
            t.resolution = Some(resolution.clone());
            t.resolved_at = Some(Utc::now());
        })?;

        let (client_template, staff_template) = if closed_by == "system" {
            ("dialogue_auto_closed", "staff_dialogue_auto_closed")
        } else {
            ("dialogue_closed", "staff_dialogue_closed")
        };
        self.outbound.notify(
            closed.client_endpoint(),
            client_template,
            &json!({ "ticket_id": closed.ticket_id, "reason": reason_text }),
        );
        self.outbound.notify(
            closed.staff_endpoint(),
            staff_template,
            &json!({
                "session_id": session_id,
                "closed_by": closed_by,
                "reason": reason_text,
            }),
        );

        // Tear down exactly this session's registrations, wherever their
        // keys ended up.  The client may have a newer session holding the
        // user key; that one stays live.
        self.registry.cleanup_by_session(session_id);

        tracing::info!(session_id, closed_by, "session closed");
        Ok(true)
    }

    /// Transition a session's fine-grained state, merging `context_patch`
    /// into its context bag.  Returns `Ok(false)` if the session is absent;
    /// an unreachable transition is an error.
    pub fn update_state(
        &self,
        session_id: &str,
        new_state: SessionState,
        context_patch: Option<Map<String, Value>>,
    ) -> Result<bool> {
        let Some(session) = self.store.get_session(session_id)? else {
            tracing::warn!(session_id, "state update for unknown session");
            return Ok(false);
        };
        if !session.state.can_transition(new_state) {
            return Err(Error::InvalidTransition {
                from: session.state,
                to: new_state,
            });
        }

        let old_state = session.state;
        self.store.update_session(session_id, &mut |s| {
            s.state = new_state;
            if let Some(patch) = &context_patch {
                for (k, v) in patch {
                    s.context.insert(k.clone(), v.clone());
                }
            }
            s.updated_at = Utc::now();
        })?;

        tracing::info!(session_id, from = %old_state, to = %new_state, "session state updated");
        Ok(true)
    }

    /// Bump message count and last-activity time.  Called on every
    /// successfully routed message in either direction.
    pub fn record_activity(&self, session_id: &str) -> Result<()> {
        self.store.update_session(session_id, &mut |s| {
            s.message_count += 1;
            s.last_activity_at = Utc::now();
        })?;
        Ok(())
    }

    pub fn get_session_info(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.store.get_session(session_id)
    }

    /// Re-register handlers for every active session after a restart, and
    /// repair any pointer that disagrees with its session row.  The row is
    /// authoritative here; the pointer may be stale.  Returns the number of
    /// sessions restored.
    pub fn restore_on_startup(self: &Arc<Self>) -> Result<usize> {
        let mut restored = 0;
        for record in self.store.active_sessions()? {
            self.register_session_handlers(&record);

            let pointer_ok = self
                .store
                .pointer(record.client_id)?
                .is_some_and(|p| p.session_id == record.session_id);
            if !pointer_ok {
                tracing::warn!(
                    session_id = %record.session_id,
                    client_id = record.client_id,
                    "pointer disagrees with active session on restore, repairing"
                );
                self.store.set_pointer(
                    record.client_id,
                    SessionPointer {
                        session_id: record.session_id.clone(),
                        ticket_id: record.ticket_id,
                        thread_id: record.thread_id,
                        staff_id: record.staff_id,
                        saved_at: Utc::now(),
                    },
                )?;
            }
            restored += 1;
        }
        tracing::info!(restored, "active sessions restored");
        Ok(restored)
    }

    /// One reaper pass: close every active session idle past the configured
    /// threshold, with `closed_by="system"`.  Runs through the same close
    /// path as a staff close, so handlers cannot leak from timeouts.
    pub async fn reap_stale_once(&self) -> Result<usize> {
        let hours = self.config.sessions.inactivity_threshold_hours;
        let cutoff = Utc::now() - Duration::hours(i64::from(hours));
        let reason = format!("auto-closed after {hours} hours of inactivity");

        let mut reaped = 0;
        for record in self.store.active_sessions()? {
            if record.last_activity_at >= cutoff {
                continue;
            }
            tracing::info!(session_id = %record.session_id, "reaping stale session");
            self.store.update_session(&record.session_id, &mut |s| {
                s.state = SessionState::Closed;
            })?;
            if self
                .close_session(&record.session_id, "system", Some(&reason))
                .await?
            {
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    /// One auditor pass: for every client holding a pointer, verify a
    /// matching active session exists; clear the pointer and evict the
    /// client's registrations otherwise.  Returns the number repaired.
    pub fn audit_pointers_once(&self) -> Result<usize> {
        let mut repaired = 0;
        for (client_id, pointer) in self.store.clients_with_pointer()? {
            let valid = self
                .store
                .get_session(&pointer.session_id)?
                .is_some_and(|s| s.is_active() && s.client_id == client_id);
            if valid {
                continue;
            }
            tracing::warn!(
                client_id,
                session_id = %pointer.session_id,
                "pointer names no active session, clearing"
            );
            self.store.clear_pointer(client_id)?;
            self.registry.cleanup_by_owner(client_id);
            repaired += 1;
        }
        Ok(repaired)
    }

    /// Register the client + staff handler pair for a session.
    pub(crate) fn register_session_handlers(self: &Arc<Self>, record: &SessionRecord) {
        let (client_handler, staff_handler) = session_handlers(self, &record.session_id);
        self.registry.register(
            EndpointKey::user(record.client_id),
            record.client_id,
            &record.session_id,
            client_handler,
        );
        self.registry.register(
            EndpointKey::thread(record.group_id, record.thread_id),
            record.client_id,
            &record.session_id,
            staff_handler,
        );
    }
}

/// Sub-channel name for a fresh session.
fn open_topic_name(ticket: &TicketRecord) -> String {
    let mut name = format!("Ticket #{}", ticket.ticket_id);
    if let Some(category) = &ticket.category {
        name.push_str(&format!(" [{category}]"));
    }
    if let Some(subject) = &ticket.subject {
        let short: String = subject.chars().take(30).collect();
        name.push_str(&format!(": {short}"));
    }
    name
}

/// Sub-channel name after closing, keyed on the final state.
fn closed_topic_name(state: SessionState, ticket_id: i64) -> String {
    match state {
        SessionState::Spam => format!("🚫 [SPAM] Ticket #{ticket_id}"),
        SessionState::Resolved => format!("✅ [RESOLVED] Ticket #{ticket_id}"),
        _ => format!("🚫 [CLOSED] Ticket #{ticket_id}"),
    }
}
