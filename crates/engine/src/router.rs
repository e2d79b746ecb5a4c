//! Message routing between session participants.
//!
//! Both directions re-validate against the persisted pointer on every
//! message — the claimed session id a handler carries is a hint from
//! registration time, and handlers can outlive session transitions.  The
//! two directions differ in who wins a disagreement: the pointer wins for
//! client messages (it is the durable truth for "which session is this
//! client in"), while the staff sub-channel wins for staff messages (the
//! thread maps one-to-one to a session) and repairs the pointer to match.

use std::sync::Arc;

use serde_json::json;

use dr_domain::{Endpoint, InboundMessage, Result};
use dr_store::SessionRecord;

use crate::Engine;

/// Caption prefix on media forwarded to the staff thread.
const CLIENT_MEDIA_PREFIX: &str = "📥 Client: ";
/// Caption prefix on media forwarded to the client.
const STAFF_MEDIA_PREFIX: &str = "💬 Support: ";

impl Engine {
    /// Route a client message to their session's staff sub-channel.
    /// Returns whether the message was delivered.
    pub async fn route_client_message(
        self: &Arc<Self>,
        message: &InboundMessage,
        claimed_session_id: &str,
    ) -> bool {
        match self.route_client_inner(message, claimed_session_id).await {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::error!(claimed_session_id, error = %e, "client routing failed");
                false
            }
        }
    }

    async fn route_client_inner(
        self: &Arc<Self>,
        message: &InboundMessage,
        claimed_session_id: &str,
    ) -> Result<bool> {
        let client_id = message.from_id;

        // Always a fresh pointer read; never the handler's captured value.
        let Some(pointer) = self.store.pointer(client_id)? else {
            tracing::warn!(client_id, claimed_session_id, "client message with no pointer");
            self.stale_client_cleanup(client_id)?;
            return Ok(false);
        };
        if pointer.session_id != claimed_session_id {
            tracing::warn!(
                client_id,
                claimed_session_id,
                pointer_session_id = %pointer.session_id,
                "handler session id desynced from pointer, using pointer"
            );
        }
        let session_id = pointer.session_id;

        let session = self.store.get_session(&session_id)?;
        let Some(session) = session.filter(SessionRecord::is_active) else {
            self.stale_client_cleanup(client_id)?;
            return Ok(false);
        };

        let variables = json!({
            "client_name": "Client",
            "message": message.content.as_text().unwrap_or_default(),
            "session_id": session_id,
        });
        let delivered = match self
            .outbound
            .forward_now(
                session.staff_endpoint(),
                &message.content,
                "staff_client_message",
                &variables,
                CLIENT_MEDIA_PREFIX,
            )
            .await
        {
            Ok(_) => true,
            Err(e) if e.is_endpoint_gone() => {
                tracing::warn!(
                    session_id = %session_id,
                    thread_id = session.thread_id,
                    "staff sub-channel gone, recreating"
                );
                let restored = self.recreate_endpoint(&session).await?;
                // One retry against the fresh endpoint; any further failure
                // surfaces as an undelivered message.
                match self
                    .outbound
                    .forward_now(
                        restored.staff_endpoint(),
                        &message.content,
                        "staff_client_message",
                        &variables,
                        CLIENT_MEDIA_PREFIX,
                    )
                    .await
                {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(session_id = %session_id, error = %e, "retry after endpoint recreation failed");
                        false
                    }
                }
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "delivery to staff failed");
                false
            }
        };

        if delivered {
            self.record_activity(&session_id)?;
        }
        Ok(delivered)
    }

    /// Route a staff message (or command) to the session's client.
    pub async fn route_staff_message(
        self: &Arc<Self>,
        message: &InboundMessage,
        session_id: &str,
    ) -> bool {
        match self.route_staff_inner(message, session_id).await {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::error!(session_id, error = %e, "staff routing failed");
                false
            }
        }
    }

    async fn route_staff_inner(
        self: &Arc<Self>,
        message: &InboundMessage,
        session_id: &str,
    ) -> Result<bool> {
        if message.is_command() {
            return Ok(self.process_command(message, session_id).await);
        }

        let Some(session) = self.store.get_session(session_id)? else {
            tracing::warn!(session_id, "staff message for unknown session");
            return Ok(false);
        };
        if !session.is_active() {
            let origin = match (message.group_id, message.thread_id) {
                (Some(group_id), Some(thread_id)) => Endpoint::thread(group_id, thread_id),
                _ => session.staff_endpoint(),
            };
            self.outbound
                .notify(origin, "ticket_already_closed", &json!({}));
            return Ok(false);
        }

        // This thread maps to exactly one session, so for this direction
        // the session row is authoritative; repair the pointer if it
        // wandered.
        let pointer_ok = self
            .store
            .pointer(session.client_id)?
            .is_some_and(|p| p.session_id == session_id);
        if !pointer_ok {
            tracing::warn!(
                session_id,
                client_id = session.client_id,
                "pointer disagrees with staff-side session, repairing"
            );
            self.store.set_pointer(
                session.client_id,
                dr_store::SessionPointer {
                    session_id: session_id.to_owned(),
                    ticket_id: session.ticket_id,
                    thread_id: session.thread_id,
                    staff_id: session.staff_id,
                    saved_at: chrono::Utc::now(),
                },
            )?;
        }

        let variables = json!({
            "message": message.content.as_text().unwrap_or_default(),
        });
        match self
            .outbound
            .forward_now(
                session.client_endpoint(),
                &message.content,
                "client_staff_message",
                &variables,
                STAFF_MEDIA_PREFIX,
            )
            .await
        {
            Ok(_) => {
                self.record_activity(session_id)?;
                Ok(true)
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "delivery to client failed");
                Ok(false)
            }
        }
    }

    /// The staff sub-channel was deleted on the platform side: allocate a
    /// replacement, re-point the session row, swap the staff handler to the
    /// new key, and tell both parties.
    pub(crate) async fn recreate_endpoint(
        self: &Arc<Self>,
        session: &SessionRecord,
    ) -> Result<SessionRecord> {
        let mut name = format!("Ticket #{} [RESTORED]", session.ticket_id);
        if let Some(category) = self
            .store
            .get_ticket(session.ticket_id)?
            .and_then(|t| t.category)
        {
            name.push_str(&format!(" [{category}]"));
        }

        let new_thread_id = self
            .gateway
            .create_sub_channel(session.group_id, &name)
            .await?;

        self.store.update_session(&session.session_id, &mut |s| {
            s.thread_id = new_thread_id;
            s.updated_at = chrono::Utc::now();
        })?;

        let mut restored = session.clone();
        restored.thread_id = new_thread_id;

        // Re-key the staff handler; the client handler is untouched.
        self.registry
            .unregister(&dr_domain::EndpointKey::thread(
                session.group_id,
                session.thread_id,
            ));
        let (_, staff_handler) = crate::handlers::session_handlers(self, &session.session_id);
        self.registry.register(
            dr_domain::EndpointKey::thread(session.group_id, new_thread_id),
            session.client_id,
            &session.session_id,
            staff_handler,
        );

        self.outbound.notify(
            restored.staff_endpoint(),
            "endpoint_restored",
            &json!({ "session_id": session.session_id }),
        );
        self.outbound.notify(
            restored.client_endpoint(),
            "endpoint_restored_client",
            &json!({}),
        );

        tracing::info!(
            session_id = %session.session_id,
            old_thread_id = session.thread_id,
            new_thread_id,
            "staff endpoint recreated"
        );
        Ok(restored)
    }

    /// Shared teardown for a client whose pointer leads nowhere: clear it,
    /// evict their registrations, and tell them the ticket is no longer
    /// open.  No message is ever misdelivered through a dead pointer.
    fn stale_client_cleanup(&self, client_id: i64) -> Result<()> {
        self.store.clear_pointer(client_id)?;
        self.registry.cleanup_by_owner(client_id);
        self.outbound
            .notify(Endpoint::user(client_id), "no_active_session", &json!({}));
        Ok(())
    }
}
