//! Per-session inbound handlers.
//!
//! These are the closures of the original design made explicit.  Each one
//! carries only the identity it was registered for plus the session id it
//! was created under — the *claimed* id.  Resolution of the current session
//! always goes through the persisted pointer inside the router; rapid
//! close/reopen cycles mean a handler can outlive the session it was built
//! for, and the claimed id exists precisely so the router can detect that.

use std::sync::{Arc, Weak};

use dr_domain::InboundMessage;

use crate::registry::InboundHandler;
use crate::Engine;

/// Handler for a client's direct messages.
pub(crate) struct ClientHandler {
    pub engine: Weak<Engine>,
    pub claimed_session_id: String,
}

#[async_trait::async_trait]
impl InboundHandler for ClientHandler {
    async fn handle(&self, message: InboundMessage) -> bool {
        let Some(engine) = self.engine.upgrade() else {
            return false;
        };
        // Sentinel-prefixed text is staff-command territory; never a client
        // message to relay.
        if message.is_command() {
            return false;
        }
        engine
            .route_client_message(&message, &self.claimed_session_id)
            .await
    }
}

/// Handler for a session's staff sub-channel.
pub(crate) struct StaffHandler {
    pub engine: Weak<Engine>,
    pub session_id: String,
}

#[async_trait::async_trait]
impl InboundHandler for StaffHandler {
    async fn handle(&self, message: InboundMessage) -> bool {
        let Some(engine) = self.engine.upgrade() else {
            return false;
        };
        engine.route_staff_message(&message, &self.session_id).await
    }
}

/// Build the pair of handlers for a session.
pub(crate) fn session_handlers(
    engine: &Arc<Engine>,
    session_id: &str,
) -> (Arc<ClientHandler>, Arc<StaffHandler>) {
    (
        Arc::new(ClientHandler {
            engine: Arc::downgrade(engine),
            claimed_session_id: session_id.to_owned(),
        }),
        Arc::new(StaffHandler {
            engine: Arc::downgrade(engine),
            session_id: session_id.to_owned(),
        }),
    )
}
