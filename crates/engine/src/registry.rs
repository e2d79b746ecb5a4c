//! In-memory registry of active message handlers, keyed by endpoint.
//!
//! Invariants it exists to uphold:
//! - one registration per endpoint key, ever (re-register replaces);
//! - an active session owns exactly two registrations (client + staff);
//! - a closed session owns zero.
//!
//! Each register/unregister mutates the gateway's live dispatch set within
//! the same call, so the two tables cannot diverge inside one operation.
//! Divergence from elsewhere (a crash between calls, a platform-side reset)
//! shows up in [`HandlerRegistry::stats`] as a count mismatch — a zombie —
//! and is converged by the pointer auditor.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use dr_domain::{EndpointKey, InboundMessage};

use crate::gateway::MessagingGateway;

/// An active message handler.  Implementations resolve the *current*
/// session from the persisted pointer; they never act on state captured at
/// registration time.
#[async_trait::async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage) -> bool;
}

/// One live registration.
#[derive(Clone)]
pub struct Registration {
    pub key: EndpointKey,
    pub owner_client_id: i64,
    pub owner_session_id: String,
    pub handler: Arc<dyn InboundHandler>,
    pub registered_at: DateTime<Utc>,
}

/// Diagnostic snapshot.  `total_registered != gateway_live` means a zombie:
/// a handler on one side that the other side no longer knows about.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_registered: usize,
    pub by_owner: HashMap<i64, usize>,
    pub gateway_live: usize,
}

impl RegistryStats {
    pub fn has_zombies(&self) -> bool {
        self.total_registered != self.gateway_live
    }
}

/// Bookkeeping table plus the synchronized gateway dispatch set.
pub struct HandlerRegistry {
    gateway: Arc<dyn MessagingGateway>,
    table: RwLock<HashMap<EndpointKey, Registration>>,
}

impl HandlerRegistry {
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        Self {
            gateway,
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a registration.  If the key is already taken the old entry is
    /// removed first — that indicates a caller bug, so it is logged, but it
    /// must not crash anything.  Safe to call repeatedly.
    pub fn register(
        &self,
        key: EndpointKey,
        owner_client_id: i64,
        owner_session_id: &str,
        handler: Arc<dyn InboundHandler>,
    ) {
        let mut table = self.table.write();
        if let Some(prior) = table.remove(&key) {
            tracing::warn!(
                key = %key,
                prior_session = %prior.owner_session_id,
                session = %owner_session_id,
                "replacing existing handler registration"
            );
            self.gateway.unbind_dispatch(&key);
        }
        self.gateway.bind_dispatch(&key);
        table.insert(
            key.clone(),
            Registration {
                key,
                owner_client_id,
                owner_session_id: owner_session_id.to_owned(),
                handler,
                registered_at: Utc::now(),
            },
        );
    }

    /// Remove a registration if present.  Never errors.
    pub fn unregister(&self, key: &EndpointKey) -> bool {
        let mut table = self.table.write();
        if table.remove(key).is_some() {
            self.gateway.unbind_dispatch(key);
            tracing::debug!(key = %key, "handler unregistered");
            true
        } else {
            false
        }
    }

    /// Remove every registration owned by a client.  Safety net for stray
    /// entries left behind by earlier desyncs; returns the count removed.
    pub fn cleanup_by_owner(&self, owner_client_id: i64) -> usize {
        let mut table = self.table.write();
        let doomed: Vec<EndpointKey> = table
            .values()
            .filter(|r| r.owner_client_id == owner_client_id)
            .map(|r| r.key.clone())
            .collect();
        for key in &doomed {
            table.remove(key);
            self.gateway.unbind_dispatch(key);
        }
        if !doomed.is_empty() {
            tracing::info!(
                client_id = owner_client_id,
                removed = doomed.len(),
                "cleaned up handler registrations by owner"
            );
        }
        doomed.len()
    }

    /// Remove every registration owned by a session; returns the count
    /// removed.  A key the client's newer session has since claimed carries
    /// that session's id and is left alone, so closing an older session
    /// cannot unhook a live one.
    pub fn cleanup_by_session(&self, owner_session_id: &str) -> usize {
        let mut table = self.table.write();
        let doomed: Vec<EndpointKey> = table
            .values()
            .filter(|r| r.owner_session_id == owner_session_id)
            .map(|r| r.key.clone())
            .collect();
        for key in &doomed {
            table.remove(key);
            self.gateway.unbind_dispatch(key);
        }
        if !doomed.is_empty() {
            tracing::debug!(
                session_id = owner_session_id,
                removed = doomed.len(),
                "cleaned up handler registrations by session"
            );
        }
        doomed.len()
    }

    /// Look up the handler for an endpoint key.
    pub fn get(&self, key: &EndpointKey) -> Option<Arc<dyn InboundHandler>> {
        self.table.read().get(key).map(|r| r.handler.clone())
    }

    /// Diagnostic snapshot; see [`RegistryStats`].
    pub fn stats(&self) -> RegistryStats {
        let table = self.table.read();
        let mut by_owner: HashMap<i64, usize> = HashMap::new();
        for reg in table.values() {
            *by_owner.entry(reg.owner_client_id).or_default() += 1;
        }
        RegistryStats {
            total_registered: table.len(),
            by_owner,
            gateway_live: self.gateway.live_dispatch_count(),
        }
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    use dr_domain::{Endpoint, GatewayError};

    use crate::gateway::{GatewayResult, MessageRef};

    /// Gateway stub that only tracks the dispatch set.
    #[derive(Default)]
    struct DispatchOnlyGateway {
        live: Mutex<HashSet<String>>,
    }

    #[async_trait::async_trait]
    impl MessagingGateway for DispatchOnlyGateway {
        async fn send_text(&self, _: Endpoint, _: &str) -> GatewayResult<MessageRef> {
            Ok(MessageRef::generate())
        }
        async fn send_media(
            &self,
            _: Endpoint,
            _: &str,
            _: &str,
            _: &str,
        ) -> GatewayResult<MessageRef> {
            Ok(MessageRef::generate())
        }
        async fn create_sub_channel(&self, _: i64, _: &str) -> GatewayResult<i64> {
            Err(GatewayError::Other("not supported".into()))
        }
        async fn rename_sub_channel(&self, _: i64, _: i64, _: &str) -> GatewayResult<()> {
            Ok(())
        }
        fn bind_dispatch(&self, key: &EndpointKey) {
            self.live.lock().insert(key.as_str().to_owned());
        }
        fn unbind_dispatch(&self, key: &EndpointKey) {
            self.live.lock().remove(key.as_str());
        }
        fn live_dispatch_count(&self) -> usize {
            self.live.lock().len()
        }
    }

    struct NopHandler;

    #[async_trait::async_trait]
    impl InboundHandler for NopHandler {
        async fn handle(&self, _: InboundMessage) -> bool {
            true
        }
    }

    fn registry() -> (Arc<DispatchOnlyGateway>, HandlerRegistry) {
        let gateway = Arc::new(DispatchOnlyGateway::default());
        let registry = HandlerRegistry::new(gateway.clone());
        (gateway, registry)
    }

    #[test]
    fn register_replaces_duplicate_key() {
        let (gateway, registry) = registry();
        let key = EndpointKey::user(7);
        registry.register(key.clone(), 7, "support_1", Arc::new(NopHandler));
        registry.register(key.clone(), 7, "support_2", Arc::new(NopHandler));

        assert_eq!(registry.len(), 1);
        assert_eq!(gateway.live_dispatch_count(), 1);
        assert!(!registry.stats().has_zombies());
    }

    #[test]
    fn unregister_is_idempotent() {
        let (_, registry) = registry();
        let key = EndpointKey::thread(-100, 9);
        registry.register(key.clone(), 7, "support_1", Arc::new(NopHandler));
        assert!(registry.unregister(&key));
        assert!(!registry.unregister(&key));
        assert!(registry.is_empty());
    }

    #[test]
    fn cleanup_by_owner_removes_all_of_a_client() {
        let (gateway, registry) = registry();
        registry.register(EndpointKey::user(7), 7, "support_1", Arc::new(NopHandler));
        registry.register(
            EndpointKey::thread(-100, 9),
            7,
            "support_1",
            Arc::new(NopHandler),
        );
        registry.register(EndpointKey::user(8), 8, "support_2", Arc::new(NopHandler));

        assert_eq!(registry.cleanup_by_owner(7), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(gateway.live_dispatch_count(), 1);
        assert_eq!(registry.cleanup_by_owner(7), 0);
    }

    #[test]
    fn cleanup_by_session_spares_the_same_clients_other_session() {
        let (gateway, registry) = registry();
        // One client, two sessions: the newer one took over the user key.
        registry.register(EndpointKey::user(7), 7, "support_2", Arc::new(NopHandler));
        registry.register(
            EndpointKey::thread(-100, 9),
            7,
            "support_1",
            Arc::new(NopHandler),
        );
        registry.register(
            EndpointKey::thread(-100, 10),
            7,
            "support_2",
            Arc::new(NopHandler),
        );

        assert_eq!(registry.cleanup_by_session("support_1"), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(gateway.live_dispatch_count(), 2);
        assert!(registry.get(&EndpointKey::user(7)).is_some());
        assert!(registry.get(&EndpointKey::thread(-100, 10)).is_some());
        assert_eq!(registry.cleanup_by_session("support_1"), 0);
    }

    #[test]
    fn stats_detect_zombie_from_counts_alone() {
        let (gateway, registry) = registry();
        let key = EndpointKey::user(7);
        registry.register(key.clone(), 7, "support_1", Arc::new(NopHandler));
        assert!(!registry.stats().has_zombies());

        // Platform-side handler disappears behind the registry's back.
        gateway.unbind_dispatch(&key);
        let stats = registry.stats();
        assert_eq!(stats.total_registered, 1);
        assert_eq!(stats.gateway_live, 0);
        assert!(stats.has_zombies());
    }

    #[test]
    fn stats_by_owner_counts() {
        let (_, registry) = registry();
        registry.register(EndpointKey::user(7), 7, "support_1", Arc::new(NopHandler));
        registry.register(
            EndpointKey::thread(-100, 9),
            7,
            "support_1",
            Arc::new(NopHandler),
        );
        let stats = registry.stats();
        assert_eq!(stats.by_owner.get(&7), Some(&2));
    }
}
