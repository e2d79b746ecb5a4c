//! DeskRelay core engine.
//!
//! One [`Engine`] instance ties the injected store, messaging gateway, and
//! template renderer to the handler registry, outbound queue, message
//! router, command processor, and session lifecycle manager.  Construct it
//! once at startup, call [`Engine::restore_on_startup`], then
//! [`tasks::spawn_background_tasks`] for the reaper and pointer auditor.

pub mod command;
pub mod gateway;
pub mod handlers;
pub mod lifecycle;
pub mod outbound;
pub mod queue;
pub mod registry;
pub mod router;
pub mod tasks;
pub mod templates;

use std::collections::HashMap;
use std::sync::Arc;

use dr_domain::{builtin_commands, CommandSpec, EngineConfig, InboundMessage, TemplateRenderer};
use dr_store::SupportStore;

use crate::gateway::MessagingGateway;
use crate::outbound::Outbound;
use crate::queue::OutboundQueue;
use crate::registry::{HandlerRegistry, RegistryStats};
use crate::templates::TemplateCatalog;

/// The session routing and handler-lifecycle engine.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn SupportStore>,
    pub(crate) gateway: Arc<dyn MessagingGateway>,
    pub(crate) outbound: Outbound,
    pub(crate) registry: HandlerRegistry,
    pub(crate) commands: HashMap<&'static str, CommandSpec>,
}

impl Engine {
    /// Wire the engine from its injected collaborators.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SupportStore>,
        gateway: Arc<dyn MessagingGateway>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Arc<Self> {
        let queue = Arc::new(OutboundQueue::new(gateway.clone(), config.queue.clone()));
        let outbound = Outbound::new(gateway.clone(), renderer, queue);
        let registry = HandlerRegistry::new(gateway.clone());
        Arc::new(Self {
            config,
            store,
            gateway,
            outbound,
            registry,
            commands: builtin_commands(),
        })
    }

    /// Convenience constructor with the built-in template catalog.
    pub fn with_builtin_templates(
        config: EngineConfig,
        store: Arc<dyn SupportStore>,
        gateway: Arc<dyn MessagingGateway>,
    ) -> Arc<Self> {
        Self::new(config, store, gateway, Arc::new(TemplateCatalog::new()))
    }

    /// Entry point for the dispatch gateway: find the registration matching
    /// the message's endpoint key and invoke it.  Nothing a handler does can
    /// propagate out of here; a miss just returns `false`.
    pub async fn dispatch_inbound(self: &Arc<Self>, message: InboundMessage) -> bool {
        let key = message.dispatch_key();
        match self.registry.get(&key) {
            Some(handler) => handler.handle(message).await,
            None => {
                tracing::debug!(key = %key, "no handler registered for inbound message");
                false
            }
        }
    }

    /// Operational snapshot of the handler registry.
    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Pending notices in the outbound queue; diagnostic.
    pub fn queued_sends(&self) -> usize {
        self.outbound.queued()
    }
}
