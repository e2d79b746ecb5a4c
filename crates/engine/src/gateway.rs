//! Messaging-gateway seam.
//!
//! The engine never talks to the platform directly; everything goes through
//! [`MessagingGateway`].  Besides send/create/rename primitives, the trait
//! exposes the gateway's live dispatch set so the handler registry can keep
//! its bookkeeping and the platform-side handler list in lockstep (and so
//! `stats()` can detect zombies by comparing counts).

use async_trait::async_trait;

use dr_domain::{Endpoint, EndpointKey, GatewayError};

/// Reference to a message accepted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Send/receive surface of the external messaging platform.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Deliver plain text to an endpoint.
    async fn send_text(&self, endpoint: Endpoint, text: &str) -> GatewayResult<MessageRef>;

    /// Forward a media payload to an endpoint with a caption prefix.
    async fn send_media(
        &self,
        endpoint: Endpoint,
        media_kind: &str,
        file_ref: &str,
        caption_prefix: &str,
    ) -> GatewayResult<MessageRef>;

    /// Allocate a sub-channel thread inside a group.  Returns the thread id.
    async fn create_sub_channel(&self, group_id: i64, name: &str) -> GatewayResult<i64>;

    /// Rename an existing sub-channel thread.
    async fn rename_sub_channel(
        &self,
        group_id: i64,
        thread_id: i64,
        name: &str,
    ) -> GatewayResult<()>;

    // ── Dispatch set ─────────────────────────────────────────────────
    // Mutated synchronously with the registry's bookkeeping table; see
    // `registry::HandlerRegistry`.

    /// Start delivering inbound messages for this endpoint key.
    fn bind_dispatch(&self, key: &EndpointKey);

    /// Stop delivering inbound messages for this endpoint key.
    fn unbind_dispatch(&self, key: &EndpointKey);

    /// Number of endpoint keys the gateway is currently dispatching for.
    fn live_dispatch_count(&self) -> usize;
}
