//! Outbound send service: render + deliver.
//!
//! Two paths:
//! - `send_template_now` / `forward_now` — direct awaited sends used by the
//!   router, which needs the gateway error (specifically `EndpointGone`) to
//!   decide whether to recreate the staff endpoint and retry;
//! - `notify` — fire-and-forget notices paced through the rate-limited
//!   [`OutboundQueue`].

use std::sync::Arc;

use serde_json::Value;

use dr_domain::{Endpoint, Error, MessageContent, Result, TemplateRenderer};

use crate::gateway::{MessageRef, MessagingGateway};
use crate::queue::{OutboundQueue, QueuedSend};

pub struct Outbound {
    gateway: Arc<dyn MessagingGateway>,
    renderer: Arc<dyn TemplateRenderer>,
    queue: Arc<OutboundQueue>,
}

impl Outbound {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        renderer: Arc<dyn TemplateRenderer>,
        queue: Arc<OutboundQueue>,
    ) -> Self {
        Self {
            gateway,
            renderer,
            queue,
        }
    }

    /// Render a template and deliver it immediately.  Gateway errors come
    /// back typed so the router can react to `EndpointGone`.
    pub async fn send_template_now(
        &self,
        endpoint: Endpoint,
        template_key: &str,
        variables: &Value,
    ) -> Result<MessageRef> {
        let rendered = self.renderer.render(template_key, variables)?;
        self.gateway
            .send_text(endpoint, &rendered.text)
            .await
            .map_err(Error::Gateway)
    }

    /// Deliver inbound content to a counterpart endpoint immediately:
    /// templated for text, prefixed raw forward for media.
    pub async fn forward_now(
        &self,
        endpoint: Endpoint,
        content: &MessageContent,
        template_key: &str,
        variables: &Value,
        media_prefix: &str,
    ) -> Result<MessageRef> {
        match content {
            MessageContent::Text { .. } => {
                self.send_template_now(endpoint, template_key, variables).await
            }
            MessageContent::Media {
                media_kind,
                file_ref,
            } => self
                .gateway
                .send_media(endpoint, media_kind, file_ref, media_prefix)
                .await
                .map_err(Error::Gateway),
        }
    }

    /// Render a notice and hand it to the rate-limited queue.  A render
    /// failure is logged and swallowed; notices are best-effort.
    pub fn notify(&self, endpoint: Endpoint, template_key: &str, variables: &Value) {
        match self.renderer.render(template_key, variables) {
            Ok(rendered) => {
                self.queue.enqueue(QueuedSend {
                    endpoint,
                    text: rendered.text,
                });
            }
            Err(e) => {
                tracing::error!(template_key, error = %e, "notice render failed");
            }
        }
    }

    /// Pending queued notices; diagnostic.
    pub fn queued(&self) -> usize {
        self.queue.pending()
    }
}
