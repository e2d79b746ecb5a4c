//! Rate-limited outbound send queue.
//!
//! FIFO of pending sends with a self-starting drain task: enqueueing while
//! idle spawns the drain loop, which sends bursts of up to `burst_limit`
//! messages, enforces `max_per_minute` over a trailing 60-second window, and
//! exits when the queue empties.  A failed send is logged and dropped —
//! callers that need delivery guarantees re-invoke at the router level.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use dr_domain::config::QueueConfig;
use dr_domain::Endpoint;

use crate::gateway::MessagingGateway;

/// A pending outbound send.  Text is rendered before enqueueing; the queue
/// only paces delivery.
#[derive(Debug, Clone)]
pub struct QueuedSend {
    pub endpoint: Endpoint,
    pub text: String,
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<QueuedSend>,
    /// Send timestamps inside the trailing window.
    sent_at: VecDeque<Instant>,
    draining: bool,
}

/// Bounded-rate outbound queue.
pub struct OutboundQueue {
    gateway: Arc<dyn MessagingGateway>,
    config: QueueConfig,
    inner: Mutex<QueueInner>,
}

impl OutboundQueue {
    pub fn new(gateway: Arc<dyn MessagingGateway>, config: QueueConfig) -> Self {
        Self {
            gateway,
            config,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Queue a send and start the drain task if it isn't running.
    pub fn enqueue(self: &Arc<Self>, send: QueuedSend) {
        let start_drain = {
            let mut inner = self.inner.lock();
            inner.pending.push_back(send);
            tracing::debug!(queued = inner.pending.len(), "outbound send queued");
            if inner.draining {
                false
            } else {
                inner.draining = true;
                true
            }
        };
        if start_drain {
            let queue = self.clone();
            tokio::spawn(async move {
                queue.drain().await;
            });
        }
    }

    /// Number of sends still waiting.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether the drain task is currently running.
    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }

    async fn drain(self: Arc<Self>) {
        loop {
            // Rate check first: if the window is full, sleep until the
            // oldest timestamp inside it expires.
            let wait = {
                let mut inner = self.inner.lock();
                let now = Instant::now();
                while inner
                    .sent_at
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= Duration::from_secs(60))
                {
                    inner.sent_at.pop_front();
                }
                if inner.sent_at.len() >= self.config.max_per_minute {
                    inner
                        .sent_at
                        .front()
                        .map(|oldest| Duration::from_secs(60) - now.duration_since(*oldest))
                } else {
                    None
                }
            };
            if let Some(delay) = wait {
                tracing::warn!(?delay, "outbound rate limit reached, pausing drain");
                tokio::time::sleep(delay).await;
                continue;
            }

            // Pull the next burst; stop the task once the queue is empty.
            let batch: Vec<QueuedSend> = {
                let mut inner = self.inner.lock();
                if inner.pending.is_empty() {
                    inner.draining = false;
                    return;
                }
                let n = inner.pending.len().min(self.config.burst_limit);
                inner.pending.drain(..n).collect()
            };

            for send in batch {
                match self.gateway.send_text(send.endpoint, &send.text).await {
                    Ok(_) => {
                        self.inner.lock().sent_at.push_back(Instant::now());
                    }
                    Err(e) => {
                        // Dropped, not re-enqueued.
                        tracing::error!(endpoint = %send.endpoint, error = %e, "queued send failed");
                    }
                }
            }

            // Breather between bursts.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
