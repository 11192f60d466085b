use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::types::{ChannelEvent, ChannelId, ChannelSpec, ChannelStatus};
use crate::backend::{BackendError, ChannelHub};

/// An open push subscription, owned by whoever opened it.
///
/// Closed exactly once: either through [`close`](Self::close) or on drop.
pub struct ChannelSubscription {
    hub: Arc<dyn ChannelHub>,
    id: ChannelId,
    topic: String,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    status: ChannelStatus,
    closed: bool,
}

impl ChannelSubscription {
    pub fn open(hub: Arc<dyn ChannelHub>, spec: ChannelSpec) -> Result<Self, BackendError> {
        let handle = hub.open(spec)?;
        debug!(
            event = "core.channel.open_completed",
            channel = %handle.id,
            topic = %handle.topic
        );
        Ok(Self {
            hub,
            id: handle.id,
            topic: handle.topic,
            events: handle.events,
            status: ChannelStatus::Connecting,
            closed: false,
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn status(&self) -> &ChannelStatus {
        &self.status
    }

    /// Next event from the hub. `None` once the hub has dropped the channel.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        match self.events.recv().await {
            Some(ChannelEvent::Status(status)) => {
                if let ChannelStatus::Error(reason) = &status {
                    warn!(
                        event = "core.channel.subscription_failed",
                        channel = %self.id,
                        topic = %self.topic,
                        reason = %reason
                    );
                }
                self.status = status.clone();
                Some(ChannelEvent::Status(status))
            }
            Some(event) => Some(event),
            None => {
                self.status = ChannelStatus::Closed;
                None
            }
        }
    }

    /// Publish presence metadata on this channel.
    pub fn track(&self, meta: Value) -> Result<(), BackendError> {
        self.hub.track(self.id, meta)
    }

    pub fn close(mut self) {
        self.close_once();
    }

    fn close_once(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.hub.close(self.id);
        self.status = ChannelStatus::Closed;
        debug!(
            event = "core.channel.close_completed",
            channel = %self.id,
            topic = %self.topic
        );
    }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        self.close_once();
    }
}

impl std::fmt::Debug for ChannelSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSubscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("status", &self.status)
            .finish()
    }
}
