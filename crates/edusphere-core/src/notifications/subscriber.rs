use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::feed::{NotificationFeed, NotificationItem};
use crate::backend::ChannelHub;
use crate::channel::{
    ChannelBinding, ChannelEvent, ChannelSpec, IdentityChannel, IdentityConsumer,
    spawn_identity_consumer,
};
use crate::config::NotificationsConfig;
use crate::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedCommand {
    MarkAllRead,
    Clear,
}

struct NotificationConsumer {
    topic_prefix: String,
    event: String,
    feed: watch::Sender<NotificationFeed>,
}

impl NotificationConsumer {
    fn topic_for(&self, identity: &Identity) -> String {
        format!("{}{}", self.topic_prefix, identity.user_id())
    }
}

impl IdentityConsumer for NotificationConsumer {
    type Command = FeedCommand;

    fn channel_spec(&self, identity: &Identity) -> ChannelSpec {
        ChannelSpec::new(self.topic_for(identity)).bind(ChannelBinding::Broadcast {
            event: self.event.clone(),
        })
    }

    fn on_identity(&mut self, _identity: Option<&Identity>) {
        self.feed.send_modify(NotificationFeed::clear);
    }

    fn on_event(&mut self, _channel: &IdentityChannel, event: ChannelEvent) {
        let ChannelEvent::Broadcast { event, payload } = event else {
            return;
        };
        if event != self.event {
            return;
        }
        match NotificationItem::from_payload(payload) {
            Ok(item) => {
                debug!(
                    event = "core.notifications.received",
                    id = %item.id,
                    title = item.display_title()
                );
                self.feed.send_modify(|feed| feed.push(item));
            }
            Err(e) => warn!(event = "core.notifications.payload_rejected", error = %e),
        }
    }

    fn on_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::MarkAllRead => self.feed.send_modify(NotificationFeed::mark_all_read),
            FeedCommand::Clear => self.feed.send_modify(NotificationFeed::clear),
        }
    }
}

/// Running notification subscriber.
pub struct NotificationHandle {
    feed: watch::Receiver<NotificationFeed>,
    commands: mpsc::UnboundedSender<FeedCommand>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl NotificationHandle {
    pub fn feed(&self) -> NotificationFeed {
        self.feed.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationFeed> {
        self.feed.clone()
    }

    pub fn mark_all_read(&self) {
        self.send(FeedCommand::MarkAllRead);
    }

    pub fn clear(&self) {
        self.send(FeedCommand::Clear);
    }

    /// Returns `false` when the subscriber has already stopped.
    fn send(&self, command: FeedCommand) -> bool {
        if self.commands.send(command).is_err() {
            debug!(
                event = "core.notifications.command_dropped",
                command = ?command,
                reason = "subscriber stopped"
            );
            return false;
        }
        true
    }

    /// Stop the subscriber and close its channel.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(event = "core.notifications.shutdown_failed", error = %e);
        }
    }
}

impl Drop for NotificationHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Listen for `notify` broadcasts on the current identity's topic.
/// Inactive (empty feed) while there is no identity.
pub fn spawn_notifications(
    hub: Arc<dyn ChannelHub>,
    identity: watch::Receiver<Option<Identity>>,
    config: &NotificationsConfig,
) -> NotificationHandle {
    let (feed_tx, feed_rx) = watch::channel(NotificationFeed::new(config.capacity()));
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();

    let consumer = NotificationConsumer {
        topic_prefix: config.topic_prefix().to_string(),
        event: config.event().to_string(),
        feed: feed_tx,
    };
    let task = spawn_identity_consumer(hub, identity, consumer, Some(command_rx), token.clone());

    NotificationHandle {
        feed: feed_rx,
        commands: command_tx,
        token,
        task: Some(task),
    }
}
