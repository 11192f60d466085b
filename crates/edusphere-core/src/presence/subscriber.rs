use std::convert::Infallible;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::roster::{PresenceMeta, PresenceRoster};
use crate::backend::ChannelHub;
use crate::channel::{
    ChannelBinding, ChannelEvent, ChannelSpec, ChannelStatus, IdentityChannel, IdentityConsumer,
    spawn_identity_consumer,
};
use crate::config::PresenceConfig;
use crate::identity::Identity;

struct PresenceConsumer {
    topic: String,
    roster: watch::Sender<PresenceRoster>,
}

impl IdentityConsumer for PresenceConsumer {
    type Command = Infallible;

    fn channel_spec(&self, identity: &Identity) -> ChannelSpec {
        ChannelSpec::new(&self.topic).bind(ChannelBinding::Presence {
            key: identity.user_id().to_string(),
        })
    }

    fn on_identity(&mut self, _identity: Option<&Identity>) {
        self.roster.send_replace(PresenceRoster::default());
    }

    fn on_event(&mut self, channel: &IdentityChannel, event: ChannelEvent) {
        match event {
            ChannelEvent::Status(ChannelStatus::Subscribed) => {
                let Some(identity) = channel.identity() else {
                    return;
                };
                let meta = PresenceMeta::new(identity.user_id(), Utc::now());
                if let Err(e) = channel.track(meta.to_value()) {
                    warn!(
                        event = "core.presence.track_failed",
                        topic = %self.topic,
                        error = %e
                    );
                }
            }
            ChannelEvent::PresenceSync(state) => {
                let (roster, rejected) = PresenceRoster::from_state(&state);
                for error in &rejected {
                    warn!(
                        event = "core.presence.payload_rejected",
                        topic = %self.topic,
                        error = %error
                    );
                }
                debug!(
                    event = "core.presence.sync_applied",
                    topic = %self.topic,
                    present = roster.len()
                );
                self.roster.send_replace(roster);
            }
            _ => {}
        }
    }

    fn on_command(&mut self, command: Infallible) {
        match command {}
    }
}

/// Running presence subscriber.
pub struct PresenceHandle {
    roster: watch::Receiver<PresenceRoster>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PresenceHandle {
    pub fn roster(&self) -> PresenceRoster {
        self.roster.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PresenceRoster> {
        self.roster.clone()
    }

    /// Stop the subscriber and close its channel.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(event = "core.presence.shutdown_failed", error = %e);
        }
    }
}

impl Drop for PresenceHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Join the presence topic as the current identity and keep a roster of
/// everyone present. Inactive (empty roster) while there is no identity.
pub fn spawn_presence(
    hub: Arc<dyn ChannelHub>,
    identity: watch::Receiver<Option<Identity>>,
    config: &PresenceConfig,
) -> PresenceHandle {
    let (tx, rx) = watch::channel(PresenceRoster::default());
    let token = CancellationToken::new();
    let consumer = PresenceConsumer {
        topic: config.topic().to_string(),
        roster: tx,
    };
    let task = spawn_identity_consumer(hub, identity, consumer, None, token.clone());
    PresenceHandle {
        roster: rx,
        token,
        task: Some(task),
    }
}
