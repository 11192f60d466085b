//! Identity-keyed channels and the task loop shared by the presence and
//! notification subscribers.

use std::future::pending;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::subscription::ChannelSubscription;
use super::types::{ChannelEvent, ChannelSpec};
use crate::backend::{BackendError, ChannelHub};
use crate::identity::Identity;

/// Outcome of [`IdentityChannel::rebind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebind {
    /// Same identity as before; nothing was closed or opened.
    Unchanged,
    /// A channel is now open for the new identity.
    Opened,
    /// No identity; no channel is open.
    Inactive,
    /// The open call failed; no channel is open.
    Failed,
}

/// At most one open channel, keyed by the current identity.
pub struct IdentityChannel {
    hub: Arc<dyn ChannelHub>,
    current: Option<(Identity, ChannelSubscription)>,
    drained: bool,
}

impl IdentityChannel {
    pub fn new(hub: Arc<dyn ChannelHub>) -> Self {
        Self {
            hub,
            current: None,
            drained: false,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.current.as_ref().map(|(identity, _)| identity)
    }

    pub fn subscription(&self) -> Option<&ChannelSubscription> {
        self.current.as_ref().map(|(_, sub)| sub)
    }

    /// Move to `identity`, closing the previous channel before opening the
    /// next one.
    pub fn rebind(
        &mut self,
        identity: Option<Identity>,
        spec_for: impl FnOnce(&Identity) -> ChannelSpec,
    ) -> Rebind {
        if identity.is_some() && self.identity() == identity.as_ref() {
            return Rebind::Unchanged;
        }
        if identity.is_none() && self.current.is_none() {
            return Rebind::Inactive;
        }

        if let Some((previous, sub)) = self.current.take() {
            debug!(
                event = "core.channel.rebind_closing",
                identity = %previous,
                channel = %sub.id()
            );
            sub.close();
        }
        self.drained = false;

        let Some(identity) = identity else {
            return Rebind::Inactive;
        };

        let spec = spec_for(&identity);
        let topic = spec.topic.clone();
        match ChannelSubscription::open(self.hub.clone(), spec) {
            Ok(sub) => {
                info!(
                    event = "core.channel.rebind_completed",
                    identity = %identity,
                    topic = %topic
                );
                self.current = Some((identity, sub));
                Rebind::Opened
            }
            Err(e) => {
                warn!(
                    event = "core.channel.open_failed",
                    identity = %identity,
                    topic = %topic,
                    error = %e
                );
                Rebind::Failed
            }
        }
    }

    /// Publish presence metadata on the current channel.
    pub fn track(&self, meta: Value) -> Result<(), BackendError> {
        match self.subscription() {
            Some(sub) => sub.track(meta),
            None => Err(BackendError::ChannelNotOpen {
                id: "none".to_string(),
            }),
        }
    }

    /// Next event on the current channel. Pends forever while no channel is
    /// open or after the hub has dropped it.
    pub async fn recv(&mut self) -> ChannelEvent {
        if !self.drained
            && let Some((_, sub)) = self.current.as_mut()
        {
            if let Some(event) = sub.recv().await {
                return event;
            }
            self.drained = true;
            debug!(event = "core.channel.drained");
        }
        pending().await
    }

    pub fn close(&mut self) {
        if let Some((_, sub)) = self.current.take() {
            sub.close();
        }
    }
}

/// State machine driven by [`spawn_identity_consumer`].
pub trait IdentityConsumer: Send + 'static {
    type Command: Send + 'static;

    fn channel_spec(&self, identity: &Identity) -> ChannelSpec;

    /// Called after every identity transition, including to `None`.
    fn on_identity(&mut self, identity: Option<&Identity>);

    fn on_event(&mut self, channel: &IdentityChannel, event: ChannelEvent);

    fn on_command(&mut self, command: Self::Command);
}

fn apply_identity<C: IdentityConsumer>(
    channel: &mut IdentityChannel,
    consumer: &mut C,
    next: Option<Identity>,
) {
    let outcome = channel.rebind(next.clone(), |identity| consumer.channel_spec(identity));
    if outcome != Rebind::Unchanged {
        consumer.on_identity(next.as_ref());
    }
}

async fn next_command<T>(commands: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match commands {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

/// Run `consumer` against the channel for the current identity until
/// `token` is cancelled. The channel is closed on every exit path.
pub fn spawn_identity_consumer<C: IdentityConsumer>(
    hub: Arc<dyn ChannelHub>,
    mut identity: watch::Receiver<Option<Identity>>,
    mut consumer: C,
    commands: Option<mpsc::UnboundedReceiver<C::Command>>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut commands = commands;
        let mut channel = IdentityChannel::new(hub);
        let mut identity_open = true;

        let initial = identity.borrow_and_update().clone();
        apply_identity(&mut channel, &mut consumer, initial);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = identity.changed(), if identity_open => {
                    let next = match changed {
                        Ok(()) => identity.borrow_and_update().clone(),
                        Err(_) => {
                            identity_open = false;
                            None
                        }
                    };
                    apply_identity(&mut channel, &mut consumer, next);
                }
                event = channel.recv() => consumer.on_event(&channel, event),
                command = next_command(&mut commands) => match command {
                    Some(command) => consumer.on_command(command),
                    None => commands = None,
                },
            }
        }

        channel.close();
        debug!(event = "core.channel.consumer_stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::channel::types::{ChannelBinding, ChannelStatus};

    fn spec(identity: &Identity) -> ChannelSpec {
        ChannelSpec::new(format!("user_{}", identity)).bind(ChannelBinding::Broadcast {
            event: "notify".to_string(),
        })
    }

    fn id(raw: &str) -> Identity {
        Identity::new(raw).unwrap()
    }

    #[test]
    fn test_rebind_closes_before_opening() {
        let backend = Arc::new(MemoryBackend::new());
        let mut channel = IdentityChannel::new(backend.clone());

        assert_eq!(channel.rebind(Some(id("a")), spec), Rebind::Opened);
        assert_eq!(channel.rebind(Some(id("b")), spec), Rebind::Opened);

        assert_eq!(backend.active_channels("user_a"), 0);
        assert_eq!(backend.active_channels("user_b"), 1);
        let stats = backend.channel_stats();
        assert_eq!(stats.closed, stats.opened - 1);
    }

    #[test]
    fn test_same_identity_is_noop() {
        let backend = Arc::new(MemoryBackend::new());
        let mut channel = IdentityChannel::new(backend.clone());

        channel.rebind(Some(id("a")), spec);
        assert_eq!(channel.rebind(Some(id("a")), spec), Rebind::Unchanged);
        assert_eq!(backend.channel_stats().opened, 1);
        assert_eq!(backend.channel_stats().close_calls, 0);
    }

    #[test]
    fn test_no_identity_is_inactive() {
        let backend = Arc::new(MemoryBackend::new());
        let mut channel = IdentityChannel::new(backend.clone());

        assert_eq!(channel.rebind(None, spec), Rebind::Inactive);
        assert_eq!(backend.channel_stats().opened, 0);

        channel.rebind(Some(id("a")), spec);
        assert_eq!(channel.rebind(None, spec), Rebind::Inactive);
        assert_eq!(backend.active_channels("user_a"), 0);
        assert!(channel.identity().is_none());
    }

    #[test]
    fn test_open_failure_leaves_no_channel() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_channel_opens(true);
        let mut channel = IdentityChannel::new(backend.clone());

        assert_eq!(channel.rebind(Some(id("a")), spec), Rebind::Failed);
        assert!(channel.subscription().is_none());
        assert!(channel.track(serde_json::json!({})).is_err());

        backend.fail_channel_opens(false);
        assert_eq!(channel.rebind(Some(id("a")), spec), Rebind::Opened);
    }

    #[tokio::test]
    async fn test_recv_yields_events_from_current_channel() {
        let backend = Arc::new(MemoryBackend::new());
        let mut channel = IdentityChannel::new(backend.clone());
        channel.rebind(Some(id("a")), spec);

        assert_eq!(
            channel.recv().await,
            ChannelEvent::Status(ChannelStatus::Connecting)
        );
        assert_eq!(
            channel.recv().await,
            ChannelEvent::Status(ChannelStatus::Subscribed)
        );
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    struct Recorder {
        identities: Arc<std::sync::Mutex<Vec<Option<String>>>>,
        events: Arc<std::sync::Mutex<Vec<ChannelEvent>>>,
    }

    impl IdentityConsumer for Recorder {
        type Command = ();

        fn channel_spec(&self, identity: &Identity) -> ChannelSpec {
            spec(identity)
        }

        fn on_identity(&mut self, identity: Option<&Identity>) {
            self.identities
                .lock()
                .unwrap()
                .push(identity.map(|i| i.user_id().to_string()));
        }

        fn on_event(&mut self, _channel: &IdentityChannel, event: ChannelEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn on_command(&mut self, _command: ()) {}
    }

    #[tokio::test]
    async fn test_consumer_follows_identity_and_closes_on_cancel() {
        let backend = Arc::new(MemoryBackend::new());
        let (identity_tx, identity_rx) = watch::channel(Some(id("a")));
        let identities = Arc::new(std::sync::Mutex::new(Vec::new()));
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let token = CancellationToken::new();

        let task = spawn_identity_consumer(
            backend.clone(),
            identity_rx,
            Recorder {
                identities: identities.clone(),
                events: events.clone(),
            },
            None,
            token.clone(),
        );

        settle().await;
        identity_tx.send_replace(Some(id("b")));
        settle().await;
        identity_tx.send_replace(Some(id("b")));
        settle().await;

        token.cancel();
        task.await.unwrap();

        assert_eq!(
            *identities.lock().unwrap(),
            vec![Some("a".to_string()), Some("b".to_string())]
        );
        let stats = backend.channel_stats();
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.closed, 2);
        assert!(!events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consumer_deactivates_when_identity_source_drops() {
        let backend = Arc::new(MemoryBackend::new());
        let (identity_tx, identity_rx) = watch::channel(Some(id("a")));
        let identities = Arc::new(std::sync::Mutex::new(Vec::new()));
        let token = CancellationToken::new();

        let task = spawn_identity_consumer(
            backend.clone(),
            identity_rx,
            Recorder {
                identities: identities.clone(),
                events: Arc::new(std::sync::Mutex::new(Vec::new())),
            },
            None,
            token.clone(),
        );

        settle().await;
        drop(identity_tx);
        settle().await;
        assert_eq!(backend.active_channels("user_a"), 0);

        token.cancel();
        task.await.unwrap();
        assert_eq!(
            *identities.lock().unwrap(),
            vec![Some("a".to_string()), None]
        );
    }
}
