use tokio::sync::watch;
use tracing::info;

/// Single writer of the reduced-motion flag.
///
/// Consumers hold a `watch::Receiver<bool>` from [`subscribe`](Self::subscribe)
/// and react when the flag changes.
#[derive(Debug)]
pub struct MotionPreference {
    tx: watch::Sender<bool>,
}

impl MotionPreference {
    pub fn new(reduced: bool) -> Self {
        let (tx, _) = watch::channel(reduced);
        Self { tx }
    }

    pub fn is_reduced(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the flag. Subscribers are only woken on an actual change.
    pub fn set_reduced(&self, reduced: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == reduced {
                return false;
            }
            *current = reduced;
            true
        });
        if changed {
            info!(event = "core.motion.preference_changed", reduced = reduced);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for MotionPreference {
    fn default() -> Self {
        Self::new(false)
    }
}
