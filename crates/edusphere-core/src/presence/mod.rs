//! Presence on the shared topic, keyed by the signed-in user.

pub mod roster;
pub mod subscriber;

pub use roster::{PresenceMeta, PresenceRoster};
pub use subscriber::{PresenceHandle, spawn_presence};
