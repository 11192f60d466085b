//! Per-user notification feed fed by `notify` broadcasts.
//!
//! Notifications are ephemeral: capped, newest first, never persisted.

pub mod feed;
pub mod subscriber;

pub use feed::{NotificationFeed, NotificationItem};
pub use subscriber::{FeedCommand, NotificationHandle, spawn_notifications};
