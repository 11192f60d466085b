//! Typed push channels.
//!
//! Metrics triggers, presence and notifications all consume the same
//! [`ChannelEvent`] stream through a [`ChannelSubscription`]. Subscribers
//! keyed by the signed-in user go through [`IdentityChannel`] so that a
//! single logical identity never holds two channels at once.

pub mod binding;
pub mod subscription;
pub mod types;

pub use binding::{IdentityChannel, IdentityConsumer, Rebind, spawn_identity_consumer};
pub use subscription::ChannelSubscription;
pub use types::{
    ChangeKind, ChannelBinding, ChannelEvent, ChannelHandle, ChannelId, ChannelSpec,
    ChannelStatus, PresenceState, RowChange,
};
