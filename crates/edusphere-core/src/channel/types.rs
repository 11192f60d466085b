use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::backend::Row;

/// Identifier the hub assigns to an open channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Kind of row change delivered by a table binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// What a channel listens to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelBinding {
    /// Row changes on a table. `kind: None` means every kind.
    RowChanges {
        table: String,
        kind: Option<ChangeKind>,
    },
    /// Named broadcast events on the topic.
    Broadcast { event: String },
    /// Presence on the topic, tracked under `key`.
    Presence { key: String },
}

impl ChannelBinding {
    pub fn accepts_row_change(&self, table: &str, kind: ChangeKind) -> bool {
        match self {
            ChannelBinding::RowChanges { table: t, kind: k } => {
                t == table && k.is_none_or(|k| k == kind)
            }
            _ => false,
        }
    }

    pub fn accepts_broadcast(&self, event: &str) -> bool {
        matches!(self, ChannelBinding::Broadcast { event: e } if e == event)
    }

    pub fn presence_key(&self) -> Option<&str> {
        match self {
            ChannelBinding::Presence { key } => Some(key),
            _ => None,
        }
    }
}

/// Request to open a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub topic: String,
    pub bindings: Vec<ChannelBinding>,
}

impl ChannelSpec {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, binding: ChannelBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn presence_key(&self) -> Option<&str> {
        self.bindings.iter().find_map(ChannelBinding::presence_key)
    }
}

/// Lifecycle status of a channel subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connecting,
    Subscribed,
    Closed,
    Error(String),
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Connecting => write!(f, "connecting"),
            ChannelStatus::Subscribed => write!(f, "subscribed"),
            ChannelStatus::Closed => write!(f, "closed"),
            ChannelStatus::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// A single row change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: String,
    pub kind: ChangeKind,
    /// Row after the change (absent for deletes).
    pub new: Option<Row>,
    /// Row before the change (deletes and updates).
    pub old: Option<Row>,
}

/// Server-side presence state: key → tracked metadata entries.
pub type PresenceState = BTreeMap<String, Vec<Value>>;

/// Every push event a channel can deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Status(ChannelStatus),
    RowChange(RowChange),
    Broadcast { event: String, payload: Value },
    PresenceSync(PresenceState),
}

/// An open channel as returned by the hub.
///
/// The receiver yields `None` once the hub has dropped the channel.
#[derive(Debug)]
pub struct ChannelHandle {
    pub id: ChannelId,
    pub topic: String,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}
