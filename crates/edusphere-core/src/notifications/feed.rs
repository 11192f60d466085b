use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::PayloadError;

pub const DEFAULT_TITLE: &str = "Update";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationItem {
    pub id: Uuid,
    pub title: Option<String>,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl NotificationItem {
    /// Validate a `notify` payload. Only JSON objects are accepted; a
    /// non-string title is treated as absent.
    pub fn from_payload(payload: Value) -> Result<Self, PayloadError> {
        let Value::Object(map) = &payload else {
            return Err(PayloadError::NotAnObject {
                context: "notify".to_string(),
                found: payload.to_string(),
            });
        };
        let title = map
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Ok(Self {
            id: Uuid::new_v4(),
            title,
            payload,
            received_at: Utc::now(),
        })
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }
}

/// Newest-first notification list bounded by `capacity`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationFeed {
    capacity: usize,
    items: VecDeque<NotificationItem>,
    unread: usize,
}

impl NotificationFeed {
    /// Storage grows with pushes; `capacity` only bounds it.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::new(),
            unread: 0,
        }
    }

    /// Prepend an item, evicting the oldest beyond capacity.
    pub fn push(&mut self, item: NotificationItem) {
        if self.capacity == 0 {
            return;
        }
        self.items.push_front(item);
        self.items.truncate(self.capacity);
        self.unread += 1;
    }

    pub fn mark_all_read(&mut self) {
        self.unread = 0;
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.unread = 0;
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items, newest first.
    pub fn items(&self) -> impl Iterator<Item = &NotificationItem> {
        self.items.iter()
    }
}
