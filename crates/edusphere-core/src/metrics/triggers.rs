//! Push subscriptions that cause targeted metric re-pulls.

use crate::backend::query::cell_text;
use crate::channel::{ChangeKind, ChannelBinding, ChannelEvent, ChannelSpec};
use crate::config::MetricsConfig;

use super::types::MetricKey;

pub const PRESENCE_TRIGGER_TOPIC: &str = "realtime-presence-metrics";
pub const COMPLETIONS_TRIGGER_TOPIC: &str = "realtime-completions-metrics";

/// Client-side column filter on the changed row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPredicate {
    pub column: String,
    pub equals: String,
}

/// One push subscription and the metric it refreshes.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTrigger {
    pub topic: String,
    pub binding: ChannelBinding,
    pub key: MetricKey,
    pub predicate: Option<RowPredicate>,
}

impl MetricTrigger {
    pub fn new(topic: impl Into<String>, binding: ChannelBinding, key: MetricKey) -> Self {
        Self {
            topic: topic.into(),
            binding,
            key,
            predicate: None,
        }
    }

    pub fn when_column_equals(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicate = Some(RowPredicate {
            column: column.into(),
            equals: value.into(),
        });
        self
    }

    pub fn spec(&self) -> ChannelSpec {
        ChannelSpec::new(&self.topic).bind(self.binding.clone())
    }

    /// Whether `event` should cause a re-pull of [`key`](Self::key).
    pub fn fires_on(&self, event: &ChannelEvent) -> bool {
        match event {
            ChannelEvent::RowChange(change) => {
                if !self.binding.accepts_row_change(&change.table, change.kind) {
                    return false;
                }
                let Some(predicate) = &self.predicate else {
                    return true;
                };
                let row = change.new.as_ref().or(change.old.as_ref());
                row.and_then(|r| r.get(&predicate.column))
                    .and_then(cell_text)
                    .is_some_and(|value| value == predicate.equals)
            }
            ChannelEvent::Broadcast { event, .. } => self.binding.accepts_broadcast(event),
            ChannelEvent::PresenceSync(_) => self.binding.presence_key().is_some(),
            ChannelEvent::Status(_) => false,
        }
    }
}

/// Presence table changes refresh active learners; completion inserts
/// refresh recent completions.
pub fn default_triggers(config: &MetricsConfig) -> Vec<MetricTrigger> {
    vec![
        MetricTrigger::new(
            PRESENCE_TRIGGER_TOPIC,
            ChannelBinding::RowChanges {
                table: config.presence_table().to_string(),
                kind: None,
            },
            MetricKey::ActiveLearners,
        ),
        MetricTrigger::new(
            COMPLETIONS_TRIGGER_TOPIC,
            ChannelBinding::RowChanges {
                table: config.analytics_events_table().to_string(),
                kind: Some(ChangeKind::Insert),
            },
            MetricKey::RecentCompletions,
        )
        .when_column_equals("event_name", config.completion_event_name()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelStatus, RowChange};
    use serde_json::json;

    fn change(table: &str, kind: ChangeKind, row: serde_json::Value) -> ChannelEvent {
        let row = row.as_object().cloned();
        let (new, old) = match kind {
            ChangeKind::Delete => (None, row),
            _ => (row, None),
        };
        ChannelEvent::RowChange(RowChange {
            table: table.to_string(),
            kind,
            new,
            old,
        })
    }

    #[test]
    fn test_default_triggers() {
        let triggers = default_triggers(&MetricsConfig::default());
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].topic, PRESENCE_TRIGGER_TOPIC);
        assert_eq!(triggers[0].key, MetricKey::ActiveLearners);
        assert_eq!(triggers[1].topic, COMPLETIONS_TRIGGER_TOPIC);
        assert_eq!(triggers[1].key, MetricKey::RecentCompletions);
        assert_eq!(triggers[1].spec().bindings.len(), 1);
    }

    #[test]
    fn test_presence_trigger_fires_on_any_change() {
        let trigger = &default_triggers(&MetricsConfig::default())[0];
        assert!(trigger.fires_on(&change(
            "user_presence",
            ChangeKind::Delete,
            json!({"user_id": "a"})
        )));
        assert!(trigger.fires_on(&change(
            "user_presence",
            ChangeKind::Insert,
            json!({"user_id": "a"})
        )));
        assert!(!trigger.fires_on(&ChannelEvent::Status(ChannelStatus::Subscribed)));
    }

    #[test]
    fn test_completion_trigger_filters_event_name() {
        let trigger = &default_triggers(&MetricsConfig::default())[1];
        assert!(trigger.fires_on(&change(
            "analytics_events",
            ChangeKind::Insert,
            json!({"event_name": "completion"})
        )));
        assert!(!trigger.fires_on(&change(
            "analytics_events",
            ChangeKind::Insert,
            json!({"event_name": "page_view"})
        )));
        assert!(!trigger.fires_on(&change(
            "analytics_events",
            ChangeKind::Update,
            json!({"event_name": "completion"})
        )));
    }

    #[test]
    fn test_broadcast_trigger() {
        let trigger = MetricTrigger::new(
            "courses-feed",
            ChannelBinding::Broadcast {
                event: "course_published".to_string(),
            },
            MetricKey::TotalCourses,
        );
        assert!(trigger.fires_on(&ChannelEvent::Broadcast {
            event: "course_published".to_string(),
            payload: json!({}),
        }));
    }
}
