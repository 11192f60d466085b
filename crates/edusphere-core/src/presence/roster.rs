use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::channel::PresenceState;
use crate::errors::PayloadError;

/// Metadata a participant tracked on the presence channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceMeta {
    pub key: String,
    pub online_at: DateTime<Utc>,
    /// Any other fields the participant tracked.
    pub extra: Map<String, Value>,
}

impl PresenceMeta {
    pub fn new(key: impl Into<String>, online_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            online_at,
            extra: Map::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert("key".to_string(), Value::String(self.key.clone()));
        map.insert(
            "online_at".to_string(),
            Value::String(self.online_at.to_rfc3339()),
        );
        Value::Object(map)
    }

    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let Value::Object(map) = value else {
            return Err(PayloadError::NotAnObject {
                context: "presence".to_string(),
                found: value.to_string(),
            });
        };
        let key = match map.get("key") {
            Some(Value::String(key)) if !key.is_empty() => key.clone(),
            Some(_) => {
                return Err(PayloadError::WrongType {
                    context: "presence".to_string(),
                    field: "key".to_string(),
                });
            }
            None => {
                return Err(PayloadError::MissingField {
                    context: "presence".to_string(),
                    field: "key".to_string(),
                });
            }
        };
        let online_at = match map.get("online_at") {
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| PayloadError::WrongType {
                    context: "presence".to_string(),
                    field: "online_at".to_string(),
                })?,
            Some(_) => {
                return Err(PayloadError::WrongType {
                    context: "presence".to_string(),
                    field: "online_at".to_string(),
                });
            }
            None => {
                return Err(PayloadError::MissingField {
                    context: "presence".to_string(),
                    field: "online_at".to_string(),
                });
            }
        };
        let extra = map
            .iter()
            .filter(|(k, _)| k.as_str() != "key" && k.as_str() != "online_at")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self {
            key,
            online_at,
            extra,
        })
    }
}

/// Who is currently present, rebuilt from every sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PresenceRoster(BTreeMap<String, PresenceMeta>);

impl PresenceRoster {
    /// Build a roster from server state, keeping the most recent metadata
    /// per key. Malformed entries are skipped and returned.
    pub fn from_state(state: &PresenceState) -> (Self, Vec<PayloadError>) {
        let mut roster = BTreeMap::new();
        let mut rejected = Vec::new();

        for (key, metas) in state {
            let latest = metas
                .iter()
                .filter_map(|meta| match PresenceMeta::from_value(meta) {
                    Ok(meta) => Some(meta),
                    Err(e) => {
                        rejected.push(e);
                        None
                    }
                })
                .max_by_key(|meta| meta.online_at);
            if let Some(meta) = latest {
                roster.insert(key.clone(), meta);
            }
        }

        (Self(roster), rejected)
    }

    pub fn get(&self, key: &str) -> Option<&PresenceMeta> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(entries: Vec<(&str, Vec<Value>)>) -> PresenceState {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_sync_replaces_with_latest_per_key() {
        let (roster, rejected) = PresenceRoster::from_state(&state(vec![
            (
                "alice",
                vec![
                    json!({"key": "alice", "online_at": "2026-10-16T10:00:00Z"}),
                    json!({"key": "alice", "online_at": "2026-10-16T11:00:00Z", "tab": 2}),
                ],
            ),
            (
                "bob",
                vec![json!({"key": "bob", "online_at": "2026-10-16T09:00:00Z"})],
            ),
        ]));

        assert!(rejected.is_empty());
        assert_eq!(roster.len(), 2);
        let alice = roster.get("alice").unwrap();
        assert_eq!(alice.online_at.to_rfc3339(), "2026-10-16T11:00:00+00:00");
        assert_eq!(alice.extra.get("tab"), Some(&json!(2)));
    }

    #[test]
    fn test_malformed_entries_are_rejected() {
        let (roster, rejected) = PresenceRoster::from_state(&state(vec![
            ("a", vec![json!("not an object")]),
            ("b", vec![json!({"online_at": "2026-10-16T10:00:00Z"})]),
            ("c", vec![json!({"key": "c", "online_at": "yesterday"})]),
            ("d", vec![json!({"key": "d", "online_at": "2026-10-16T10:00:00Z"})]),
        ]));

        assert_eq!(roster.keys().collect::<Vec<_>>(), vec!["d"]);
        assert_eq!(rejected.len(), 3);
        assert!(matches!(rejected[1], PayloadError::MissingField { .. }));
    }

    #[test]
    fn test_meta_value_round_trip_keeps_extra() {
        let value = json!({"key": "k", "online_at": "2026-10-16T10:00:00+00:00", "role": "tutor"});
        let meta = PresenceMeta::from_value(&value).unwrap();
        assert_eq!(meta.to_value(), value);
    }
}
