//! In-process backend implementing both [`RowSource`] and [`ChannelHub`].
//!
//! Tables are plain row vectors; inserts and deletes fan out as row-change
//! events to channels bound to the table, the way the hosted provider
//! streams table changes. Presence and broadcast are delivered per topic.
//! Failure and latency injection make the degraded paths reachable.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::query::{cell_text, compare_cells};
use super::{BackendError, ChannelHub, Row, RowQuery, RowSource};
use crate::channel::types::{
    ChangeKind, ChannelEvent, ChannelHandle, ChannelId, ChannelSpec, ChannelStatus,
    PresenceState, RowChange,
};

/// Open/close bookkeeping for the channel registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Channels successfully opened.
    pub opened: u64,
    /// Channels removed by a close call.
    pub closed: u64,
    /// Every close call, including ones for unknown ids.
    pub close_calls: u64,
}

impl ChannelStats {
    pub fn active(&self) -> u64 {
        self.opened - self.closed
    }
}

struct ChannelEntry {
    spec: ChannelSpec,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Row>>,
    failing_tables: HashSet<String>,
    fail_channel_opens: bool,
    reject_subscriptions: bool,
    latency: Duration,
    next_channel_id: u64,
    channels: BTreeMap<ChannelId, ChannelEntry>,
    /// topic → presence key → (owning channel, metadata)
    presence: HashMap<String, BTreeMap<String, Vec<(ChannelId, Value)>>>,
    stats: ChannelStats,
    queries: u64,
}

impl Inner {
    fn table(&self, name: &str) -> Result<&Vec<Row>, BackendError> {
        if self.failing_tables.contains(name) {
            return Err(BackendError::RequestFailed {
                table: name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        self.tables
            .get(name)
            .ok_or_else(|| BackendError::RequestFailed {
                table: name.to_string(),
                message: format!("relation \"{}\" does not exist", name),
            })
    }

    fn emit_row_change(&self, change: RowChange) {
        for entry in self.channels.values() {
            if entry
                .spec
                .bindings
                .iter()
                .any(|b| b.accepts_row_change(&change.table, change.kind))
            {
                let _ = entry.tx.send(ChannelEvent::RowChange(change.clone()));
            }
        }
    }

    fn presence_state(&self, topic: &str) -> PresenceState {
        self.presence
            .get(topic)
            .map(|keys| {
                keys.iter()
                    .filter(|(_, metas)| !metas.is_empty())
                    .map(|(key, metas)| {
                        (key.clone(), metas.iter().map(|(_, m)| m.clone()).collect())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sync_presence(&self, topic: &str) {
        let state = self.presence_state(topic);
        for entry in self.channels.values() {
            if entry.spec.topic == topic && entry.spec.presence_key().is_some() {
                let _ = entry.tx.send(ChannelEvent::PresenceSync(state.clone()));
            }
        }
    }
}

/// In-process backend.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with the given (empty) tables already created.
    pub fn with_tables(tables: &[&str]) -> Self {
        let backend = Self::new();
        for table in tables {
            backend.create_table(table);
        }
        backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_table(&self, table: &str) {
        self.lock().tables.entry(table.to_string()).or_default();
    }

    /// Add rows without emitting change events.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut inner = self.lock();
        let target = inner.tables.entry(table.to_string()).or_default();
        target.extend(rows.into_iter().filter_map(into_row));
    }

    /// Insert one row and emit an `INSERT` change.
    pub fn insert_row(&self, table: &str, row: Value) {
        let Some(row) = into_row(row) else {
            debug!(event = "core.memory.insert_skipped", table = table, reason = "not an object");
            return;
        };
        let mut inner = self.lock();
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        inner.emit_row_change(RowChange {
            table: table.to_string(),
            kind: ChangeKind::Insert,
            new: Some(row),
            old: None,
        });
    }

    /// Remove rows whose `column` equals `value`, emitting one `DELETE` each.
    pub fn remove_rows(&self, table: &str, column: &str, value: &str) -> usize {
        let mut inner = self.lock();
        let Some(rows) = inner.tables.get_mut(table) else {
            return 0;
        };
        let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(rows)
            .into_iter()
            .partition(|r| r.get(column).and_then(cell_text).as_deref() == Some(value));
        *rows = kept;
        let count = removed.len();
        for row in removed {
            inner.emit_row_change(RowChange {
                table: table.to_string(),
                kind: ChangeKind::Delete,
                new: None,
                old: Some(row),
            });
        }
        count
    }

    /// Send a broadcast event to every channel on `topic` bound to it.
    /// Returns the number of channels it was delivered to.
    pub fn broadcast(&self, topic: &str, event: &str, payload: Value) -> usize {
        let inner = self.lock();
        let mut delivered = 0;
        for entry in inner.channels.values() {
            if entry.spec.topic == topic
                && entry.spec.bindings.iter().any(|b| b.accepts_broadcast(event))
                && entry
                    .tx
                    .send(ChannelEvent::Broadcast {
                        event: event.to_string(),
                        payload: payload.clone(),
                    })
                    .is_ok()
            {
                delivered += 1;
            }
        }
        delivered
    }

    /// Presence state for `topic` as the server sees it.
    pub fn presence_state(&self, topic: &str) -> PresenceState {
        self.lock().presence_state(topic)
    }

    pub fn fail_table(&self, table: &str) {
        self.lock().failing_tables.insert(table.to_string());
    }

    pub fn heal_table(&self, table: &str) {
        self.lock().failing_tables.remove(table);
    }

    /// Delay applied before every row query resolves.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Make `open` fail outright.
    pub fn fail_channel_opens(&self, fail: bool) {
        self.lock().fail_channel_opens = fail;
    }

    /// Let `open` succeed but report `Error` instead of `Subscribed`.
    pub fn reject_subscriptions(&self, reject: bool) {
        self.lock().reject_subscriptions = reject;
    }

    pub fn channel_stats(&self) -> ChannelStats {
        self.lock().stats
    }

    /// Open channels on `topic`.
    pub fn active_channels(&self, topic: &str) -> usize {
        self.lock()
            .channels
            .values()
            .filter(|e| e.spec.topic == topic)
            .count()
    }

    /// Number of count/select calls served (including failed ones).
    pub fn query_count(&self) -> u64 {
        self.lock().queries
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn into_row(value: Value) -> Option<Row> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn project(row: &Row, columns: Option<&[&str]>) -> Row {
    match columns {
        None => row.clone(),
        Some(cols) => row
            .iter()
            .filter(|(k, _)| cols.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

#[async_trait]
impl RowSource for MemoryBackend {
    async fn count(&self, query: &RowQuery) -> Result<u64, BackendError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.queries += 1;
        let rows = inner.table(&query.table)?;
        Ok(rows.iter().filter(|r| query.matches(r)).count() as u64)
    }

    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, BackendError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.queries += 1;
        let rows = inner.table(&query.table)?;

        let mut matched: Vec<&Row> = rows.iter().filter(|r| query.matches(r)).collect();
        if let Some(order) = &query.order {
            matched.sort_by(|a, b| {
                let ord = compare_cells(a.get(&order.column), b.get(&order.column));
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        let columns = query.column_list();
        Ok(matched
            .into_iter()
            .map(|r| project(r, columns.as_deref()))
            .collect())
    }

    async fn insert(&self, table: &str, rows: &[Value]) -> Result<(), BackendError> {
        self.simulate_latency().await;
        {
            let inner = self.lock();
            if inner.failing_tables.contains(table) {
                return Err(BackendError::RequestFailed {
                    table: table.to_string(),
                    message: "injected failure".to_string(),
                });
            }
        }
        for row in rows {
            if !row.is_object() {
                return Err(BackendError::malformed(table, "row is not a JSON object"));
            }
        }
        for row in rows {
            self.insert_row(table, row.clone());
        }
        Ok(())
    }
}

impl ChannelHub for MemoryBackend {
    fn open(&self, spec: ChannelSpec) -> Result<ChannelHandle, BackendError> {
        let mut inner = self.lock();
        if inner.fail_channel_opens {
            return Err(BackendError::ChannelUnavailable {
                topic: spec.topic,
                message: "injected open failure".to_string(),
            });
        }

        inner.next_channel_id += 1;
        let id = ChannelId(inner.next_channel_id);
        let (tx, rx) = mpsc::unbounded_channel();

        let _ = tx.send(ChannelEvent::Status(ChannelStatus::Connecting));
        if inner.reject_subscriptions {
            let _ = tx.send(ChannelEvent::Status(ChannelStatus::Error(
                "subscription rejected".to_string(),
            )));
        } else {
            let _ = tx.send(ChannelEvent::Status(ChannelStatus::Subscribed));
            if spec.presence_key().is_some() {
                let state = inner.presence_state(&spec.topic);
                let _ = tx.send(ChannelEvent::PresenceSync(state));
            }
        }

        let topic = spec.topic.clone();
        inner.channels.insert(id, ChannelEntry { spec, tx });
        inner.stats.opened += 1;

        debug!(event = "core.memory.channel_opened", channel = %id, topic = %topic);

        Ok(ChannelHandle {
            id,
            topic,
            events: rx,
        })
    }

    fn close(&self, id: ChannelId) {
        let mut inner = self.lock();
        inner.stats.close_calls += 1;
        let Some(entry) = inner.channels.remove(&id) else {
            return;
        };
        inner.stats.closed += 1;
        let _ = entry.tx.send(ChannelEvent::Status(ChannelStatus::Closed));

        let topic = entry.spec.topic;
        let mut untracked = false;
        if let Some(keys) = inner.presence.get_mut(&topic) {
            for metas in keys.values_mut() {
                let before = metas.len();
                metas.retain(|(owner, _)| *owner != id);
                untracked |= metas.len() != before;
            }
            keys.retain(|_, metas| !metas.is_empty());
        }
        if untracked {
            inner.sync_presence(&topic);
        }

        debug!(event = "core.memory.channel_closed", channel = %id, topic = %topic);
    }

    fn track(&self, id: ChannelId, meta: Value) -> Result<(), BackendError> {
        let mut inner = self.lock();
        let Some(entry) = inner.channels.get(&id) else {
            return Err(BackendError::ChannelNotOpen { id: id.to_string() });
        };
        let topic = entry.spec.topic.clone();
        let Some(key) = entry.spec.presence_key().map(str::to_string) else {
            return Err(BackendError::ChannelUnavailable {
                topic,
                message: "channel has no presence binding".to_string(),
            });
        };

        let metas = inner
            .presence
            .entry(topic.clone())
            .or_default()
            .entry(key)
            .or_default();
        metas.retain(|(owner, _)| *owner != id);
        metas.push((id, meta));

        inner.sync_presence(&topic);
        Ok(())
    }
}
