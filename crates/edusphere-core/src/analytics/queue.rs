use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{BackendError, RowSource};
use crate::config::AnalyticsConfig;

/// A captured event as inserted into the analytics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event: String,
    pub props: Value,
    pub ts: DateTime<Utc>,
}

/// Best-effort batch queue for analytics events.
pub struct AnalyticsQueue {
    rows: Arc<dyn RowSource>,
    table: String,
    pending: Mutex<VecDeque<AnalyticsEvent>>,
}

impl AnalyticsQueue {
    pub fn new(rows: Arc<dyn RowSource>, config: &AnalyticsConfig) -> Self {
        Self {
            rows,
            table: config.table().to_string(),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AnalyticsEvent>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capture(&self, event: impl Into<String>, props: Value) {
        self.lock().push_back(AnalyticsEvent {
            event: event.into(),
            props,
            ts: Utc::now(),
        });
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Insert every pending event as one batch. On failure the batch is put
    /// back ahead of anything captured meanwhile.
    pub async fn flush(&self) -> Result<usize, BackendError> {
        let batch: Vec<AnalyticsEvent> = self.lock().drain(..).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let rows: Vec<Value> = batch
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()
            .map_err(|e| BackendError::malformed(&self.table, e.to_string()))?;

        match self.rows.insert(&self.table, &rows).await {
            Ok(()) => {
                debug!(event = "core.analytics.flush_completed", events = batch.len());
                Ok(batch.len())
            }
            Err(e) => {
                let mut pending = self.lock();
                for event in batch.into_iter().rev() {
                    pending.push_front(event);
                }
                Err(e)
            }
        }
    }

    /// Flush every `period` until the returned handle is shut down.
    pub fn spawn_flusher(self: Arc<Self>, period: Duration) -> AnalyticsFlusher {
        let token = CancellationToken::new();
        let task = tokio::spawn(flush_loop(
            self,
            period.max(Duration::from_millis(1)),
            token.clone(),
        ));
        AnalyticsFlusher {
            token,
            task: Some(task),
        }
    }
}

async fn flush_loop(queue: Arc<AnalyticsQueue>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = queue.flush().await {
                    warn!(
                        event = "core.analytics.flush_failed",
                        pending = queue.pending(),
                        error = %e
                    );
                }
            }
        }
    }

    if let Err(e) = queue.flush().await {
        warn!(
            event = "core.analytics.final_flush_failed",
            pending = queue.pending(),
            error = %e
        );
    }
}

/// Handle to the periodic flusher.
pub struct AnalyticsFlusher {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AnalyticsFlusher {
    /// Stop flushing after one final attempt.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(event = "core.analytics.shutdown_failed", error = %e);
        }
    }
}

impl Drop for AnalyticsFlusher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
