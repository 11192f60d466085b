//! Where metric values come from.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use super::types::{MetricKey, MetricSnapshot};
use crate::backend::query::cell_text;
use crate::backend::{BackendError, Row, RowQuery, RowSource};
use crate::config::MetricsConfig;

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Every metric. Fails as a whole if any metric fails.
    async fn fetch_all(&self) -> Result<MetricSnapshot, BackendError>;

    /// A single metric, for targeted re-pulls.
    async fn fetch_one(&self, key: MetricKey) -> Result<u64, BackendError>;
}

/// Table and window settings for the backend queries.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQueries {
    pub courses_table: String,
    pub analytics_events_table: String,
    pub presence_table: String,
    pub active_window_minutes: u64,
    pub completion_event_name: String,
    pub completion_window_minutes: u64,
}

impl MetricQueries {
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self {
            courses_table: config.courses_table().to_string(),
            analytics_events_table: config.analytics_events_table().to_string(),
            presence_table: config.presence_table().to_string(),
            active_window_minutes: config.active_window_minutes(),
            completion_event_name: config.completion_event_name().to_string(),
            completion_window_minutes: config.completion_window_minutes(),
        }
    }

    pub fn courses(&self) -> RowQuery {
        RowQuery::table(&self.courses_table).select("id")
    }

    pub fn present_users(&self) -> RowQuery {
        RowQuery::table(&self.presence_table).select("user_id")
    }

    pub fn recently_active_users(&self, now: DateTime<Utc>) -> RowQuery {
        RowQuery::table(&self.analytics_events_table)
            .select("user_id")
            .gte("created_at", since(now, self.active_window_minutes))
    }

    pub fn recent_completions(&self, now: DateTime<Utc>) -> RowQuery {
        RowQuery::table(&self.analytics_events_table)
            .select("id")
            .eq("event_name", &self.completion_event_name)
            .gte("created_at", since(now, self.completion_window_minutes))
    }
}

impl Default for MetricQueries {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

fn since(now: DateTime<Utc>, minutes: u64) -> String {
    let start = i64::try_from(minutes)
        .ok()
        .and_then(chrono::Duration::try_minutes)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    start.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn distinct_users(rows: &[Row]) -> u64 {
    rows.iter()
        .filter_map(|row| row.get("user_id").and_then(cell_text))
        .collect::<HashSet<_>>()
        .len() as u64
}

/// [`MetricsSource`] over the hosted backend's tables.
pub struct BackendMetrics {
    rows: Arc<dyn RowSource>,
    queries: MetricQueries,
}

impl BackendMetrics {
    pub fn new(rows: Arc<dyn RowSource>, queries: MetricQueries) -> Self {
        Self { rows, queries }
    }

    pub async fn total_courses(&self) -> Result<u64, BackendError> {
        self.rows.count(&self.queries.courses()).await
    }

    /// Distinct users in the presence table, or distinct users with recent
    /// analytics events when the presence table is unavailable.
    pub async fn active_learners(&self) -> Result<u64, BackendError> {
        match self.rows.select(&self.queries.present_users()).await {
            Ok(rows) => Ok(distinct_users(&rows)),
            Err(e) => {
                warn!(
                    event = "core.metrics.presence_fallback",
                    table = %self.queries.presence_table,
                    error = %e
                );
                let rows = self
                    .rows
                    .select(&self.queries.recently_active_users(Utc::now()))
                    .await?;
                Ok(distinct_users(&rows))
            }
        }
    }

    pub async fn recent_completions(&self) -> Result<u64, BackendError> {
        self.rows
            .count(&self.queries.recent_completions(Utc::now()))
            .await
    }
}

#[async_trait]
impl MetricsSource for BackendMetrics {
    async fn fetch_all(&self) -> Result<MetricSnapshot, BackendError> {
        let (active, courses, completions) = tokio::try_join!(
            self.active_learners(),
            self.total_courses(),
            self.recent_completions()
        )?;
        debug!(
            event = "core.metrics.fetch_completed",
            active_learners = active,
            total_courses = courses,
            recent_completions = completions
        );
        Ok(MetricSnapshot::default()
            .with(MetricKey::ActiveLearners, active)
            .with(MetricKey::TotalCourses, courses)
            .with(MetricKey::RecentCompletions, completions))
    }

    async fn fetch_one(&self, key: MetricKey) -> Result<u64, BackendError> {
        match key {
            MetricKey::ActiveLearners => self.active_learners().await,
            MetricKey::TotalCourses => self.total_courses().await,
            MetricKey::RecentCompletions => self.recent_completions().await,
        }
    }
}
