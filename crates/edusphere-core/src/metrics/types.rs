use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Named counters shown on the live metrics panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKey {
    ActiveLearners,
    TotalCourses,
    RecentCompletions,
}

impl MetricKey {
    pub const ALL: [MetricKey; 3] = [
        MetricKey::ActiveLearners,
        MetricKey::TotalCourses,
        MetricKey::RecentCompletions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::ActiveLearners => "activeLearners",
            MetricKey::TotalCourses => "totalCourses",
            MetricKey::RecentCompletions => "recentCompletions",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricKey::ActiveLearners => "Active learners",
            MetricKey::TotalCourses => "Courses",
            MetricKey::RecentCompletions => "Completions (24h)",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter values keyed by [`MetricKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSnapshot(BTreeMap<MetricKey, u64>);

impl MetricSnapshot {
    /// All keys present with value zero.
    pub fn zeroed() -> Self {
        Self(MetricKey::ALL.iter().map(|k| (*k, 0)).collect())
    }

    pub fn get(&self, key: MetricKey) -> Option<u64> {
        self.0.get(&key).copied()
    }

    /// Value for `key`, zero when absent.
    pub fn value(&self, key: MetricKey) -> u64 {
        self.get(key).unwrap_or(0)
    }

    pub fn set(&mut self, key: MetricKey, value: u64) {
        self.0.insert(key, value);
    }

    pub fn with(mut self, key: MetricKey, value: u64) -> Self {
        self.set(key, value);
        self
    }

    /// Overwrite the keys present in `other`, keep the rest.
    pub fn merge(&mut self, other: &MetricSnapshot) {
        for (key, value) in &other.0 {
            self.0.insert(*key, *value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKey, u64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(MetricKey, u64)> for MetricSnapshot {
    fn from_iter<I: IntoIterator<Item = (MetricKey, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
