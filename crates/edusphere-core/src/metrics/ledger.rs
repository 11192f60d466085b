//! Raw snapshot with per-key issue-order stamps.
//!
//! Every pull is stamped with a sequence number when it is issued. A key
//! only accepts a value from a pull issued after the one that last wrote it,
//! so a slow full pull can never regress a key already refreshed by a later
//! targeted pull.

use std::collections::BTreeMap;

use super::types::{MetricKey, MetricSnapshot};

/// Issue-order stamp of a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PullSeq(u64);

/// Result of a pull, ready to be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    Full(MetricSnapshot),
    Partial { key: MetricKey, value: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    seq: PullSeq,
}

#[derive(Debug, Default)]
pub struct MetricsLedger {
    entries: BTreeMap<MetricKey, Entry>,
    next_seq: u64,
}

impl MetricsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a pull at the moment it is issued.
    pub fn issue(&mut self) -> PullSeq {
        self.next_seq += 1;
        PullSeq(self.next_seq)
    }

    /// Apply a pull result. Returns `true` if any key changed value.
    pub fn apply(&mut self, seq: PullSeq, update: MetricUpdate) -> bool {
        match update {
            MetricUpdate::Full(snapshot) => {
                let mut changed = false;
                for (key, value) in snapshot.iter() {
                    changed |= self.apply_key(seq, key, value);
                }
                changed
            }
            MetricUpdate::Partial { key, value } => self.apply_key(seq, key, value),
        }
    }

    fn apply_key(&mut self, seq: PullSeq, key: MetricKey, value: u64) -> bool {
        match self.entries.get_mut(&key) {
            Some(entry) if entry.seq > seq => false,
            Some(entry) => {
                entry.seq = seq;
                let changed = entry.value != value;
                entry.value = value;
                changed
            }
            None => {
                self.entries.insert(key, Entry { value, seq });
                true
            }
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.entries.iter().map(|(k, e)| (*k, e.value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(active: u64, courses: u64, completions: u64) -> MetricUpdate {
        MetricUpdate::Full(
            MetricSnapshot::default()
                .with(MetricKey::ActiveLearners, active)
                .with(MetricKey::TotalCourses, courses)
                .with(MetricKey::RecentCompletions, completions),
        )
    }

    #[test]
    fn test_full_then_targeted() {
        let mut ledger = MetricsLedger::new();
        let first = ledger.issue();
        assert!(ledger.apply(first, full(10, 5, 2)));

        let targeted = ledger.issue();
        assert!(ledger.apply(
            targeted,
            MetricUpdate::Partial {
                key: MetricKey::RecentCompletions,
                value: 3
            }
        ));

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.value(MetricKey::ActiveLearners), 10);
        assert_eq!(snapshot.value(MetricKey::TotalCourses), 5);
        assert_eq!(snapshot.value(MetricKey::RecentCompletions), 3);
    }

    #[test]
    fn test_stale_full_pull_cannot_regress_newer_key() {
        let mut ledger = MetricsLedger::new();
        let slow_full = ledger.issue();
        let targeted = ledger.issue();

        ledger.apply(
            targeted,
            MetricUpdate::Partial {
                key: MetricKey::RecentCompletions,
                value: 9,
            },
        );
        ledger.apply(slow_full, full(10, 5, 2));

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.value(MetricKey::RecentCompletions), 9);
        assert_eq!(snapshot.value(MetricKey::ActiveLearners), 10);
    }

    #[test]
    fn test_newer_full_overwrites_older_targeted() {
        let mut ledger = MetricsLedger::new();
        let targeted = ledger.issue();
        let later_full = ledger.issue();

        ledger.apply(later_full, full(1, 1, 1));
        assert!(!ledger.apply(
            targeted,
            MetricUpdate::Partial {
                key: MetricKey::ActiveLearners,
                value: 50
            }
        ));
        assert_eq!(ledger.snapshot().value(MetricKey::ActiveLearners), 1);
    }

    #[test]
    fn test_unchanged_value_reports_no_change() {
        let mut ledger = MetricsLedger::new();
        let a = ledger.issue();
        ledger.apply(a, full(1, 2, 3));
        let b = ledger.issue();
        assert!(!ledger.apply(b, full(1, 2, 3)));
    }

    #[test]
    fn test_interleavings_never_regress() {
        // Values grow with issue order; any resolution order must keep the
        // max-issued value per key.
        let orders: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for order in orders {
            let mut ledger = MetricsLedger::new();
            let seqs = [ledger.issue(), ledger.issue(), ledger.issue()];
            let updates = [
                full(1, 1, 1),
                MetricUpdate::Partial {
                    key: MetricKey::ActiveLearners,
                    value: 2,
                },
                full(3, 3, 3),
            ];
            for i in order {
                ledger.apply(seqs[i], updates[i].clone());
            }
            assert_eq!(ledger.snapshot(), {
                let MetricUpdate::Full(s) = full(3, 3, 3) else {
                    unreachable!()
                };
                s
            });
        }
    }
}
