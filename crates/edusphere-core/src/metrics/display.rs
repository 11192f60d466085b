use std::time::Duration;

use super::types::MetricSnapshot;
use crate::motion::Tween;

/// Per-key linear interpolation from the displayed snapshot toward a new
/// raw snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation {
    from: MetricSnapshot,
    to: MetricSnapshot,
    duration: Duration,
}

impl Interpolation {
    pub fn new(from: MetricSnapshot, to: MetricSnapshot, duration: Duration) -> Self {
        Self { from, to, duration }
    }

    pub fn target(&self) -> &MetricSnapshot {
        &self.to
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }

    /// Displayed values after `elapsed`. Each key moves monotonically from
    /// its start value and lands exactly on the target at `duration`.
    pub fn sample(&self, elapsed: Duration) -> MetricSnapshot {
        if self.is_finished(elapsed) {
            let mut done = self.from.clone();
            done.merge(&self.to);
            return done;
        }

        let mut frame = self.from.clone();
        for (key, target) in self.to.iter() {
            let start = self.from.value(key);
            let raw = Tween::new(start as f64, target as f64, self.duration)
                .sample(elapsed)
                .round();
            let (lo, hi) = (start.min(target), start.max(target));
            frame.set(key, (raw.max(0.0) as u64).clamp(lo, hi));
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::MetricKey;

    fn snap(active: u64, courses: u64) -> MetricSnapshot {
        MetricSnapshot::default()
            .with(MetricKey::ActiveLearners, active)
            .with(MetricKey::TotalCourses, courses)
    }

    #[test]
    fn test_reaches_target_at_duration() {
        let interp = Interpolation::new(snap(0, 10), snap(100, 0), Duration::from_millis(500));
        assert_eq!(interp.sample(Duration::from_millis(500)), snap(100, 0));
        assert_eq!(interp.sample(Duration::from_secs(3)), snap(100, 0));
    }

    #[test]
    fn test_monotonic_between_endpoints() {
        let interp = Interpolation::new(snap(7, 90), snap(93, 3), Duration::from_millis(500));
        let mut prev = interp.sample(Duration::ZERO);
        assert_eq!(prev, snap(7, 90));

        for ms in (0..=520).step_by(16) {
            let frame = interp.sample(Duration::from_millis(ms));
            let active = frame.value(MetricKey::ActiveLearners);
            let courses = frame.value(MetricKey::TotalCourses);
            assert!((7..=93).contains(&active));
            assert!((3..=90).contains(&courses));
            assert!(active >= prev.value(MetricKey::ActiveLearners));
            assert!(courses <= prev.value(MetricKey::TotalCourses));
            prev = frame;
        }
        assert_eq!(prev, snap(93, 3));
    }

    #[test]
    fn test_zero_duration_snaps() {
        let interp = Interpolation::new(snap(1, 1), snap(5, 5), Duration::ZERO);
        assert_eq!(interp.sample(Duration::ZERO), snap(5, 5));
    }

    #[test]
    fn test_keys_missing_from_target_are_kept() {
        let from = snap(4, 4).with(MetricKey::RecentCompletions, 9);
        let interp = Interpolation::new(from, snap(8, 8), Duration::from_millis(100));
        assert_eq!(
            interp
                .sample(Duration::from_millis(50))
                .value(MetricKey::RecentCompletions),
            9
        );
    }
}
