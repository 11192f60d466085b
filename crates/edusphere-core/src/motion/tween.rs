use std::time::Duration;

/// Linear tween of a single counter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween {
    from: f64,
    to: f64,
    duration: Duration,
}

impl Tween {
    pub fn new(from: f64, to: f64, duration: Duration) -> Self {
        Self { from, to, duration }
    }

    /// Tween that lands on `to` immediately when motion is reduced.
    pub fn for_motion(from: f64, to: f64, duration: Duration, reduced: bool) -> Self {
        if reduced {
            Self::new(from, to, Duration::ZERO)
        } else {
            Self::new(from, to, duration)
        }
    }

    pub fn target(&self) -> f64 {
        self.to
    }

    pub fn sample(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() || elapsed >= self.duration {
            return self.to;
        }
        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        self.from + (self.to - self.from) * t
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }
}
