//! Live metrics synchronization.
//!
//! One actor task owns the ledger, the push subscriptions, the fallback
//! interval and every in-flight pull. Pull results are applied only by the
//! actor, so teardown (cancel the token, then await the actor) guarantees no
//! result lands after it.

use std::future::pending;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::select_all;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::display::Interpolation;
use super::ledger::{MetricUpdate, MetricsLedger, PullSeq};
use super::source::MetricsSource;
use super::triggers::MetricTrigger;
use super::types::{MetricKey, MetricSnapshot};
use crate::backend::{BackendError, ChannelHub};
use crate::channel::{ChannelEvent, ChannelStatus, ChannelSubscription};
use crate::config::MetricsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSettings {
    pub polling_interval: Duration,
    pub animation_duration: Duration,
    pub frame_interval: Duration,
}

impl MetricsSettings {
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self {
            polling_interval: config.polling_interval(),
            animation_duration: config.animation_duration(),
            frame_interval: config.frame_interval(),
        }
    }

    /// Polling interval in whole milliseconds, saturating at `u64::MAX`.
    pub fn polling_interval_ms(&self) -> u64 {
        u64::try_from(self.polling_interval.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

/// What teardown released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub subscriptions_closed: usize,
    pub pulls_cancelled: usize,
}

pub struct MetricsController {
    source: Arc<dyn MetricsSource>,
    settings: MetricsSettings,
    motion: watch::Receiver<bool>,
    hub: Option<Arc<dyn ChannelHub>>,
    triggers: Vec<MetricTrigger>,
}

impl MetricsController {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        settings: MetricsSettings,
        motion: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            settings,
            motion,
            hub: None,
            triggers: Vec::new(),
        }
    }

    /// Open `triggers` on `hub` when the controller starts.
    pub fn with_realtime(mut self, hub: Arc<dyn ChannelHub>, triggers: Vec<MetricTrigger>) -> Self {
        self.hub = Some(hub);
        self.triggers = triggers;
        self
    }

    /// Start the controller. The first full pull is issued immediately.
    pub fn spawn(self) -> MetricsHandle {
        let (display_tx, display_rx) = watch::channel(MetricSnapshot::zeroed());
        let (raw_tx, raw_rx) = watch::channel(MetricSnapshot::default());
        let frames = Arc::new(AtomicU64::new(0));
        let token = CancellationToken::new();

        let actor = Actor {
            source: self.source,
            settings: self.settings,
            motion: self.motion,
            ledger: MetricsLedger::new(),
            display_tx,
            raw_tx,
            frames: frames.clone(),
            animation: None,
            pulls: JoinSet::new(),
            triggers: Vec::new(),
            token: token.clone(),
        };
        let task = tokio::spawn(actor.run(self.hub, self.triggers));

        MetricsHandle {
            display: display_rx,
            raw: raw_rx,
            frames,
            token,
            task: Some(task),
        }
    }
}

/// Owner handle of a running controller. Dropping it cancels the controller.
pub struct MetricsHandle {
    display: watch::Receiver<MetricSnapshot>,
    raw: watch::Receiver<MetricSnapshot>,
    frames: Arc<AtomicU64>,
    token: CancellationToken,
    task: Option<JoinHandle<TeardownReport>>,
}

impl MetricsHandle {
    /// Currently displayed (smoothed) snapshot.
    pub fn snapshot(&self) -> MetricSnapshot {
        self.display.borrow().clone()
    }

    /// Latest reconciled snapshot, before smoothing.
    pub fn raw(&self) -> MetricSnapshot {
        self.raw.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MetricSnapshot> {
        self.display.clone()
    }

    pub fn subscribe_raw(&self) -> watch::Receiver<MetricSnapshot> {
        self.raw.clone()
    }

    /// Display updates published so far.
    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel in-flight pulls, close every subscription and stop the
    /// interval, then wait for the controller to finish.
    pub async fn shutdown(mut self) -> TeardownReport {
        self.token.cancel();
        let Some(task) = self.task.take() else {
            return TeardownReport::default();
        };
        match task.await {
            Ok(report) => report,
            Err(e) => {
                warn!(event = "core.metrics.shutdown_failed", error = %e);
                TeardownReport::default()
            }
        }
    }
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
enum PullKind {
    Full,
    Targeted(MetricKey),
}

struct PullResult {
    seq: PullSeq,
    kind: PullKind,
    result: Result<MetricUpdate, BackendError>,
}

struct TriggerSubscription {
    trigger: MetricTrigger,
    subscription: ChannelSubscription,
    live: bool,
}

struct Actor {
    source: Arc<dyn MetricsSource>,
    settings: MetricsSettings,
    motion: watch::Receiver<bool>,
    ledger: MetricsLedger,
    display_tx: watch::Sender<MetricSnapshot>,
    raw_tx: watch::Sender<MetricSnapshot>,
    frames: Arc<AtomicU64>,
    animation: Option<(Interpolation, Instant)>,
    pulls: JoinSet<Option<PullResult>>,
    triggers: Vec<TriggerSubscription>,
    token: CancellationToken,
}

async fn next_push(triggers: &mut [TriggerSubscription]) -> (usize, Option<ChannelEvent>) {
    if !triggers.iter().any(|t| t.live) {
        return pending().await;
    }
    let receivers = triggers
        .iter_mut()
        .enumerate()
        .filter(|(_, t)| t.live)
        .map(|(index, t)| Box::pin(async move { (index, t.subscription.recv().await) }));
    let (next, _, _) = select_all(receivers).await;
    next
}

impl Actor {
    async fn run(
        mut self,
        hub: Option<Arc<dyn ChannelHub>>,
        triggers: Vec<MetricTrigger>,
    ) -> TeardownReport {
        if let Some(hub) = hub {
            self.open_triggers(hub, triggers);
        }
        info!(
            event = "core.metrics.controller_started",
            polling_interval_ms = self.settings.polling_interval_ms(),
            triggers = self.triggers.len()
        );

        let mut poll = interval(self.settings.polling_interval.max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frame = interval(self.settings.frame_interval.max(Duration::from_millis(1)));
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut motion_open = true;

        loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => break,
                Some(joined) = self.pulls.join_next(), if !self.pulls.is_empty() => {
                    match joined {
                        Ok(Some(pull)) => self.apply_pull(pull, &mut frame),
                        Ok(None) => {}
                        Err(e) => warn!(event = "core.metrics.pull_panicked", error = %e),
                    }
                }
                (index, event) = next_push(&mut self.triggers) => {
                    self.handle_push(index, event);
                }
                changed = self.motion.changed(), if motion_open => {
                    match changed {
                        Ok(()) => {
                            let reduced = *self.motion.borrow_and_update();
                            if reduced {
                                self.snap_display();
                            }
                        }
                        Err(_) => motion_open = false,
                    }
                }
                _ = poll.tick() => self.issue_pull(PullKind::Full),
                _ = frame.tick(), if self.animation.is_some() => self.render_frame(),
            }
        }

        self.teardown().await
    }

    fn open_triggers(&mut self, hub: Arc<dyn ChannelHub>, triggers: Vec<MetricTrigger>) {
        for trigger in triggers {
            match ChannelSubscription::open(hub.clone(), trigger.spec()) {
                Ok(subscription) => self.triggers.push(TriggerSubscription {
                    trigger,
                    subscription,
                    live: true,
                }),
                Err(e) => warn!(
                    event = "core.metrics.subscription_failed",
                    topic = %trigger.topic,
                    metric = %trigger.key,
                    error = %e
                ),
            }
        }
    }

    fn issue_pull(&mut self, kind: PullKind) {
        let seq = self.ledger.issue();
        let source = self.source.clone();
        let token = self.token.child_token();

        debug!(event = "core.metrics.pull_started", kind = ?kind);

        self.pulls.spawn(async move {
            let result = match kind {
                PullKind::Full => {
                    tokio::select! {
                        _ = token.cancelled() => return None,
                        result = source.fetch_all() => result.map(MetricUpdate::Full),
                    }
                }
                PullKind::Targeted(key) => {
                    tokio::select! {
                        _ = token.cancelled() => return None,
                        result = source.fetch_one(key) => {
                            result.map(|value| MetricUpdate::Partial { key, value })
                        }
                    }
                }
            };
            Some(PullResult { seq, kind, result })
        });
    }

    fn apply_pull(&mut self, pull: PullResult, frame: &mut tokio::time::Interval) {
        let update = match pull.result {
            Ok(update) => update,
            Err(e) => {
                warn!(
                    event = "core.metrics.pull_failed",
                    kind = ?pull.kind,
                    error = %e
                );
                return;
            }
        };

        if !self.ledger.apply(pull.seq, update) {
            debug!(event = "core.metrics.pull_unchanged", kind = ?pull.kind);
            return;
        }

        let raw = self.ledger.snapshot();
        debug!(event = "core.metrics.pull_completed", kind = ?pull.kind);
        self.raw_tx.send_replace(raw.clone());

        let reduced = *self.motion.borrow();
        if reduced || self.settings.animation_duration.is_zero() {
            self.animation = None;
            self.publish(raw);
        } else {
            let from = self.display_tx.borrow().clone();
            self.animation = Some((
                Interpolation::new(from, raw, self.settings.animation_duration),
                Instant::now(),
            ));
            frame.reset();
        }
    }

    fn handle_push(&mut self, index: usize, event: Option<ChannelEvent>) {
        let Some(entry) = self.triggers.get_mut(index) else {
            return;
        };
        let Some(event) = event else {
            entry.live = false;
            warn!(
                event = "core.metrics.trigger_closed",
                topic = %entry.trigger.topic
            );
            return;
        };

        match &event {
            ChannelEvent::Status(ChannelStatus::Subscribed) => {
                debug!(event = "core.metrics.trigger_subscribed", topic = %entry.trigger.topic);
            }
            ChannelEvent::Status(ChannelStatus::Error(_)) => {
                warn!(
                    event = "core.metrics.trigger_degraded",
                    topic = %entry.trigger.topic,
                    metric = %entry.trigger.key
                );
            }
            _ => {}
        }

        if entry.trigger.fires_on(&event) {
            let key = entry.trigger.key;
            debug!(event = "core.metrics.push_received", topic = %entry.trigger.topic, metric = %key);
            self.issue_pull(PullKind::Targeted(key));
        }
    }

    fn render_frame(&mut self) {
        let Some((interpolation, started)) = &self.animation else {
            return;
        };
        let elapsed = started.elapsed();
        let next = interpolation.sample(elapsed);
        let finished = interpolation.is_finished(elapsed);
        self.publish(next);
        if finished {
            self.animation = None;
        }
    }

    /// Jump the display to the latest snapshot, ending any animation.
    fn snap_display(&mut self) {
        if let Some((interpolation, _)) = self.animation.take() {
            let target = interpolation.sample(Duration::MAX);
            self.publish(target);
        }
    }

    fn publish(&mut self, next: MetricSnapshot) {
        let changed = self.display_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            current.merge(&next);
            true
        });
        if changed {
            self.frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn teardown(mut self) -> TeardownReport {
        let pulls_cancelled = self.pulls.len();
        self.pulls.shutdown().await;

        let subscriptions_closed = self.triggers.len();
        for entry in self.triggers.drain(..) {
            entry.subscription.close();
        }

        info!(
            event = "core.metrics.controller_stopped",
            pulls_cancelled = pulls_cancelled,
            subscriptions_closed = subscriptions_closed
        );
        TeardownReport {
            subscriptions_closed,
            pulls_cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::metrics::source::{BackendMetrics, MetricQueries};
    use crate::metrics::triggers::default_triggers;
    use crate::motion::MotionPreference;
    use chrono::{SecondsFormat, Utc};
    use serde_json::{Value, json};

    fn now_text() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn completion() -> Value {
        json!({"user_id": "x", "event_name": "completion", "created_at": now_text()})
    }

    /// 10 present users, 5 courses, 2 recent completions.
    fn seeded() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::with_tables(&[
            "courses",
            "analytics_events",
            "user_presence",
        ]));
        backend.seed(
            "user_presence",
            (0..10).map(|i| json!({"user_id": format!("u{}", i)})).collect(),
        );
        backend.seed("courses", (0..5).map(|i| json!({"id": i})).collect());
        backend.seed("analytics_events", vec![completion(), completion()]);
        backend
    }

    fn expected(active: u64, courses: u64, completions: u64) -> MetricSnapshot {
        MetricSnapshot::default()
            .with(MetricKey::ActiveLearners, active)
            .with(MetricKey::TotalCourses, courses)
            .with(MetricKey::RecentCompletions, completions)
    }

    fn controller(backend: &Arc<MemoryBackend>, motion: &MotionPreference) -> MetricsController {
        MetricsController::new(
            Arc::new(BackendMetrics::new(backend.clone(), MetricQueries::default())),
            MetricsSettings::default(),
            motion.subscribe(),
        )
    }

    fn realtime(backend: &Arc<MemoryBackend>, motion: &MotionPreference) -> MetricsController {
        controller(backend, motion).with_realtime(
            backend.clone(),
            default_triggers(&MetricsConfig::default()),
        )
    }

    async fn wait_for(
        rx: &mut watch::Receiver<MetricSnapshot>,
        want: &MetricSnapshot,
        within: Duration,
    ) {
        tokio::time::timeout(within, rx.wait_for(|s| s == want))
            .await
            .expect("snapshot not reached in time")
            .expect("controller stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_pull_then_animates_to_target() {
        let backend = seeded();
        let motion = MotionPreference::new(false);
        let handle = controller(&backend, &motion).spawn();
        assert_eq!(handle.snapshot(), MetricSnapshot::zeroed());

        let mut raw = handle.subscribe_raw();
        let mut display = handle.subscribe();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;
        wait_for(&mut display, &expected(10, 5, 2), Duration::from_secs(1)).await;

        assert!(handle.frames_rendered() > 1);
        assert!(handle.is_running());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reduced_motion_snaps_in_one_step() {
        let backend = seeded();
        let motion = MotionPreference::new(true);
        let handle = controller(&backend, &motion).spawn();

        let mut display = handle.subscribe();
        wait_for(&mut display, &expected(10, 5, 2), Duration::from_secs(1)).await;
        assert_eq!(handle.frames_rendered(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_enabling_reduced_motion_mid_animation_snaps() {
        let backend = seeded();
        let motion = MotionPreference::new(false);
        let handle = controller(&backend, &motion).spawn();

        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;
        motion.set_reduced(true);

        let mut display = handle.subscribe();
        wait_for(&mut display, &expected(10, 5, 2), Duration::from_millis(100)).await;
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_push_triggers_targeted_repull() {
        let backend = seeded();
        let motion = MotionPreference::new(true);
        let handle = realtime(&backend, &motion).spawn();

        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;
        let full_pull_queries = backend.query_count();

        backend.insert_row("analytics_events", completion());
        wait_for(&mut raw, &expected(10, 5, 3), Duration::from_secs(1)).await;
        assert_eq!(backend.query_count(), full_pull_queries + 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_event_names_do_not_trigger() {
        let backend = seeded();
        let motion = MotionPreference::new(true);
        let handle = realtime(&backend, &motion).spawn();

        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;
        let before = backend.query_count();

        backend.insert_row(
            "analytics_events",
            json!({"user_id": "x", "event_name": "page_view", "created_at": now_text()}),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.query_count(), before);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_change_refreshes_active_learners() {
        let backend = seeded();
        let motion = MotionPreference::new(true);
        let handle = realtime(&backend, &motion).spawn();

        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;

        backend.remove_rows("user_presence", "user_id", "u0");
        wait_for(&mut raw, &expected(9, 5, 2), Duration::from_secs(1)).await;
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_fallback_pulls_without_push() {
        let backend = seeded();
        let motion = MotionPreference::new(true);
        let handle = controller(&backend, &motion).spawn();

        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;
        let started = Instant::now();

        backend.seed("courses", vec![json!({"id": 5}), json!({"id": 6})]);
        wait_for(&mut raw, &expected(10, 7, 2), Duration::from_secs(60)).await;
        assert!(started.elapsed() >= Duration::from_secs(44));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pull_keeps_prior_snapshot_and_retries_next_tick() {
        let backend = seeded();
        let motion = MotionPreference::new(true);
        let handle = controller(&backend, &motion).spawn();

        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;

        backend.fail_table("courses");
        backend.seed("user_presence", vec![json!({"user_id": "late"})]);
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(handle.raw(), expected(10, 5, 2));

        backend.heal_table("courses");
        wait_for(&mut raw, &expected(11, 5, 2), Duration::from_secs(60)).await;
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_mid_pull_applies_nothing() {
        let backend = seeded();
        backend.set_latency(Duration::from_secs(10));
        let motion = MotionPreference::new(true);
        let handle = realtime(&backend, &motion).spawn();
        let raw = handle.subscribe_raw();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let report = handle.shutdown().await;
        assert_eq!(report.pulls_cancelled, 1);
        assert_eq!(report.subscriptions_closed, 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(raw.borrow().is_empty());
        let stats = backend.channel_stats();
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.closed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_during_targeted_repull_applies_nothing() {
        let backend = seeded();
        let motion = MotionPreference::new(true);
        let handle = realtime(&backend, &motion).spawn();

        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;

        backend.set_latency(Duration::from_secs(10));
        backend.insert_row("analytics_events", completion());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let report = handle.shutdown().await;
        assert_eq!(report.pulls_cancelled, 1);
        assert_eq!(report.subscriptions_closed, 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*raw.borrow(), expected(10, 5, 2));
        assert_eq!(backend.channel_stats().active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_mid_animation_continues_from_displayed_values() {
        let backend = seeded();
        let motion = MotionPreference::new(false);
        let handle = realtime(&backend, &motion).spawn();

        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let mid = handle.snapshot();
        let mid_active = mid.value(MetricKey::ActiveLearners);
        assert!(mid_active > 0 && mid_active < 10, "not mid-animation: {:?}", mid);

        for _ in 0..8 {
            backend.insert_row("analytics_events", completion());
        }

        let mut samples = vec![mid];
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(16)).await;
            samples.push(handle.snapshot());
        }

        for key in MetricKey::ALL {
            for pair in samples.windows(2) {
                assert!(
                    pair[1].value(key) >= pair[0].value(key),
                    "{} went backwards: {:?} -> {:?}",
                    key,
                    pair[0],
                    pair[1]
                );
            }
        }
        assert_eq!(*raw.borrow(), expected(10, 5, 10));
        assert_eq!(handle.snapshot(), expected(10, 5, 10));
        handle.shutdown().await;
    }

    #[test]
    fn test_polling_interval_ms_saturates() {
        let mut settings = MetricsSettings::default();
        assert_eq!(settings.polling_interval_ms(), 45_000);

        settings.polling_interval = Duration::MAX;
        assert_eq!(settings.polling_interval_ms(), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_failure_degrades_to_pull_only() {
        let backend = seeded();
        backend.fail_channel_opens(true);
        let motion = MotionPreference::new(true);
        let handle = realtime(&backend, &motion).spawn();

        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;
        let report = handle.shutdown().await;
        assert_eq!(report.subscriptions_closed, 0);
        assert_eq!(backend.channel_stats().opened, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_controller() {
        let backend = seeded();
        let motion = MotionPreference::new(true);
        let handle = realtime(&backend, &motion).spawn();
        let mut raw = handle.subscribe_raw();
        wait_for(&mut raw, &expected(10, 5, 2), Duration::from_secs(1)).await;

        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.channel_stats().active(), 0);
    }
}
