//! Frame loop driving a [`ParticleField`] onto a [`Surface`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::field::{ParticleField, Surface};
use super::types::ViewportEvent;

/// Handle to a running particle animation.
///
/// Viewport events are delivered through the handle; the registration is
/// released when the loop ends.
pub struct ParticleAnimation<S> {
    events: mpsc::UnboundedSender<ViewportEvent>,
    frames: Arc<AtomicU64>,
    token: CancellationToken,
    task: Option<JoinHandle<S>>,
}

impl<S: Surface + Send + 'static> ParticleAnimation<S> {
    /// Start animating `field` onto `surface`.
    ///
    /// With reduced motion a single static frame is drawn and no loop runs;
    /// resize and pointer events then redraw one frame each.
    pub fn spawn(
        field: ParticleField,
        surface: S,
        motion: watch::Receiver<bool>,
        frame_interval: Duration,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let frames = Arc::new(AtomicU64::new(0));
        let token = CancellationToken::new();

        let task = tokio::spawn(run(
            field,
            surface,
            events_rx,
            motion,
            frame_interval.max(Duration::from_millis(1)),
            frames.clone(),
            token.clone(),
        ));

        Self {
            events: events_tx,
            frames,
            token,
            task: Some(task),
        }
    }

    pub fn resize(&self, width: f64, height: f64) {
        self.send(ViewportEvent::Resize { width, height });
    }

    pub fn pointer_move(&self, x: f64, y: f64) {
        self.send(ViewportEvent::PointerMove { x, y });
    }

    pub fn pointer_leave(&self) {
        self.send(ViewportEvent::PointerLeave);
    }

    fn send(&self, event: ViewportEvent) {
        if self.events.send(event).is_err() {
            debug!(event = "core.particles.event_dropped", reason = "animation stopped");
        }
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Whether the loop still accepts viewport events.
    pub fn is_listening(&self) -> bool {
        !self.events.is_closed()
    }

    /// Stop the loop and hand back the surface.
    pub async fn shutdown(mut self) -> Option<S> {
        self.token.cancel();
        let task = self.task.take()?;
        match task.await {
            Ok(surface) => Some(surface),
            Err(e) => {
                warn!(event = "core.particles.shutdown_failed", error = %e);
                None
            }
        }
    }
}

impl<S> Drop for ParticleAnimation<S> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn draw<S: Surface>(field: &ParticleField, surface: &mut S, frames: &AtomicU64) {
    field.draw(surface);
    frames.fetch_add(1, Ordering::Relaxed);
}

async fn run<S: Surface>(
    mut field: ParticleField,
    mut surface: S,
    mut events: mpsc::UnboundedReceiver<ViewportEvent>,
    mut motion: watch::Receiver<bool>,
    frame_interval: Duration,
    frames: Arc<AtomicU64>,
    token: CancellationToken,
) -> S {
    let mut reduced = *motion.borrow_and_update();
    field.set_reduced(reduced);
    if reduced {
        draw(&field, &mut surface, &frames);
    }

    let mut frame = interval(frame_interval);
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut motion_open = true;

    debug!(
        event = "core.particles.started",
        particles = field.particles().len(),
        reduced = reduced
    );

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ViewportEvent::Resize { width, height } => field.resize(width, height),
                    ViewportEvent::PointerMove { x, y } => field.set_pointer(Some((x, y))),
                    ViewportEvent::PointerLeave => field.set_pointer(None),
                }
                if reduced && !matches!(event, ViewportEvent::PointerLeave) {
                    draw(&field, &mut surface, &frames);
                }
            }
            changed = motion.changed(), if motion_open => {
                match changed {
                    Ok(()) => {
                        reduced = *motion.borrow_and_update();
                        field.set_reduced(reduced);
                        if reduced {
                            draw(&field, &mut surface, &frames);
                        } else {
                            frame.reset();
                        }
                    }
                    Err(_) => motion_open = false,
                }
            }
            _ = frame.tick(), if !reduced => {
                field.step();
                draw(&field, &mut surface, &frames);
            }
        }
    }

    events.close();
    debug!(
        event = "core.particles.stopped",
        frames = frames.load(Ordering::Relaxed)
    );
    surface
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionPreference;
    use crate::particles::types::ParticleSettings;

    #[derive(Debug, Default)]
    struct Recording {
        clears: usize,
        circles: usize,
        last_size: (f64, f64),
    }

    impl Surface for Recording {
        fn clear(&mut self, width: f64, height: f64) {
            self.clears += 1;
            self.last_size = (width, height);
        }

        fn fill_circle(&mut self, _x: f64, _y: f64, _radius: f64, _color: &str, _alpha: f64) {
            self.circles += 1;
        }
    }

    fn field() -> ParticleField {
        ParticleField::seeded(ParticleSettings::default(), 320.0, 240.0, false, 11)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_frames_until_shutdown() {
        let motion = MotionPreference::new(false);
        let animation = ParticleAnimation::spawn(
            field(),
            Recording::default(),
            motion.subscribe(),
            Duration::from_millis(16),
        );

        tokio::time::sleep(Duration::from_millis(160)).await;
        assert!(animation.frames_drawn() >= 5);
        assert!(animation.is_listening());

        let surface = animation.shutdown().await.unwrap();
        assert!(surface.clears >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reduced_motion_draws_one_static_frame() {
        let motion = MotionPreference::new(true);
        let animation = ParticleAnimation::spawn(
            field(),
            Recording::default(),
            motion.subscribe(),
            Duration::from_millis(16),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(animation.frames_drawn(), 1);

        animation.pointer_move(10.0, 10.0);
        animation.resize(640.0, 480.0);
        animation.pointer_leave();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(animation.frames_drawn(), 3);

        let surface = animation.shutdown().await.unwrap();
        assert_eq!(surface.clears, 3);
        assert_eq!(surface.last_size, (640.0, 480.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_to_reduced_motion_stops_loop() {
        let motion = MotionPreference::new(false);
        let animation = ParticleAnimation::spawn(
            field(),
            Recording::default(),
            motion.subscribe(),
            Duration::from_millis(16),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        motion.set_reduced(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_switch = animation.frames_drawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(animation.frames_drawn(), after_switch);

        animation.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_event_registration() {
        let motion = MotionPreference::new(false);
        let animation = ParticleAnimation::spawn(
            field(),
            Recording::default(),
            motion.subscribe(),
            Duration::from_millis(16),
        );
        let events = animation.events.clone();

        animation.shutdown().await;
        assert!(events.is_closed());
        assert!(events.send(ViewportEvent::PointerLeave).is_err());
    }
}
