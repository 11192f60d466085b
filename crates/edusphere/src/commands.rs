use std::sync::Arc;
use std::time::Duration;

use clap::ArgMatches;
use serde_json::json;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{error, info, warn};

use edusphere_core::backend::ChannelStats;
use edusphere_core::channel::ChannelBinding;
use edusphere_core::config::EduConfig;
use edusphere_core::events;
use edusphere_core::metrics::{MetricQueries, default_triggers};
use edusphere_core::{
    AnalyticsQueue, BackendMetrics, ChannelSpec, ChannelSubscription, Identity, MemoryBackend,
    MetricKey, MetricSnapshot, MetricsController, MetricsSettings, MetricsSource,
    MotionPreference, ParticleAnimation, ParticleField, ParticleSettings, RestBackend, Surface,
    Theme, ThemeStore, spawn_notifications, spawn_presence,
};

use crate::table::TableFormatter;

/// Load configuration with warning on errors.
///
/// Falls back to defaults if config loading fails, but notifies the user via:
/// - stderr message for immediate visibility
/// - structured log event `cli.config.load_failed` for debugging
fn load_config_with_warning() -> EduConfig {
    match EduConfig::load_hierarchy() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Could not load config: {}. Using defaults.\n\
                 Tip: Check ~/.edusphere/config.toml and ./.edusphere/config.toml for syntax errors.",
                e
            );
            warn!(
                event = "cli.config.load_failed",
                error = %e,
                "Config load failed, using defaults"
            );
            EduConfig::default()
        }
    }
}

pub fn run_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    events::log_app_startup();

    let result = match matches.subcommand() {
        Some(("metrics", sub_matches)) => handle_metrics_command(sub_matches),
        Some(("watch", sub_matches)) => handle_watch_command(sub_matches),
        Some(("simulate", sub_matches)) => handle_simulate_command(sub_matches),
        Some(("config", sub_matches)) => handle_config_command(sub_matches),
        _ => {
            error!(event = "cli.command_unknown");
            Err("Unknown command".into())
        }
    };

    events::log_app_shutdown();
    result
}

fn handle_metrics_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    let config = load_config_with_warning();

    info!(event = "cli.metrics_started");

    let rest = match RestBackend::from_config(&config.backend) {
        Ok(rest) => Arc::new(rest),
        Err(e) => {
            eprintln!("❌ {}", e);
            eprintln!("   Set EDUSPHERE_BACKEND_URL and EDUSPHERE_BACKEND_KEY or add a [backend] section.");
            error!(event = "cli.metrics_failed", error = %e);
            events::log_app_error(&e);
            return Err(Box::new(e));
        }
    };
    let source = BackendMetrics::new(rest, MetricQueries::from_config(&config.metrics));

    let runtime = Runtime::new()?;
    let snapshot = match runtime.block_on(source.fetch_all()) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("❌ Failed to fetch metrics: {}", e);
            error!(event = "cli.metrics_failed", error = %e);
            events::log_app_error(&e);
            return Err(Box::new(e));
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        TableFormatter::new(&snapshot).print_table(&snapshot);
    }

    info!(event = "cli.metrics_completed");
    Ok(())
}

fn handle_watch_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    let seconds = matches.get_one::<u64>("seconds").copied();
    let mut config = load_config_with_warning();
    if let Some(ms) = matches.get_one::<u64>("polling-interval-ms") {
        config.metrics.polling_interval_ms = Some(*ms);
    }

    let rest = Arc::new(RestBackend::from_config(&config.backend).inspect_err(|e| {
        eprintln!("❌ {}", e);
        error!(event = "cli.watch_failed", error = %e);
    })?);
    let source = Arc::new(BackendMetrics::new(
        rest,
        MetricQueries::from_config(&config.metrics),
    ));
    let settings = MetricsSettings::from_config(&config.metrics);
    let motion = MotionPreference::new(config.ui.reduced_motion());

    info!(
        event = "cli.watch_started",
        polling_interval_ms = settings.polling_interval_ms(),
        seconds = seconds
    );

    let runtime = Runtime::new()?;
    runtime.block_on(async {
        // REST has no push adapter, so the controller runs on its fallback
        // interval alone.
        let handle = MetricsController::new(source, settings, motion.subscribe()).spawn();
        let mut raw = handle.subscribe_raw();
        let started = Instant::now();
        let deadline = seconds.map(|s| started + Duration::from_secs(s));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = wait_until(deadline) => break,
                changed = raw.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = raw.borrow_and_update().clone();
                    print_snapshot(&snapshot, started.elapsed(), json_output);
                }
            }
        }

        let report = handle.shutdown().await;
        info!(
            event = "cli.watch_completed",
            pulls_cancelled = report.pulls_cancelled
        );
    });

    Ok(())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn print_snapshot(snapshot: &MetricSnapshot, elapsed: Duration, json_output: bool) {
    if json_output {
        let line = json!({
            "type": "snapshot",
            "elapsed_ms": millis(elapsed),
            "metrics": snapshot,
        });
        println!("{}", line);
    } else {
        let values: Vec<String> = MetricKey::ALL
            .iter()
            .map(|key| format!("{} {}", key.label(), snapshot.value(*key)))
            .collect();
        println!("[{:>6.1}s] {}", elapsed.as_secs_f64(), values.join(" | "));
    }
}

/// Surface that only counts what it is asked to draw.
#[derive(Debug, Default)]
struct CountingSurface {
    frames: u64,
    circles: u64,
}

impl Surface for CountingSurface {
    fn clear(&mut self, _width: f64, _height: f64) {
        self.frames += 1;
    }

    fn fill_circle(&mut self, _x: f64, _y: f64, _radius: f64, _color: &str, _alpha: f64) {
        self.circles += 1;
    }
}

const SIMULATED_COURSES: u64 = 5;
const SIMULATED_LEARNERS: u64 = 10;
const SIMULATED_COMPLETIONS: u64 = 2;
const FEED_PERIOD: Duration = Duration::from_millis(750);

fn seed_backend(backend: &MemoryBackend, config: &EduConfig) {
    let metrics = &config.metrics;
    let now = chrono::Utc::now().to_rfc3339();

    backend.seed(
        metrics.courses_table(),
        (1..=SIMULATED_COURSES)
            .map(|id| json!({"id": id, "title": format!("Course {}", id)}))
            .collect(),
    );
    backend.seed(
        metrics.presence_table(),
        (0..SIMULATED_LEARNERS)
            .map(|n| json!({"user_id": format!("learner-{}", n)}))
            .collect(),
    );
    backend.seed(
        metrics.analytics_events_table(),
        (0..SIMULATED_COMPLETIONS)
            .map(|n| {
                json!({
                    "id": format!("seed-{}", n),
                    "event_name": metrics.completion_event_name(),
                    "user_id": format!("learner-{}", n),
                    "created_at": now,
                })
            })
            .collect(),
    );
    if metrics.analytics_events_table() != config.analytics.table() {
        backend.create_table(config.analytics.table());
    }
}

/// One scripted step: a completion, a presence join and a notification.
fn feed_step(
    backend: &Arc<MemoryBackend>,
    config: &EduConfig,
    user: &Identity,
    step: u64,
    peers: &mut Vec<ChannelSubscription>,
) {
    let metrics = &config.metrics;
    let learner = format!("learner-{}", SIMULATED_LEARNERS + step);

    backend.insert_row(
        metrics.analytics_events_table(),
        json!({
            "id": format!("live-{}", step),
            "event_name": metrics.completion_event_name(),
            "user_id": learner,
            "created_at": chrono::Utc::now().to_rfc3339(),
        }),
    );
    backend.insert_row(metrics.presence_table(), json!({"user_id": learner}));

    let spec = ChannelSpec::new(config.presence.topic()).bind(ChannelBinding::Presence {
        key: learner.clone(),
    });
    match ChannelSubscription::open(backend.clone(), spec) {
        Ok(peer) => {
            let meta = json!({"key": learner, "online_at": chrono::Utc::now().to_rfc3339()});
            if let Err(e) = peer.track(meta) {
                warn!(event = "cli.simulate.peer_track_failed", peer = %learner, error = %e);
            }
            peers.push(peer);
        }
        Err(e) => warn!(event = "cli.simulate.peer_open_failed", peer = %learner, error = %e),
    }

    let topic = format!("{}{}", config.notifications.topic_prefix(), user.user_id());
    backend.broadcast(
        &topic,
        config.notifications.event(),
        json!({"title": format!("{} finished a course", learner), "step": step}),
    );
}

fn handle_simulate_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    let seconds = matches.get_one::<u64>("seconds").copied().unwrap_or(3);
    let user = matches
        .get_one::<String>("user")
        .map(String::as_str)
        .unwrap_or("learner-1");

    let config = load_config_with_warning();
    let reduced = matches.get_flag("reduced-motion") || config.ui.reduced_motion();
    let identity = Identity::new(user).inspect_err(|e| {
        eprintln!("❌ Invalid user id: {}", e);
        error!(event = "cli.simulate_failed", error = %e);
    })?;
    let theme: Theme = config.ui.theme().parse().unwrap_or_default();
    let particles_enabled = config.is_feature_enabled("particles", true);

    info!(
        event = "cli.simulate_started",
        user = %identity,
        seconds = seconds,
        reduced_motion = reduced
    );

    let runtime = Runtime::new()?;
    let summary = runtime.block_on(async {
        let backend = Arc::new(MemoryBackend::new());
        seed_backend(&backend, &config);

        let motion = MotionPreference::new(reduced);
        let themes = ThemeStore::new(theme);
        let (identity_tx, identity_rx) = watch::channel(Some(identity.clone()));

        let analytics = Arc::new(AnalyticsQueue::new(backend.clone(), &config.analytics));
        analytics.capture(
            "simulate_started",
            json!({"user": identity.user_id(), "theme": themes.current().as_str()}),
        );
        let flusher = analytics.clone().spawn_flusher(config.analytics.flush_interval());

        let source = Arc::new(BackendMetrics::new(
            backend.clone(),
            MetricQueries::from_config(&config.metrics),
        ));
        let mut controller = MetricsController::new(
            source,
            MetricsSettings::from_config(&config.metrics),
            motion.subscribe(),
        );
        if config.metrics.realtime_enabled() {
            controller = controller.with_realtime(backend.clone(), default_triggers(&config.metrics));
        }
        let metrics = controller.spawn();
        let presence = spawn_presence(backend.clone(), identity_rx.clone(), &config.presence);
        let notifications =
            spawn_notifications(backend.clone(), identity_rx, &config.notifications);

        let animation = particles_enabled.then(|| {
            let field = ParticleField::new(
                ParticleSettings::from_config(&config.particles),
                800.0,
                600.0,
                reduced,
            );
            ParticleAnimation::spawn(
                field,
                CountingSurface::default(),
                motion.subscribe(),
                config.metrics.frame_interval(),
            )
        });

        let mut raw = metrics.subscribe_raw();
        let mut feed = interval(FEED_PERIOD);
        feed.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        feed.tick().await;

        let started = Instant::now();
        let deadline = started + Duration::from_secs(seconds);
        let mut step = 0;
        let mut peers = Vec::new();

        loop {
            tokio::select! {
                biased;

                _ = sleep_until(deadline) => break,
                changed = raw.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = raw.borrow_and_update().clone();
                    print_snapshot(&snapshot, started.elapsed(), json_output);
                }
                _ = feed.tick() => {
                    feed_step(&backend, &config, &identity, step, &mut peers);
                    analytics.capture("simulate_step", json!({"step": step}));
                    if let Some(animation) = &animation {
                        animation.pointer_move(40.0 * step as f64, 30.0 * step as f64);
                    }
                    step += 1;
                }
            }
        }

        let roster = presence.roster();
        let feed_state = notifications.feed();
        let display = metrics.snapshot();
        let final_metrics = metrics.raw();

        let teardown = metrics.shutdown().await;
        presence.shutdown().await;
        notifications.shutdown().await;
        for peer in peers {
            peer.close();
        }
        drop(identity_tx);
        flusher.shutdown().await;

        let particle_frames = match animation {
            Some(animation) => animation.shutdown().await.map_or(0, |s| s.frames),
            None => 0,
        };

        SimulationSummary {
            steps: step,
            metrics: final_metrics,
            display,
            present: roster.keys().map(str::to_string).collect(),
            notifications: feed_state.len(),
            unread: feed_state.unread(),
            latest_notification: feed_state
                .items()
                .next()
                .map(|item| item.display_title().to_string()),
            subscriptions_closed: teardown.subscriptions_closed,
            pulls_cancelled: teardown.pulls_cancelled,
            channels: backend.channel_stats(),
            analytics_pending: analytics.pending(),
            particle_frames,
            theme: themes.current(),
        }
    });

    summary.print(json_output)?;

    info!(
        event = "cli.simulate_completed",
        steps = summary.steps,
        channels_active = summary.channels.active()
    );
    Ok(())
}

struct SimulationSummary {
    steps: u64,
    metrics: MetricSnapshot,
    display: MetricSnapshot,
    present: Vec<String>,
    notifications: usize,
    unread: usize,
    latest_notification: Option<String>,
    subscriptions_closed: usize,
    pulls_cancelled: usize,
    channels: ChannelStats,
    analytics_pending: usize,
    particle_frames: u64,
    theme: Theme,
}

impl SimulationSummary {
    fn print(&self, json_output: bool) -> Result<(), serde_json::Error> {
        if json_output {
            let line = json!({
                "type": "summary",
                "steps": self.steps,
                "metrics": self.metrics,
                "display": self.display,
                "present": self.present,
                "notifications": self.notifications,
                "unread": self.unread,
                "latest_notification": self.latest_notification,
                "subscriptions_closed": self.subscriptions_closed,
                "pulls_cancelled": self.pulls_cancelled,
                "channels": {
                    "opened": self.channels.opened,
                    "closed": self.channels.closed,
                    "active": self.channels.active(),
                },
                "analytics_pending": self.analytics_pending,
                "particle_frames": self.particle_frames,
                "theme": self.theme.as_str(),
            });
            println!("{}", serde_json::to_string(&line)?);
            return Ok(());
        }

        println!();
        println!("Simulation finished after {} scripted steps", self.steps);
        TableFormatter::new(&self.metrics).print_table(&self.metrics);
        println!("Present:        {}", self.present.join(", "));
        println!(
            "Notifications:  {} ({} unread){}",
            self.notifications,
            self.unread,
            self.latest_notification
                .as_deref()
                .map(|title| format!(", latest: {}", title))
                .unwrap_or_default()
        );
        println!(
            "Channels:       {} opened, {} closed, {} active",
            self.channels.opened,
            self.channels.closed,
            self.channels.active()
        );
        println!(
            "Teardown:       {} subscriptions closed, {} pulls cancelled",
            self.subscriptions_closed, self.pulls_cancelled
        );
        println!("Particles:      {} frames", self.particle_frames);
        println!("Theme:          {} ({})", self.theme, self.theme.toggle_label());
        Ok(())
    }
}

fn handle_config_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    let config = redacted(load_config_with_warning());

    if json_output {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }

    info!(event = "cli.config_completed");
    Ok(())
}

fn redacted(mut config: EduConfig) -> EduConfig {
    if config.backend.api_key.is_some() {
        config.backend.api_key = Some("***".to_string());
    }
    config
}
