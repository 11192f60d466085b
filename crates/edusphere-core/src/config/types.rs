//! Configuration type definitions for EduSphere.
//!
//! These types are serialized/deserialized from TOML config files. Every
//! tunable is optional in the file; accessors in [`super::defaults`] supply
//! the built-in value when a field is absent.
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! url = "https://project.supabase.co"
//! api_key = "public-anon-key"
//!
//! [metrics]
//! polling_interval_ms = 45000
//! animation_duration_ms = 500
//! presence_table = "user_presence"
//!
//! [notifications]
//! capacity = 20
//!
//! [ui]
//! theme = "dark"
//! reduced_motion = true
//!
//! [features]
//! experiments_enabled = true
//! flags = { live_metrics = true }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Runtime configuration derived from environment variables and system
/// defaults, not from config files.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for EduSphere data (default: ~/.edusphere)
    pub data_dir: PathBuf,
    /// Log level for the application
    pub log_level: String,
}

/// Main configuration loaded from TOML config files.
///
/// Loaded from:
/// 1. User config: `~/.edusphere/config.toml`
/// 2. Project config: `./.edusphere/config.toml`
///
/// Project config values override user config values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EduConfig {
    /// Hosted backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Live metrics synchronization
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Per-user notification channel
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Presence channel
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Decorative particle field
    #[serde(default)]
    pub particles: ParticlesConfig,

    /// Display preferences
    #[serde(default)]
    pub ui: UiConfig,

    /// Analytics event queue
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Feature flags and experiments
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Hosted backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://project.supabase.co`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Public API key sent as `apikey` and bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    /// Default: 10 seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Live metrics synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsConfig {
    /// Interval between fallback full pulls.
    /// Default: 45000ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_ms: Option<u64>,

    /// Duration of the display interpolation toward a new snapshot.
    /// Default: 500ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_duration_ms: Option<u64>,

    /// Interval between animation frames.
    /// Default: 16ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_interval_ms: Option<u64>,

    /// Whether push subscriptions are opened at all.
    /// Default: true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courses_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_events_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_table: Option<String>,

    /// Window for the active-learner fallback count.
    /// Default: 15 minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_window_minutes: Option<u64>,

    /// Event name counted as a completion.
    /// Default: "completion".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_event_name: Option<String>,

    /// Window for the recent-completion count.
    /// Default: 1440 minutes (24 hours).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_window_minutes: Option<u64>,
}

/// Per-user notification channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    /// Maximum number of retained notifications.
    /// Default: 20.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,

    /// Broadcast event name carrying a notification.
    /// Default: "notify".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Prefix of the per-user topic (`<prefix><user id>`).
    /// Default: "user_".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PresenceConfig {
    /// Shared presence topic.
    /// Default: "edusphere-presence".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Particle field settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParticlesConfig {
    /// Particles per square pixel.
    /// Default: 0.00012.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_radius: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,

    /// Whether pointer proximity perturbs particles.
    /// Default: true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Display preferences.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UiConfig {
    /// Initial theme: light or dark.
    /// Default: "light".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    /// Initial reduced-motion preference.
    /// Default: false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_motion: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsConfig {
    /// Seconds between queue flushes.
    /// Default: 5 seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_interval_secs: Option<u64>,

    /// Table receiving captured events.
    /// Default: "analytics_events".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

/// Feature flags and experiment switch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub flags: HashMap<String, bool>,

    #[serde(default)]
    pub experiments_enabled: bool,
}
