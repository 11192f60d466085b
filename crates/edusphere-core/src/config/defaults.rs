//! Default values for configuration types.
//!
//! File-backed fields are all optional; the accessors here resolve an unset
//! field to its built-in value.

use crate::config::types::{
    AnalyticsConfig, BackendConfig, Config, FeaturesConfig, MetricsConfig, NotificationsConfig,
    PresenceConfig, UiConfig,
};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 45_000;
pub const DEFAULT_ANIMATION_DURATION_MS: u64 = 500;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 20;
pub const MAX_NOTIFICATION_CAPACITY: usize = 10_000;
pub const DEFAULT_THEME: &str = "light";

impl Default for Config {
    fn default() -> Self {
        let data_dir = match dirs::home_dir() {
            Some(home) => home.join(".edusphere"),
            None => {
                eprintln!(
                    "Warning: Could not find home directory. Set HOME environment variable. \
                    Using fallback directory."
                );
                std::env::temp_dir().join(".edusphere")
            }
        };

        Self {
            data_dir,
            log_level: std::env::var("EDUSPHERE_LOG_LEVEL").unwrap_or("info".to_string()),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Returns `true` when both url and api key are present.
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl MetricsConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(
            self.polling_interval_ms
                .unwrap_or(DEFAULT_POLLING_INTERVAL_MS),
        )
    }

    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(
            self.animation_duration_ms
                .unwrap_or(DEFAULT_ANIMATION_DURATION_MS),
        )
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS))
    }

    pub fn realtime_enabled(&self) -> bool {
        self.realtime_enabled.unwrap_or(true)
    }

    pub fn courses_table(&self) -> &str {
        self.courses_table.as_deref().unwrap_or("courses")
    }

    pub fn analytics_events_table(&self) -> &str {
        self.analytics_events_table
            .as_deref()
            .unwrap_or("analytics_events")
    }

    pub fn presence_table(&self) -> &str {
        self.presence_table.as_deref().unwrap_or("user_presence")
    }

    pub fn active_window_minutes(&self) -> u64 {
        self.active_window_minutes.unwrap_or(15)
    }

    pub fn completion_event_name(&self) -> &str {
        self.completion_event_name
            .as_deref()
            .unwrap_or("completion")
    }

    pub fn completion_window_minutes(&self) -> u64 {
        self.completion_window_minutes.unwrap_or(1440)
    }
}

impl NotificationsConfig {
    pub fn capacity(&self) -> usize {
        self.capacity.unwrap_or(DEFAULT_NOTIFICATION_CAPACITY)
    }

    pub fn event(&self) -> &str {
        self.event.as_deref().unwrap_or("notify")
    }

    pub fn topic_prefix(&self) -> &str {
        self.topic_prefix.as_deref().unwrap_or("user_")
    }
}

impl PresenceConfig {
    pub fn topic(&self) -> &str {
        self.topic.as_deref().unwrap_or("edusphere-presence")
    }
}

impl UiConfig {
    pub fn theme(&self) -> &str {
        self.theme.as_deref().unwrap_or(DEFAULT_THEME)
    }

    pub fn reduced_motion(&self) -> bool {
        self.reduced_motion.unwrap_or(false)
    }
}

impl AnalyticsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.unwrap_or(5))
    }

    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or("analytics_events")
    }
}

impl FeaturesConfig {
    /// Returns the configured flag, or `default` when the flag is not set.
    pub fn is_enabled(&self, key: &str, default: bool) -> bool {
        self.flags.get(key).copied().unwrap_or(default)
    }
}
