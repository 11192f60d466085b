//! Configuration loading and merging logic.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.edusphere/config.toml`
//! 3. **Project config** - `./.edusphere/config.toml`
//! 4. **Environment** - `EDUSPHERE_BACKEND_URL`, `EDUSPHERE_BACKEND_KEY`
//! 5. **CLI arguments** - Command-line flags (highest priority, applied by the CLI)

use crate::config::types::{
    AnalyticsConfig, BackendConfig, EduConfig, FeaturesConfig, MetricsConfig,
    NotificationsConfig, ParticlesConfig, PresenceConfig, UiConfig,
};
use crate::config::validation::validate_config;
use crate::errors::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_BACKEND_URL: &str = "EDUSPHERE_BACKEND_URL";
pub const ENV_BACKEND_KEY: &str = "EDUSPHERE_BACKEND_KEY";

/// Load configuration from the hierarchy of config files and environment.
///
/// # Errors
///
/// Returns an error if a present file fails to parse or the merged
/// configuration fails validation. Missing config files are not errors.
pub fn load_hierarchy() -> Result<EduConfig, ConfigError> {
    let user_path = dirs::home_dir().map(|home| home.join(".edusphere").join("config.toml"));
    let project_path = std::env::current_dir()
        .ok()
        .map(|cwd| cwd.join(".edusphere").join("config.toml"));

    let config = load_from_paths(user_path.as_deref(), project_path.as_deref())?;
    let config = apply_env_overrides(config, |key| std::env::var(key).ok());

    validate_config(&config)?;

    Ok(config)
}

/// Load and merge the user and project files, skipping any that are absent.
pub fn load_from_paths(
    user_path: Option<&Path>,
    project_path: Option<&Path>,
) -> Result<EduConfig, ConfigError> {
    let mut config = EduConfig::default();

    for path in [user_path, project_path].into_iter().flatten() {
        match load_config_file(path) {
            Ok(file_config) => config = merge_configs(config, file_config),
            Err(ConfigError::ConfigNotFound { path }) => {
                debug!(event = "core.config.file_missing", path = %path);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(config)
}

/// Load a configuration file from the given path.
pub fn load_config_file(path: &Path) -> Result<EduConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(ConfigError::IoError { source: e }),
    };

    toml::from_str(&content).map_err(|e| ConfigError::ConfigParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Apply environment overrides for backend credentials.
///
/// Takes a lookup function so tests don't have to mutate process env.
pub fn apply_env_overrides<F>(mut config: EduConfig, lookup: F) -> EduConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.trim().is_empty()) {
        config.backend.url = Some(url.trim().to_string());
    }
    if let Some(key) = lookup(ENV_BACKEND_KEY).filter(|v| !v.trim().is_empty()) {
        config.backend.api_key = Some(key.trim().to_string());
    }
    config
}

/// Default location of the project config relative to a directory.
pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(".edusphere").join("config.toml")
}

/// Merge two configurations, with override_config taking precedence.
///
/// Optional fields are replaced only when present in the override. Feature
/// flags are merged per key.
pub fn merge_configs(base: EduConfig, override_config: EduConfig) -> EduConfig {
    let o = override_config;
    EduConfig {
        backend: BackendConfig {
            url: o.backend.url.or(base.backend.url),
            api_key: o.backend.api_key.or(base.backend.api_key),
            request_timeout_secs: o
                .backend
                .request_timeout_secs
                .or(base.backend.request_timeout_secs),
        },
        metrics: MetricsConfig {
            polling_interval_ms: o
                .metrics
                .polling_interval_ms
                .or(base.metrics.polling_interval_ms),
            animation_duration_ms: o
                .metrics
                .animation_duration_ms
                .or(base.metrics.animation_duration_ms),
            frame_interval_ms: o
                .metrics
                .frame_interval_ms
                .or(base.metrics.frame_interval_ms),
            realtime_enabled: o
                .metrics
                .realtime_enabled
                .or(base.metrics.realtime_enabled),
            courses_table: o.metrics.courses_table.or(base.metrics.courses_table),
            analytics_events_table: o
                .metrics
                .analytics_events_table
                .or(base.metrics.analytics_events_table),
            presence_table: o.metrics.presence_table.or(base.metrics.presence_table),
            active_window_minutes: o
                .metrics
                .active_window_minutes
                .or(base.metrics.active_window_minutes),
            completion_event_name: o
                .metrics
                .completion_event_name
                .or(base.metrics.completion_event_name),
            completion_window_minutes: o
                .metrics
                .completion_window_minutes
                .or(base.metrics.completion_window_minutes),
        },
        notifications: NotificationsConfig {
            capacity: o.notifications.capacity.or(base.notifications.capacity),
            event: o.notifications.event.or(base.notifications.event),
            topic_prefix: o
                .notifications
                .topic_prefix
                .or(base.notifications.topic_prefix),
        },
        presence: PresenceConfig {
            topic: o.presence.topic.or(base.presence.topic),
        },
        particles: ParticlesConfig {
            density: o.particles.density.or(base.particles.density),
            max_radius: o.particles.max_radius.or(base.particles.max_radius),
            speed: o.particles.speed.or(base.particles.speed),
            intensity: o.particles.intensity.or(base.particles.intensity),
            interactive: o.particles.interactive.or(base.particles.interactive),
            color: o.particles.color.or(base.particles.color),
        },
        ui: UiConfig {
            theme: o.ui.theme.or(base.ui.theme),
            reduced_motion: o.ui.reduced_motion.or(base.ui.reduced_motion),
        },
        analytics: AnalyticsConfig {
            flush_interval_secs: o
                .analytics
                .flush_interval_secs
                .or(base.analytics.flush_interval_secs),
            table: o.analytics.table.or(base.analytics.table),
        },
        features: FeaturesConfig {
            flags: {
                let mut merged = base.features.flags;
                merged.extend(o.features.flags);
                merged
            },
            experiments_enabled: o.features.experiments_enabled
                || base.features.experiments_enabled,
        },
    }
}
