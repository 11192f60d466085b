use crate::config::defaults::MAX_NOTIFICATION_CAPACITY;
use crate::config::types::EduConfig;
use crate::errors::ConfigError;

pub const VALID_THEMES: &[&str] = &["light", "dark"];

/// Validate a merged configuration.
pub fn validate_config(config: &EduConfig) -> Result<(), ConfigError> {
    let theme = config.ui.theme();
    if !VALID_THEMES.contains(&theme) {
        return Err(ConfigError::InvalidTheme {
            theme: theme.to_string(),
        });
    }

    if let Some(url) = &config.backend.url
        && !(url.starts_with("https://") || url.starts_with("http://"))
    {
        return Err(invalid(format!(
            "backend.url must start with http:// or https://, got '{}'",
            url
        )));
    }

    if config.metrics.polling_interval_ms == Some(0) {
        return Err(invalid("metrics.polling_interval_ms must be greater than 0"));
    }
    if config.metrics.frame_interval_ms == Some(0) {
        return Err(invalid("metrics.frame_interval_ms must be greater than 0"));
    }
    if config.notifications.capacity == Some(0) {
        return Err(invalid("notifications.capacity must be greater than 0"));
    }
    if let Some(capacity) = config.notifications.capacity
        && capacity > MAX_NOTIFICATION_CAPACITY
    {
        return Err(invalid(format!(
            "notifications.capacity must be at most {}, got {}",
            MAX_NOTIFICATION_CAPACITY, capacity
        )));
    }
    if config.analytics.flush_interval_secs == Some(0) {
        return Err(invalid("analytics.flush_interval_secs must be greater than 0"));
    }

    for (name, value) in [
        ("particles.density", config.particles.density),
        ("particles.max_radius", config.particles.max_radius),
        ("particles.speed", config.particles.speed),
        ("particles.intensity", config.particles.intensity),
    ] {
        if let Some(v) = value
            && !(v.is_finite() && v > 0.0)
        {
            return Err(invalid(format!("{} must be a positive number", name)));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfiguration {
        message: message.into(),
    }
}
