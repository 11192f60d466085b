//! # Configuration System
//!
//! Hierarchical TOML configuration for EduSphere.
//!
//! ## Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.edusphere/config.toml`
//! 3. **Project config** - `./.edusphere/config.toml`
//! 4. **Environment** - backend url and key
//! 5. **CLI arguments** - Command-line flags (highest priority)
//!
//! ## Loading Configuration
//!
//! ```rust,no_run
//! use edusphere_core::config::EduConfig;
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EduConfig::load_hierarchy()?;
//!     let interval = config.metrics.polling_interval();
//!     Ok(())
//! }
//! ```

pub mod defaults;
pub mod loading;
pub mod types;
pub mod validation;

pub use types::{
    AnalyticsConfig, BackendConfig, Config, EduConfig, FeaturesConfig, MetricsConfig,
    NotificationsConfig, ParticlesConfig, PresenceConfig, UiConfig,
};
pub use validation::{VALID_THEMES, validate_config};

impl EduConfig {
    /// Load configuration from the hierarchy of config files.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, crate::errors::ConfigError> {
        loading::load_hierarchy()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), crate::errors::ConfigError> {
        validation::validate_config(self)
    }

    /// Whether a named feature flag is on, falling back to `default`.
    pub fn is_feature_enabled(&self, key: &str, default: bool) -> bool {
        self.features.is_enabled(key, default)
    }

    /// Whether experiments are globally enabled.
    pub fn experiments_enabled(&self) -> bool {
        self.features.experiments_enabled
    }
}
