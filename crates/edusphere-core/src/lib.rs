//! edusphere-core: Live data synchronization for the EduSphere learning platform
//!
//! This library keeps client-side views of a hosted backend current by
//! combining an initial pull, push channel updates and an interval fallback.
//! It is used by the `edusphere` CLI.
//!
//! # Main Entry Points
//!
//! - [`metrics`] - Live metrics controller with display smoothing
//! - [`presence`] - Presence roster for the signed-in user
//! - [`notifications`] - Per-user notification feed
//! - [`particles`] - Decorative particle animation
//! - [`backend`] - Row and channel seams, in-memory and REST backends
//! - [`config`] - Configuration management

pub mod analytics;
pub mod backend;
pub mod channel;
pub mod config;
pub mod errors;
pub mod events;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod motion;
pub mod notifications;
pub mod particles;
pub mod presence;
pub mod theme;

// Re-export commonly used types at crate root for convenience
pub use analytics::{AnalyticsFlusher, AnalyticsQueue};
pub use backend::{BackendError, ChannelHub, MemoryBackend, RestBackend, RowQuery, RowSource};
pub use channel::{ChannelEvent, ChannelSpec, ChannelStatus, ChannelSubscription};
pub use config::EduConfig;
pub use errors::{ConfigError, EduError, EduResult, PayloadError};
pub use identity::Identity;
pub use metrics::{
    BackendMetrics, MetricKey, MetricSnapshot, MetricsController, MetricsHandle, MetricsSettings,
    MetricsSource, TeardownReport,
};
pub use motion::{MotionPreference, Tween};
pub use notifications::{NotificationFeed, NotificationHandle, spawn_notifications};
pub use particles::{ParticleAnimation, ParticleField, ParticleSettings, Surface};
pub use presence::{PresenceHandle, PresenceRoster, spawn_presence};
pub use theme::{Theme, ThemeStore};

// Re-export logging initialization
pub use logging::init_logging;
