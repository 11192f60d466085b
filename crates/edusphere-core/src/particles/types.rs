use serde::{Deserialize, Serialize};

use crate::config::ParticlesConfig;

pub const DEFAULT_DENSITY: f64 = 0.00012;
pub const DEFAULT_MAX_RADIUS: f64 = 2.4;
pub const DEFAULT_COLOR: &str = "rgba(37, 99, 235, 0.18)";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    pub alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleSettings {
    /// Particles per square pixel.
    pub density: f64,
    pub max_radius: f64,
    /// Velocity multiplier.
    pub speed: f64,
    /// Multiplier for count and size.
    pub intensity: f64,
    /// Whether pointer proximity perturbs particles.
    pub interactive: bool,
    pub color: String,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        Self {
            density: DEFAULT_DENSITY,
            max_radius: DEFAULT_MAX_RADIUS,
            speed: 1.0,
            intensity: 1.0,
            interactive: true,
            color: DEFAULT_COLOR.to_string(),
        }
    }
}

impl ParticleSettings {
    pub fn from_config(config: &ParticlesConfig) -> Self {
        let defaults = Self::default();
        Self {
            density: config.density.unwrap_or(defaults.density),
            max_radius: config.max_radius.unwrap_or(defaults.max_radius),
            speed: config.speed.unwrap_or(defaults.speed),
            intensity: config.intensity.unwrap_or(defaults.intensity),
            interactive: config.interactive.unwrap_or(defaults.interactive),
            color: config.color.clone().unwrap_or(defaults.color),
        }
    }
}

/// Viewport input delivered to a running animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportEvent {
    Resize { width: f64, height: f64 },
    PointerMove { x: f64, y: f64 },
    PointerLeave,
}
