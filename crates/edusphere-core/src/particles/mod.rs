//! Decorative particle field.

pub mod animation;
pub mod field;
pub mod types;

pub use animation::ParticleAnimation;
pub use field::{MAX_PARTICLES, ParticleField, Surface, particle_count, scaled_max_radius};
pub use types::{Particle, ParticleSettings, ViewportEvent};
