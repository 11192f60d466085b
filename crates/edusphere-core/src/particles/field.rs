use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::types::{Particle, ParticleSettings};

/// Upper bound on the particle count regardless of viewport size.
pub const MAX_PARTICLES: usize = 5_000;

const POINTER_RADIUS_SQUARED: f64 = 12_000.0;
const POINTER_FORCE: f64 = -0.00003;
const REDUCED_VELOCITY_FACTOR: f64 = 0.15;

/// Rendering target for the particle field.
pub trait Surface {
    fn clear(&mut self, width: f64, height: f64);
    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: &str, alpha: f64);
}

/// Number of particles for a viewport.
pub fn particle_count(width: f64, height: f64, settings: &ParticleSettings) -> usize {
    let base = (width * height * settings.density).floor().max(8.0);
    let count = (base * settings.intensity.max(0.4)).floor().max(6.0);
    // NaN and infinities saturate in the cast
    (count as usize).min(MAX_PARTICLES)
}

pub fn scaled_max_radius(settings: &ParticleSettings) -> f64 {
    (settings.max_radius * settings.intensity.clamp(0.5, 1.5)).max(0.8)
}

fn sanitize(extent: f64) -> f64 {
    if extent.is_finite() && extent > 0.0 {
        extent
    } else {
        0.0
    }
}

pub struct ParticleField {
    settings: ParticleSettings,
    width: f64,
    height: f64,
    reduced: bool,
    pointer: Option<(f64, f64)>,
    particles: Vec<Particle>,
    rng: StdRng,
}

impl ParticleField {
    pub fn new(settings: ParticleSettings, width: f64, height: f64, reduced: bool) -> Self {
        Self::with_rng(settings, width, height, reduced, StdRng::from_entropy())
    }

    /// Deterministic field for a given seed.
    pub fn seeded(
        settings: ParticleSettings,
        width: f64,
        height: f64,
        reduced: bool,
        seed: u64,
    ) -> Self {
        Self::with_rng(settings, width, height, reduced, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        settings: ParticleSettings,
        width: f64,
        height: f64,
        reduced: bool,
        rng: StdRng,
    ) -> Self {
        let mut field = Self {
            settings,
            width: sanitize(width),
            height: sanitize(height),
            reduced,
            pointer: None,
            particles: Vec::new(),
            rng,
        };
        field.regenerate();
        field
    }

    fn unit(&mut self) -> f64 {
        self.rng.sample(Standard)
    }

    fn regenerate(&mut self) {
        let count = particle_count(self.width, self.height, &self.settings);
        let max_radius = scaled_max_radius(&self.settings);
        let velocity_scale = 0.2
            * self.settings.speed
            * if self.reduced {
                REDUCED_VELOCITY_FACTOR
            } else {
                1.0
            };

        let mut particles = Vec::with_capacity(count);
        for _ in 0..count {
            let x = self.unit() * self.width;
            let y = self.unit() * self.height;
            let radius = self.unit() * max_radius + 0.5;
            let vx = (self.unit() - 0.5) * velocity_scale;
            let vy = (self.unit() - 0.5) * velocity_scale;
            let alpha = 0.55 + self.unit() * 0.35;
            particles.push(Particle {
                x,
                y,
                vx,
                vy,
                radius,
                alpha,
            });
        }
        self.particles = particles;
    }

    /// Regenerate particles for new dimensions.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = sanitize(width);
        self.height = sanitize(height);
        self.regenerate();
    }

    /// Switch reduced motion, regenerating with the matching velocities.
    pub fn set_reduced(&mut self, reduced: bool) {
        if self.reduced != reduced {
            self.reduced = reduced;
            self.regenerate();
        }
    }

    /// Pointer position, ignored when the field is not interactive.
    pub fn set_pointer(&mut self, pointer: Option<(f64, f64)>) {
        if self.settings.interactive {
            self.pointer = pointer;
        }
    }

    /// Advance every particle by one frame.
    pub fn step(&mut self) {
        let (w, h) = (self.width, self.height);
        let pointer = self.pointer;
        let speed = self.settings.speed;

        for p in &mut self.particles {
            p.x += p.vx;
            p.y += p.vy;

            if p.x < 0.0 || p.x > w {
                p.vx = -p.vx;
            }
            if p.y < 0.0 || p.y > h {
                p.vy = -p.vy;
            }

            if let Some((px, py)) = pointer {
                let dx = p.x - px;
                let dy = p.y - py;
                if dx * dx + dy * dy < POINTER_RADIUS_SQUARED {
                    p.vx += dx * POINTER_FORCE * speed;
                    p.vy += dy * POINTER_FORCE * speed;
                }
            }
        }
    }

    pub fn draw(&self, surface: &mut dyn Surface) {
        surface.clear(self.width, self.height);
        for p in &self.particles {
            surface.fill_circle(p.x, p.y, p.radius, &self.settings.color, p.alpha);
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn is_reduced(&self) -> bool {
        self.reduced
    }
}
