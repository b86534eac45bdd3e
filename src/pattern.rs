//! Procedural geometry for the card's pattern overlay.
//!
//! Particle positions are drawn once per density value and reused every frame;
//! only the group scale changes per frame (when pulsing). The grid overlay is a
//! fixed wireframe whose opacity follows density.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::model::{PatternKind, PatternMovement, PatternParams};

/// Particle count at density 1.
pub const PARTICLE_BASE_COUNT: usize = 50;
/// Full width, height and depth of the box particles are scattered in,
/// centred on the card.
pub const PARTICLE_EXTENTS: [f32; 3] = [4.0, 2.5, 2.0];
pub const PARTICLE_POINT_SIZE: f32 = 0.05;
pub const PARTICLE_OPACITY: f32 = 0.6;
/// Radians per second of the pulsing oscillation. Independent of parameters.
pub const PULSE_FREQUENCY: f64 = 2.0;
pub const PULSE_DEPTH: f64 = 0.2;

pub const GRID_WIDTH: f32 = 3.8;
pub const GRID_HEIGHT: f32 = 2.3;
pub const GRID_SEGMENTS_X: usize = 20;
pub const GRID_SEGMENTS_Y: usize = 15;
/// Sits just in front of the card face.
pub const GRID_Z: f32 = 0.06;
pub const GRID_OPACITY_SCALE: f64 = 0.2;

/// `floor(PARTICLE_BASE_COUNT * density)`, with density clamped to [0, 1].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn particle_count(density: f64) -> usize {
    let density = if density.is_finite() { density.clamp(0.0, 1.0) } else { 0.0 };
    (PARTICLE_BASE_COUNT as f64 * density).floor() as usize
}

/// Render-ready description of the pattern for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternFrame {
    Particles(ParticleFrame),
    Grid(GridOverlay),
    /// Nothing to draw (waves, circuit and none have no geometry).
    Empty,
}

impl PatternFrame {
    /// Number of discrete elements drawn this frame. A grid at zero opacity
    /// is invisible and counts as nothing.
    pub fn element_count(&self) -> usize {
        match self {
            PatternFrame::Particles(p) => p.positions.len(),
            PatternFrame::Grid(g) if g.opacity > 0.0 => g.vertex_count(),
            PatternFrame::Grid(_) => 0,
            PatternFrame::Empty => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticleFrame {
    /// Shared with the engine; only replaced when density changes.
    pub positions: Arc<Vec<[f32; 3]>>,
    /// Bumped every time positions are re-drawn, so a renderer knows when to
    /// rebuild its buffers.
    pub generation: u64,
    /// Uniform scale of the whole group; always positive.
    pub scale: f64,
    pub point_size: f32,
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridOverlay {
    pub width: f32,
    pub height: f32,
    pub segments_x: usize,
    pub segments_y: usize,
    pub z: f32,
    pub opacity: f64,
}

impl GridOverlay {
    pub fn for_density(density: f64) -> Self {
        let density = if density.is_finite() { density.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            width: GRID_WIDTH,
            height: GRID_HEIGHT,
            segments_x: GRID_SEGMENTS_X,
            segments_y: GRID_SEGMENTS_Y,
            z: GRID_Z,
            opacity: GRID_OPACITY_SCALE * density,
        }
    }

    pub fn vertex_count(&self) -> usize {
        (self.segments_x + 1) * (self.segments_y + 1)
    }

    /// Row-major wireframe vertices, bottom-left first.
    pub fn vertices(&self) -> Vec<[f32; 3]> {
        let mut out = Vec::with_capacity(self.vertex_count());
        for row in 0..=self.segments_y {
            let y = -self.height / 2.0 + self.height * (row as f32 / self.segments_y.max(1) as f32);
            for col in 0..=self.segments_x {
                let x =
                    -self.width / 2.0 + self.width * (col as f32 / self.segments_x.max(1) as f32);
                out.push([x, y, self.z]);
            }
        }
        out
    }
}

struct ParticleField {
    density: f64,
    positions: Arc<Vec<[f32; 3]>>,
    generation: u64,
}

/// Per-engine pattern state: the random source and the current particle field.
pub struct PatternState {
    rng: StdRng,
    particles: Option<ParticleField>,
    generations: u64,
}

impl PatternState {
    /// `seed` makes particle layouts reproducible; `None` seeds from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            particles: None,
            generations: 0,
        }
    }

    pub fn update(&mut self, elapsed: f64, pattern: &PatternParams) -> PatternFrame {
        match pattern.kind {
            PatternKind::Particles => {
                let field = self.particle_field(pattern.density);
                let scale = match pattern.movement {
                    PatternMovement::Pulsing => {
                        1.0 + (elapsed * PULSE_FREQUENCY).sin() * PULSE_DEPTH
                    }
                    PatternMovement::Static | PatternMovement::Flowing => 1.0,
                };
                PatternFrame::Particles(ParticleFrame {
                    positions: Arc::clone(&field.positions),
                    generation: field.generation,
                    scale: if scale.is_finite() { scale } else { 1.0 },
                    point_size: PARTICLE_POINT_SIZE,
                    opacity: PARTICLE_OPACITY,
                })
            }
            other => {
                // Leaving the particle pattern discards the layout; coming
                // back draws a fresh one.
                self.particles = None;
                match other {
                    PatternKind::Grid => PatternFrame::Grid(GridOverlay::for_density(pattern.density)),
                    _ => PatternFrame::Empty,
                }
            }
        }
    }

    fn particle_field(&mut self, density: f64) -> &ParticleField {
        #[allow(clippy::float_cmp)] // exact compare: any change in density redraws
        let stale = self
            .particles
            .as_ref()
            .map_or(true, |field| field.density != density);
        if stale {
            let count = particle_count(density);
            let positions = (0..count)
                .map(|_| {
                    [
                        (self.rng.gen::<f32>() - 0.5) * PARTICLE_EXTENTS[0],
                        (self.rng.gen::<f32>() - 0.5) * PARTICLE_EXTENTS[1],
                        (self.rng.gen::<f32>() - 0.5) * PARTICLE_EXTENTS[2],
                    ]
                })
                .collect();
            self.generations += 1;
            self.particles = Some(ParticleField {
                density,
                positions: Arc::new(positions),
                generation: self.generations,
            });
        }
        self.particles.get_or_insert_with(|| ParticleField {
            density,
            positions: Arc::new(Vec::new()),
            generation: 0,
        })
    }
}
