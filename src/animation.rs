//! Per-frame animation of the card toward the current target parameters.
//!
//! Parameters only set oscillation frequencies (and the float amplitude); the
//! rotation amplitude is a fixed constant so the card's sway stays bounded
//! whatever the assistant asks for. Observed values chase their oscillating
//! targets with first-order exponential smoothing, so a parameter change never
//! makes the card jump.

use std::f64::consts::PI;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::model::VisualParameters;
use crate::pattern::{PatternFrame, PatternState};

/// Maximum sway either side of facing the camera: 30 degrees.
pub const MAX_ROTATION: f64 = PI / 6.0;
/// Multiplier turning `rotationSpeed` into radians per second of sway phase.
pub const ROTATION_FREQUENCY_SCALE: f64 = 10.0;
/// Multiplier turning `floatSpeed` into radians per second of bob phase.
pub const FLOAT_FREQUENCY_SCALE: f64 = 10.0;
/// Fraction of the remaining gap closed per frame (α).
pub const SMOOTHING_FACTOR: f64 = 0.05;
/// Frame rate at which delta-normalised smoothing matches per-frame smoothing.
pub const DEFAULT_REFERENCE_FPS: f64 = 60.0;

/// How α is applied each frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
#[ts(export)]
pub enum SmoothingMode {
    /// Close α of the gap every frame regardless of frame time. Apparent
    /// smoothing speed follows the frame rate.
    #[default]
    PerFrame,
    /// Scale α by frame time: `1 - (1 - α)^(dt * reference_fps)`.
    DeltaNormalized { reference_fps: f64 },
}

impl SmoothingMode {
    /// Effective smoothing fraction for a frame of `dt` seconds, in [0, 1).
    pub fn factor(self, dt: f64) -> f64 {
        match self {
            SmoothingMode::PerFrame => SMOOTHING_FACTOR,
            SmoothingMode::DeltaNormalized { reference_fps } => {
                if !reference_fps.is_finite() || reference_fps <= 0.0 {
                    return SMOOTHING_FACTOR;
                }
                let frames = dt * reference_fps;
                if !frames.is_finite() || frames <= 0.0 {
                    return 0.0;
                }
                1.0 - (1.0 - SMOOTHING_FACTOR).powf(frames)
            }
        }
    }
}

/// A scalar that follows a target by exponential smoothing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Smoothed {
    value: f64,
}

impl Smoothed {
    pub fn new(value: f64) -> Self {
        Self { value }
    }

    pub fn value(self) -> f64 {
        self.value
    }

    /// Move `alpha` of the way toward `target`. With alpha in [0, 1] this
    /// never overshoots.
    pub fn step(&mut self, target: f64, alpha: f64) -> f64 {
        let alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 0.0 };
        if target.is_finite() {
            self.value += (target - self.value) * alpha;
        }
        self.value
    }
}

/// Everything the render boundary needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameState {
    /// Seconds since the engine started.
    pub elapsed: f64,
    /// Card yaw in radians.
    pub rotation_y: f64,
    /// Card vertical offset in scene units.
    pub float_y: f64,
    pub target_rotation_y: f64,
    pub target_float_y: f64,
    pub pattern: PatternFrame,
}

/// Owns the animation runtime state. Nothing else writes it; it resets only
/// by constructing a new engine.
pub struct AnimationEngine {
    smoothing: SmoothingMode,
    elapsed: f64,
    rotation: Smoothed,
    float_offset: Smoothed,
    pattern: PatternState,
}

impl AnimationEngine {
    pub fn new(smoothing: SmoothingMode, particle_seed: Option<u64>) -> Self {
        Self {
            smoothing,
            elapsed: 0.0,
            rotation: Smoothed::default(),
            float_offset: Smoothed::default(),
            pattern: PatternState::new(particle_seed),
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Target sway angle at time `t` for the given rotation speed.
    pub fn target_rotation(t: f64, rotation_speed: f64) -> f64 {
        (t * rotation_speed * ROTATION_FREQUENCY_SCALE).sin() * MAX_ROTATION
    }

    /// Target float offset at time `t`.
    pub fn target_float(t: f64, float_speed: f64, float_amplitude: f64) -> f64 {
        (t * float_speed * FLOAT_FREQUENCY_SCALE).sin() * float_amplitude
    }

    /// Advance one frame of `delta` seconds toward `params`.
    ///
    /// Negative or non-finite deltas count as zero.
    pub fn tick(&mut self, delta: f64, params: &VisualParameters) -> FrameState {
        let dt = if delta.is_finite() && delta > 0.0 { delta } else { 0.0 };
        self.elapsed += dt;

        let anim = &params.animation;
        let target_rotation = Self::target_rotation(self.elapsed, anim.rotation_speed);
        let target_float =
            Self::target_float(self.elapsed, anim.float_speed, anim.float_amplitude);

        let alpha = self.smoothing.factor(dt);
        let rotation_y = self.rotation.step(target_rotation, alpha);
        let float_y = self.float_offset.step(target_float, alpha);

        FrameState {
            elapsed: self.elapsed,
            rotation_y,
            float_y,
            target_rotation_y: target_rotation,
            target_float_y: target_float,
            pattern: self.pattern.update(self.elapsed, &params.pattern),
        }
    }
}

impl Default for AnimationEngine {
    fn default() -> Self {
        Self::new(SmoothingMode::default(), None)
    }
}
