//! Movement-trajectory engine
//!
//! Converts a (start, end, progress) triple into the next intermediate
//! pointer position under a configurable kinematic model, with optional
//! exponential moving-average smoothing. Model-local state lives in an
//! explicit [`TrajectoryState`] owned by the caller's movement session and
//! is reset whenever a new movement begins.

pub mod models;
pub mod perlin;

use std::time::{Duration, Instant};

use imageproc::point::Point;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::TrajectoryConfig;
use models::{Vec2, WindState};
use perlin::Perlin1D;

/// The available kinematic models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryModel {
    #[default]
    Linear,
    BezierQuad,
    BezierCubic,
    Adaptive,
    Perlin,
    Wind,
}

pub use models::WindParams;

/// Reference frame delta: configured progress and smoothing values apply
/// 1:1 at 60 iterations per second.
const REFERENCE_DT: f64 = 1.0 / 60.0;

/// Clamp bounds on the measured inter-call delta, bounding the effect of
/// scheduling jitter or stalls.
const MIN_DT: f64 = 1.0 / 10_000.0;
const MAX_DT: f64 = 1.0 / 20.0;

/// Persistent, model-local state for one continuous movement.
///
/// Survives across successive engine calls; reset it explicitly when a new
/// movement session begins.
#[derive(Debug, Default)]
pub struct TrajectoryState {
    /// Raw (unrounded) position of the previous step
    last_pos: Option<Vec2>,
    /// Wind/velocity integration state
    wind: WindState,
    /// 1-D noise phase accumulator
    noise_phase: f64,
    /// EMA accumulator, per axis
    ema_prev: Option<Vec2>,
    /// Monotonic timestamp of the previous step
    last_tick: Option<Instant>,
}

impl TrajectoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything about the current movement
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Clamped monotonic delta since the previous call
    fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let dt = match self.last_tick {
            Some(prev) => (now - prev).as_secs_f64(),
            None => REFERENCE_DT,
        };
        self.last_tick = Some(now);
        dt.clamp(MIN_DT, MAX_DT)
    }
}

/// Computes successive intermediate pointer positions
pub struct TrajectoryEngine {
    config: TrajectoryConfig,
    rng: StdRng,
    perlin: Perlin1D,
}

impl TrajectoryEngine {
    pub fn new(config: TrajectoryConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Deterministic construction for tests and previews
    pub fn with_seed(config: TrajectoryConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            perlin: Perlin1D::new(seed),
        }
    }

    pub fn config(&self) -> &TrajectoryConfig {
        &self.config
    }

    /// Next intermediate point for the movement start→end.
    ///
    /// `progress` is the configured per-iteration scalar in [0, 1]; the
    /// engine scales it (and the smoothing factor) by the monotonic-clock
    /// delta since the previous call.
    pub fn step(
        &mut self,
        state: &mut TrajectoryState,
        start: Point<i32>,
        end: Point<i32>,
        progress: f64,
    ) -> Point<i32> {
        let dt = state.tick();
        self.step_with_dt(state, start, end, progress, Duration::from_secs_f64(dt))
    }

    /// [`step`](Self::step) with an explicit clock delta
    pub fn step_with_dt(
        &mut self,
        state: &mut TrajectoryState,
        start: Point<i32>,
        end: Point<i32>,
        progress: f64,
        dt: Duration,
    ) -> Point<i32> {
        // Zero-length segments return start unchanged
        if start == end {
            return start;
        }

        let scale = dt.as_secs_f64().clamp(MIN_DT, MAX_DT) / REFERENCE_DT;
        let t = (progress * scale).clamp(0.0, 1.0);

        let start_v = Vec2::new(start.x as f64, start.y as f64);
        let end_v = Vec2::new(end.x as f64, end.y as f64);
        let current = state.last_pos.unwrap_or(start_v);

        let raw = match self.config.model {
            TrajectoryModel::Linear => models::linear(start_v, end_v, t),
            TrajectoryModel::BezierQuad => {
                models::bezier_quad(start_v, end_v, t, self.config.curvature)
            }
            TrajectoryModel::BezierCubic => {
                models::bezier_cubic(start_v, end_v, t, self.config.curvature)
            }
            TrajectoryModel::Adaptive => models::adaptive(current, end_v, t),
            TrajectoryModel::Perlin => {
                state.noise_phase += self.config.perlin_frequency * t;
                let base = models::linear(start_v, end_v, t);
                let normal = start_v.segment_normal(end_v);
                let offset = self.perlin.sample(state.noise_phase) * self.config.perlin_amplitude;
                Vec2::new(base.x + normal.x * offset, base.y + normal.y * offset)
            }
            TrajectoryModel::Wind => {
                models::wind_step(&mut state.wind, current, end_v, &self.config.wind, &mut self.rng)
            }
        };

        let smoothed = match self.config.smoothing_alpha {
            Some(alpha) => {
                let alpha = (alpha * scale).clamp(0.0, 1.0);
                let prev = state.ema_prev.unwrap_or(raw);
                let out = Vec2::new(
                    raw.x * alpha + prev.x * (1.0 - alpha),
                    raw.y * alpha + prev.y * (1.0 - alpha),
                );
                state.ema_prev = Some(out);
                out
            }
            None => raw,
        };

        state.last_pos = Some(smoothed);
        Point::new(smoothed.x.round() as i32, smoothed.y.round() as i32)
    }
}

/// Per-axis EMA blend of a new value against the previous one
pub fn ema(current: f64, previous: f64, alpha: f64) -> f64 {
    current * alpha + previous * (1.0 - alpha)
}
