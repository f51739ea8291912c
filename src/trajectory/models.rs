//! Kinematic model primitives
//!
//! Pure functions mapping (start, end, progress) to the next intermediate
//! position. Stateful models (wind, Perlin phase) receive their state
//! explicitly from the engine.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// 2-D position in continuous capture-space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    /// Unit normal perpendicular to the segment self→other, or zero for a
    /// degenerate segment
    pub fn segment_normal(self, other: Vec2) -> Vec2 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            Vec2::default()
        } else {
            Vec2::new(-dy / len, dx / len)
        }
    }
}

/// Direct interpolation `start + t·(end-start)`
pub fn linear(start: Vec2, end: Vec2, t: f64) -> Vec2 {
    Vec2::new(start.x + t * (end.x - start.x), start.y + t * (end.y - start.y))
}

/// Quadratic Bezier with its control point pushed off the segment midpoint
/// along the perpendicular normal, scaled by curvature and segment length
pub fn bezier_quad(start: Vec2, end: Vec2, t: f64, curvature: f64) -> Vec2 {
    let normal = start.segment_normal(end);
    let len = start.distance(end);
    let mid = linear(start, end, 0.5);
    let ctrl = Vec2::new(mid.x + normal.x * curvature * len, mid.y + normal.y * curvature * len);

    let u = 1.0 - t;
    Vec2::new(
        u * u * start.x + 2.0 * u * t * ctrl.x + t * t * end.x,
        u * u * start.y + 2.0 * u * t * ctrl.y + t * t * end.y,
    )
}

/// Cubic Bezier with control points at 1/3 and 2/3 of the segment, offset
/// along opposite sides of the normal for an S-shaped approach
pub fn bezier_cubic(start: Vec2, end: Vec2, t: f64, curvature: f64) -> Vec2 {
    let normal = start.segment_normal(end);
    let len = start.distance(end);
    let p1 = linear(start, end, 1.0 / 3.0);
    let p2 = linear(start, end, 2.0 / 3.0);
    let c1 = Vec2::new(p1.x + normal.x * curvature * len, p1.y + normal.y * curvature * len);
    let c2 = Vec2::new(p2.x - normal.x * curvature * len, p2.y - normal.y * curvature * len);

    let u = 1.0 - t;
    Vec2::new(
        u.powi(3) * start.x
            + 3.0 * u * u * t * c1.x
            + 3.0 * u * t * t * c2.x
            + t.powi(3) * end.x,
        u.powi(3) * start.y
            + 3.0 * u * u * t * c1.y
            + 3.0 * u * t * t * c2.y
            + t.powi(3) * end.y,
    )
}

/// Move a fraction of the remaining straight-line distance, decelerating
/// naturally as the target nears
pub fn adaptive(current: Vec2, end: Vec2, sensitivity: f64) -> Vec2 {
    let s = sensitivity.clamp(0.0, 1.0);
    Vec2::new(current.x + s * (end.x - current.x), current.y + s * (end.y - current.y))
}

/// Parameters for the simulated-wind model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindParams {
    /// Pull toward the target per step
    #[serde(default = "default_gravity")]
    pub gravity: f64,
    /// Magnitude of the random wind walk
    #[serde(default = "default_wind")]
    pub wind: f64,
    /// Upper bound on per-step speed; also scaled down by remaining distance
    #[serde(default = "default_max_step")]
    pub max_step: f64,
    /// Radius around the target where the damped regime activates
    #[serde(default = "default_target_radius")]
    pub target_radius: f64,
}

fn default_gravity() -> f64 {
    9.0
}

fn default_wind() -> f64 {
    3.0
}

fn default_max_step() -> f64 {
    15.0
}

fn default_target_radius() -> f64 {
    12.0
}

impl Default for WindParams {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            wind: default_wind(),
            max_step: default_max_step(),
            target_radius: default_target_radius(),
        }
    }
}

/// Persistent wind/velocity vectors for the wind model
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindState {
    pub wind: Vec2,
    pub velocity: Vec2,
    /// Current per-step speed cap, damped inside the target radius
    pub step_cap: f64,
}

const SQRT_3: f64 = 1.732_050_807_568_877_2;
const SQRT_5: f64 = 2.236_067_977_499_79;

/// One step of the simulated-wind model.
///
/// Integrates a damped random wind walk plus a gravity term toward the
/// target. The per-step speed is capped, with the cap shrinking inside the
/// target-proximity radius to avoid overshoot oscillation.
pub fn wind_step(
    state: &mut WindState,
    current: Vec2,
    end: Vec2,
    params: &WindParams,
    rng: &mut impl Rng,
) -> Vec2 {
    let dist = current.distance(end);
    if dist < 1.0 {
        return end;
    }
    if state.step_cap == 0.0 {
        state.step_cap = params.max_step;
    }

    if dist >= params.target_radius {
        let wind_mag = params.wind.min(dist);
        state.wind.x = state.wind.x / SQRT_3 + (rng.gen::<f64>() * 2.0 - 1.0) * wind_mag / SQRT_5;
        state.wind.y = state.wind.y / SQRT_3 + (rng.gen::<f64>() * 2.0 - 1.0) * wind_mag / SQRT_5;
    } else {
        // Damped regime: kill the wind walk and shrink the step cap
        state.wind.x /= SQRT_3;
        state.wind.y /= SQRT_3;
        if state.step_cap < 3.0 {
            state.step_cap = 3.0 + rng.gen::<f64>() * 3.0;
        } else {
            state.step_cap /= SQRT_5;
        }
    }

    state.velocity.x += state.wind.x + params.gravity * (end.x - current.x) / dist;
    state.velocity.y += state.wind.y + params.gravity * (end.y - current.y) / dist;

    // Cap per-step speed, scaled with remaining distance
    let cap = state.step_cap.min(dist);
    let speed = (state.velocity.x.powi(2) + state.velocity.y.powi(2)).sqrt();
    if speed > cap {
        let shrink = cap / 2.0 + rng.gen::<f64>() * cap / 2.0;
        state.velocity.x = state.velocity.x / speed * shrink;
        state.velocity.y = state.velocity.y / speed * shrink;
    }

    Vec2::new(current.x + state.velocity.x, current.y + state.velocity.y)
}
