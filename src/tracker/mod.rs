//! The targeting loop and its pluggable boundaries.

pub mod input;
pub mod render;
pub mod runner;

pub use input::{ActuatorButtons, InputSource, NullInput};
pub use render::{DrawPrimitive, NullRenderer, OverlayRenderer};
pub use runner::{IterationOutcome, TargetingLoop, TrackerState};
