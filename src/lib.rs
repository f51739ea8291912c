//! chromatrack: real-time color-targeting engine.
//!
//! Captures a screen region, segments it by HSV color range, merges
//! overlapping blobs, selects the region closest to a reference aim point
//! and steers the pointer toward its anchor under a configurable kinematic
//! model. Actuation goes through either OS input injection or an external
//! serial device with automatic fallback.
//!
//! The crate exposes three seams a frontend plugs into: [`FrameSource`]
//! for screen capture, [`OverlayRenderer`] for debug annotation and
//! [`InputSource`] for trigger keys. The engine itself never talks to a
//! capture device or a UI.

pub mod actuator;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod tracker;
pub mod trajectory;
pub mod vision;

pub use actuator::{ActuatorDispatch, ActuatorSession, Backend, ButtonEvent, DeviceProfile, LogicalButton};
pub use config::{SharedConfig, TrackerConfig};
pub use error::{ActuatorError, Result, TrackerError};
pub use telemetry::{Telemetry, TelemetrySnapshot};
pub use tracker::{InputSource, OverlayRenderer, TargetingLoop, TrackerState};
pub use trajectory::{TrajectoryEngine, TrajectoryModel, TrajectoryState};
pub use vision::{CaptureRect, Frame, FrameSource, Region, Target};
