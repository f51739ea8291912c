//! Configuration types for the targeting engine
//!
//! All tunables referenced by the loop live here and are loaded from TOML
//! files. The loop snapshots a [`SharedConfig`] once per iteration, so live
//! mutation is observed on the next cycle without a restart.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::actuator::{Backend, DeviceProfile};
use crate::error::TrackerError;
use crate::trajectory::{TrajectoryModel, WindParams};
use crate::vision::AxisOffset;

/// Handle for config shared between the loop and external mutators
pub type SharedConfig = Arc<RwLock<TrackerConfig>>;

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrackerConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub trajectory: TrajectoryConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// Enable per-iteration telemetry sampling
    #[serde(default)]
    pub debug: bool,
}

impl TrackerConfig {
    /// Load a configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&text).map_err(|e| TrackerError::Config(e.to_string()))
    }

    /// Save the configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), TrackerError> {
        let text =
            toml::to_string_pretty(self).map_err(|e| TrackerError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// Wrap in a shared handle for live mutation
    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    pub fn with_model(mut self, model: TrajectoryModel) -> Self {
        self.trajectory.model = model;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.actuator.backend = backend;
        self
    }

    pub fn with_hsv_range(mut self, lower: [u8; 3], upper: [u8; 3]) -> Self {
        self.segmenter.hsv_lower = lower;
        self.segmenter.hsv_upper = upper;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Screen capture region configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Full screen width in pixels
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    /// Full screen height in pixels
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
    /// Width of the sampled rectangle, centered on the screen
    #[serde(default = "default_region")]
    pub region_width: u32,
    /// Height of the sampled rectangle, centered on the screen
    #[serde(default = "default_region")]
    pub region_height: u32,
    /// Horizontal shift of the sampled rectangle from screen center
    #[serde(default)]
    pub offset_x: i32,
    /// Vertical shift of the sampled rectangle from screen center
    #[serde(default)]
    pub offset_y: i32,
}

fn default_screen_width() -> u32 {
    1920
}

fn default_screen_height() -> u32 {
    1080
}

fn default_region() -> u32 {
    400
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            region_width: default_region(),
            region_height: default_region(),
            offset_x: 0,
            offset_y: 0,
        }
    }
}

/// Color segmentation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Inclusive lower HSV bound (H 0..180, S/V 0..255)
    #[serde(default = "default_hsv_lower")]
    pub hsv_lower: [u8; 3],
    /// Inclusive upper HSV bound
    #[serde(default = "default_hsv_upper")]
    pub hsv_upper: [u8; 3],
    /// Morphological dilation passes applied to the binary mask
    #[serde(default = "default_dilate")]
    pub dilate_iterations: u8,
    /// Minimum contour area at a 1440px-tall reference screen; scaled
    /// linearly to the configured screen height
    #[serde(default = "default_min_area")]
    pub min_area_scale: f64,
}

fn default_hsv_lower() -> [u8; 3] {
    [140, 110, 150]
}

fn default_hsv_upper() -> [u8; 3] {
    [160, 255, 255]
}

fn default_dilate() -> u8 {
    2
}

fn default_min_area() -> f64 {
    100.0
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            hsv_lower: default_hsv_lower(),
            hsv_upper: default_hsv_upper(),
            dilate_iterations: default_dilate(),
            min_area_scale: default_min_area(),
        }
    }
}

impl SegmenterConfig {
    /// Minimum contour area scaled to the given screen height
    pub fn min_area_for(&self, screen_height: u32) -> f64 {
        self.min_area_scale / 1440.0 * screen_height as f64
    }
}

/// Target selection and anchor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Vertical shift of the reference aim point, as a fraction of the
    /// capture height below its center
    #[serde(default)]
    pub reference_offset_y: f32,
    /// Horizontal anchor rule inside the chosen bounding box
    #[serde(default = "default_anchor_x")]
    pub anchor_x: AxisOffset,
    /// Vertical anchor rule; fractions are inverted to bias toward the
    /// upper part of the box
    #[serde(default = "default_anchor_y")]
    pub anchor_y: AxisOffset,
    /// Emit draw annotations for candidate boxes
    #[serde(default = "default_true")]
    pub annotate: bool,
}

fn default_anchor_x() -> AxisOffset {
    AxisOffset::Fraction(0.5)
}

fn default_anchor_y() -> AxisOffset {
    AxisOffset::Fraction(0.85)
}

fn default_true() -> bool {
    true
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            reference_offset_y: 0.0,
            anchor_x: default_anchor_x(),
            anchor_y: default_anchor_y(),
            annotate: true,
        }
    }
}

/// Movement kinematics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryConfig {
    /// Which kinematic model converts start/end pairs into steps
    #[serde(default)]
    pub model: TrajectoryModel,
    /// Per-iteration progress scalar in [0, 1], time-scaled by the engine
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
    /// Optional exponential moving-average factor applied to model output
    #[serde(default)]
    pub smoothing_alpha: Option<f64>,
    /// Curvature bias for the Bezier models
    #[serde(default = "default_curvature")]
    pub curvature: f64,
    /// Normal-axis amplitude for the Perlin model, in pixels
    #[serde(default = "default_perlin_amplitude")]
    pub perlin_amplitude: f64,
    /// Phase advance per unit progress for the Perlin model
    #[serde(default = "default_perlin_frequency")]
    pub perlin_frequency: f64,
    /// Parameters for the simulated-wind model
    #[serde(default)]
    pub wind: WindParams,
}

fn default_sensitivity() -> f64 {
    0.4
}

fn default_curvature() -> f64 {
    0.15
}

fn default_perlin_amplitude() -> f64 {
    6.0
}

fn default_perlin_frequency() -> f64 {
    2.5
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            model: TrajectoryModel::default(),
            sensitivity: default_sensitivity(),
            smoothing_alpha: None,
            curvature: default_curvature(),
            perlin_amplitude: default_perlin_amplitude(),
            perlin_frequency: default_perlin_frequency(),
            wind: WindParams::default(),
        }
    }
}

/// Serial actuator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Which movement backend receives intents
    #[serde(default)]
    pub backend: Backend,
    /// Device flavor expected during discovery
    #[serde(default)]
    pub profile: DeviceProfile,
    /// Baud rate used for discovery handshakes
    #[serde(default = "default_baud")]
    pub default_baud: u32,
    /// Optional higher baud to renegotiate after identity confirmation
    /// (general-purpose profile only)
    #[serde(default)]
    pub fast_baud: Option<u32>,
    /// Settle delay after opening a port, before the handshake
    #[serde(default = "default_reset_delay")]
    pub reset_delay_ms: u64,
    /// Per-read timeout on the serial channel
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Total timeout for one command/response exchange
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
    /// Blank-gap timeout that ends a multi-line response early
    #[serde(default = "default_gap_timeout")]
    pub gap_timeout_ms: u64,
}

fn default_baud() -> u32 {
    115_200
}

fn default_reset_delay() -> u64 {
    400
}

fn default_read_timeout() -> u64 {
    20
}

fn default_command_timeout() -> u64 {
    500
}

fn default_gap_timeout() -> u64 {
    50
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            profile: DeviceProfile::default(),
            default_baud: default_baud(),
            fast_baud: None,
            reset_delay_ms: default_reset_delay(),
            read_timeout_ms: default_read_timeout(),
            command_timeout_ms: default_command_timeout(),
            gap_timeout_ms: default_gap_timeout(),
        }
    }
}

/// Trigger input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Key that must be held for the loop to run an active iteration
    #[serde(default = "default_primary_key")]
    pub primary_key: u16,
    /// Key that must additionally be held for the click action
    #[serde(default = "default_secondary_key")]
    pub secondary_key: u16,
    /// Whether the timed click action is issued at all
    #[serde(default)]
    pub click_enabled: bool,
    /// Press-to-release duration of the click action
    #[serde(default = "default_click_duration")]
    pub click_duration_ms: u64,
}

fn default_primary_key() -> u16 {
    0x02 // right mouse button in the default key table
}

fn default_secondary_key() -> u16 {
    0x01 // left mouse button
}

fn default_click_duration() -> u64 {
    25
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            primary_key: default_primary_key(),
            secondary_key: default_secondary_key(),
            click_enabled: false,
            click_duration_ms: default_click_duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let cfg = TrackerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: TrackerConfig = toml::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_min_area_scales_with_screen_height() {
        let seg = SegmenterConfig::default();
        assert!((seg.min_area_for(1440) - 100.0).abs() < 1e-9);
        assert!(seg.min_area_for(720) < seg.min_area_for(1440));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: TrackerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, TrackerConfig::default());
    }
}
