//! Color-range segmentation of frames into candidate regions

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

use super::frame::Frame;
use super::region::Region;
use crate::config::SegmenterConfig;

/// Binary threshold applied to the mask after dilation
const MASK_THRESHOLD: u8 = 127;

/// Inclusive HSV range (OpenCV scale: H 0..180, S and V 0..255)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// Whether all three channels fall within [lower, upper]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

/// Convert an RGB pixel to OpenCV-scale HSV
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let mut h_deg = if delta == 0.0 {
        0.0
    } else if (max - r).abs() < f32::EPSILON {
        60.0 * (((g - b) / delta) % 6.0)
    } else if (max - g).abs() < f32::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    if h_deg < 0.0 {
        h_deg += 360.0;
    }

    let h = h_deg / 2.0;
    let s = if max == 0.0 { 0.0 } else { delta / max } * 255.0;
    let v = max * 255.0;
    [h.round() as u8, s.round() as u8, v.round() as u8]
}

/// Thresholds frames into a binary mask and extracts boundary contours
pub struct RegionSegmenter {
    range: HsvRange,
    dilate_iterations: u8,
    min_area: f64,
}

impl RegionSegmenter {
    pub fn new(range: HsvRange, dilate_iterations: u8, min_area: f64) -> Self {
        Self {
            range,
            dilate_iterations,
            min_area,
        }
    }

    /// Build a segmenter from config, scaling the minimum area to the
    /// configured screen height
    pub fn from_config(config: &SegmenterConfig, screen_height: u32) -> Self {
        Self::new(
            HsvRange::new(config.hsv_lower, config.hsv_upper),
            config.dilate_iterations,
            config.min_area_for(screen_height),
        )
    }

    /// Segment a frame into candidate regions.
    ///
    /// Every returned region has at least 3 boundary points and encloses at
    /// least the configured minimum area.
    pub fn segment(&self, frame: &Frame) -> Vec<Region> {
        let mask = self.mask(frame);
        let mask = if self.dilate_iterations > 0 {
            dilate(&mask, Norm::LInf, self.dilate_iterations)
        } else {
            mask
        };
        let mask = binarize(mask, MASK_THRESHOLD);

        find_contours::<i32>(&mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter_map(|c| Region::new(c.points))
            .filter(|r| r.area() >= self.min_area)
            .collect()
    }

    /// Foreground mask: 255 where the pixel's HSV falls in range
    fn mask(&self, frame: &Frame) -> GrayImage {
        GrayImage::from_fn(frame.width, frame.height, |x, y| {
            let [r, g, b, _] = frame.pixel(x, y);
            if self.range.contains(rgb_to_hsv([r, g, b])) {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }
}

fn binarize(mut mask: GrayImage, threshold: u8) -> GrayImage {
    for p in mask.pixels_mut() {
        p.0[0] = if p.0[0] > threshold { 255 } else { 0 };
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: [u8; 4] = [255, 0, 255, 255]; // magenta, H=150 on the 0..180 scale
    const MAGENTA_RANGE: HsvRange = HsvRange {
        lower: [140, 110, 150],
        upper: [160, 255, 255],
    };

    fn frame_with_blob(x: u32, y: u32, w: u32, h: u32) -> Frame {
        let mut frame = Frame::filled(120, 120, [20, 20, 20, 255]);
        frame.fill_rect(x, y, w, h, TARGET);
        frame
    }

    #[test]
    fn test_rgb_to_hsv_known_colors() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([255, 0, 255]), [150, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
    }

    #[test]
    fn test_finds_single_blob() {
        let frame = frame_with_blob(30, 40, 20, 20);
        let segmenter = RegionSegmenter::new(MAGENTA_RANGE, 0, 50.0);
        let regions = segmenter.segment(&frame);
        assert_eq!(regions.len(), 1);
        let bbox = regions[0].bbox();
        assert_eq!((bbox.left(), bbox.top()), (30, 40));
        assert_eq!((bbox.width(), bbox.height()), (20, 20));
    }

    #[test]
    fn test_every_region_has_at_least_three_points() {
        let mut frame = Frame::filled(120, 120, [20, 20, 20, 255]);
        // Single pixels and a real blob
        frame.fill_rect(5, 5, 1, 1, TARGET);
        frame.fill_rect(10, 90, 1, 1, TARGET);
        frame.fill_rect(60, 60, 15, 15, TARGET);
        let segmenter = RegionSegmenter::new(MAGENTA_RANGE, 0, 0.0);
        for region in segmenter.segment(&frame) {
            assert!(region.contour().len() >= 3);
        }
    }

    #[test]
    fn test_min_area_filters_specks() {
        let mut frame = frame_with_blob(30, 40, 20, 20);
        frame.fill_rect(100, 100, 3, 3, TARGET);
        let segmenter = RegionSegmenter::new(MAGENTA_RANGE, 0, 50.0);
        assert_eq!(segmenter.segment(&frame).len(), 1);
    }

    #[test]
    fn test_dilation_bridges_noise_gap() {
        let mut frame = Frame::filled(120, 120, [20, 20, 20, 255]);
        // Two halves separated by a 2px gap
        frame.fill_rect(30, 30, 14, 30, TARGET);
        frame.fill_rect(46, 30, 14, 30, TARGET);

        let separate = RegionSegmenter::new(MAGENTA_RANGE, 0, 10.0);
        assert_eq!(separate.segment(&frame).len(), 2);

        let bridged = RegionSegmenter::new(MAGENTA_RANGE, 2, 10.0);
        assert_eq!(bridged.segment(&frame).len(), 1);
    }

    #[test]
    fn test_out_of_range_color_yields_nothing() {
        let frame = Frame::filled(64, 64, [0, 255, 0, 255]);
        let segmenter = RegionSegmenter::new(MAGENTA_RANGE, 1, 10.0);
        assert!(segmenter.segment(&frame).is_empty());
    }
}
