//! Target selection and anchor-point rules

use imageproc::point::Point;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use super::region::{rect_center, Region};
use crate::tracker::render::{DrawPrimitive, OverlayRenderer};

/// Per-axis anchor rule inside a bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisOffset {
    /// Fixed pixel offset from the box origin
    Pixels(i32),
    /// Fractional offset of the box extent
    Fraction(f32),
}

/// The region selected for one iteration plus its derived anchor point
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub region: Region,
    pub bbox: Rect,
    /// The point the pointer should move toward, in capture-space
    pub anchor: Point<i32>,
}

/// Screen-space reference aim point: capture-bounds center shifted down by
/// a fraction of the capture height.
pub fn reference_point(width: u32, height: u32, vertical_offset: f32) -> Point<i32> {
    let cx = width as i32 / 2;
    let cy = height as i32 / 2 + (height as f32 * vertical_offset).round() as i32;
    Point::new(cx, cy)
}

/// Select the region whose bounding-box center is closest to the reference
/// point by squared Euclidean distance. Ties keep the first-seen region.
///
/// Returns `None` for empty input; an empty candidate set is a NoTarget
/// outcome, not an error.
pub fn select_target(
    regions: &[Region],
    reference: Point<i32>,
    anchor_x: AxisOffset,
    anchor_y: AxisOffset,
) -> Option<Target> {
    let mut best: Option<(&Region, i64)> = None;
    for region in regions {
        let center = rect_center(region.bbox());
        let dx = (center.x - reference.x) as i64;
        let dy = (center.y - reference.y) as i64;
        let dist = dx * dx + dy * dy;
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((region, dist)),
        }
    }

    best.map(|(region, _)| {
        let bbox = region.bbox();
        Target {
            region: region.clone(),
            bbox,
            anchor: anchor_point(bbox, anchor_x, anchor_y),
        }
    })
}

/// Anchor point inside a bounding box.
///
/// Fractional Y offsets are inverted (`1 - f`) so larger fractions bias the
/// anchor toward the upper portion of the box.
pub fn anchor_point(bbox: Rect, anchor_x: AxisOffset, anchor_y: AxisOffset) -> Point<i32> {
    let x = match anchor_x {
        AxisOffset::Pixels(px) => bbox.left() + px,
        AxisOffset::Fraction(f) => bbox.left() + (bbox.width() as f32 * f).round() as i32,
    };
    let y = match anchor_y {
        AxisOffset::Pixels(px) => bbox.top() + px,
        AxisOffset::Fraction(f) => bbox.top() + (bbox.height() as f32 * (1.0 - f)).round() as i32,
    };
    Point::new(x, y)
}

/// Emit one rectangle annotation per candidate and an emphasized one for
/// the chosen target, plus a line from the reference point to its anchor.
pub fn annotate(renderer: &mut dyn OverlayRenderer, regions: &[Region], target: Option<&Target>, reference: Point<i32>) {
    for region in regions {
        renderer.draw(DrawPrimitive::Rect {
            rect: region.bbox(),
            emphasis: false,
        });
    }
    if let Some(target) = target {
        renderer.draw(DrawPrimitive::Rect {
            rect: target.bbox,
            emphasis: true,
        });
        renderer.draw(DrawPrimitive::Line {
            from: reference,
            to: target.anchor,
        });
        renderer.draw(DrawPrimitive::Circle {
            center: target.anchor,
            radius: 3,
        });
    }
}
