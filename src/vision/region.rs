//! Segmented foreground regions and bounding-box helpers

use imageproc::point::Point;
use imageproc::rect::Rect;

/// A segmented foreground blob: a boundary polygon plus its derived
/// axis-aligned bounding box.
///
/// A region always has at least 3 boundary points; degenerate contours are
/// rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    contour: Vec<Point<i32>>,
    bbox: Rect,
}

impl Region {
    /// Build a region from a boundary polygon. Returns `None` for contours
    /// with fewer than 3 points.
    pub fn new(contour: Vec<Point<i32>>) -> Option<Self> {
        if contour.len() < 3 {
            return None;
        }
        let bbox = bounding_box(&contour)?;
        Some(Self { contour, bbox })
    }

    pub fn contour(&self) -> &[Point<i32>] {
        &self.contour
    }

    /// Consume the region, returning its boundary points
    pub fn into_contour(self) -> Vec<Point<i32>> {
        self.contour
    }

    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    /// Enclosed polygon area by the shoelace formula
    pub fn area(&self) -> f64 {
        let pts = &self.contour;
        let mut twice_area = 0i64;
        for i in 0..pts.len() {
            let a = pts[i];
            let b = pts[(i + 1) % pts.len()];
            twice_area += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
        }
        (twice_area.abs() as f64) / 2.0
    }
}

/// Tight bounding box of a point set
pub fn bounding_box(points: &[Point<i32>]) -> Option<Rect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Rect::at(min_x, min_y).of_size((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32))
}

/// Whether two rectangles overlap (edges touching counts as overlap)
pub fn rects_intersect(a: Rect, b: Rect) -> bool {
    a.left() <= b.right() && b.left() <= a.right() && a.top() <= b.bottom() && b.top() <= a.bottom()
}

/// Smallest rectangle covering both inputs
pub fn rect_union(a: Rect, b: Rect) -> Rect {
    let left = a.left().min(b.left());
    let top = a.top().min(b.top());
    let right = a.right().max(b.right());
    let bottom = a.bottom().max(b.bottom());
    Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32)
}

/// Center point of a rectangle
pub fn rect_center(rect: Rect) -> Point<i32> {
    Point::new(
        rect.left() + rect.width() as i32 / 2,
        rect.top() + rect.height() as i32 / 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Vec<Point<i32>> {
        vec![Point::new(0, 0), Point::new(4, 0), Point::new(0, 4)]
    }

    #[test]
    fn test_rejects_degenerate_contours() {
        assert!(Region::new(vec![]).is_none());
        assert!(Region::new(vec![Point::new(0, 0), Point::new(1, 1)]).is_none());
        assert!(Region::new(triangle()).is_some());
    }

    #[test]
    fn test_bbox_is_tight() {
        let region = Region::new(triangle()).unwrap();
        assert_eq!(region.bbox(), Rect::at(0, 0).of_size(5, 5));
    }

    #[test]
    fn test_shoelace_area() {
        let region = Region::new(triangle()).unwrap();
        assert!((region.area() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_rect_union_and_intersection() {
        let a = Rect::at(0, 0).of_size(10, 10);
        let b = Rect::at(5, 5).of_size(10, 10);
        let c = Rect::at(100, 100).of_size(2, 2);
        assert!(rects_intersect(a, b));
        assert!(!rects_intersect(a, c));
        assert_eq!(rect_union(a, b), Rect::at(0, 0).of_size(15, 15));
    }

    #[test]
    fn test_rect_center() {
        let r = Rect::at(10, 20).of_size(4, 6);
        assert_eq!(rect_center(r), Point::new(12, 23));
    }
}
