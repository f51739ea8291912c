//! Merging of overlapping regions into convex hulls

use imageproc::geometry::convex_hull;
use imageproc::point::Point;

use super::region::{rect_union, rects_intersect, Region};

/// Merge every pair of regions whose bounding boxes intersect.
///
/// The first intersecting pair in index order is merged into the convex
/// hull of both point sets, and the scan restarts. Terminates when no pair
/// of bounding boxes overlaps, so the result is a set of disjoint convex
/// regions. O(n³) in the worst case, which is acceptable at per-frame blob
/// counts of a few dozen.
pub fn merge_overlapping(mut regions: Vec<Region>) -> Vec<Region> {
    loop {
        let Some((i, j)) = first_intersecting_pair(&regions) else {
            return regions;
        };

        // Remove j first so i stays valid
        let b = regions.remove(j);
        let a = regions.remove(i);
        let union = rect_union(a.bbox(), b.bbox());

        let mut points = a.into_contour();
        points.extend(b.into_contour());
        let hull = convex_hull(points);

        let merged = Region::new(hull).unwrap_or_else(|| {
            // Collinear point sets collapse to a degenerate hull; fall
            // back to the outline of the combined bounding box
            log::debug!("degenerate merged hull, using union bounding box");
            union_outline(union)
        });
        regions.insert(i, merged);
    }
}

fn union_outline(union: imageproc::rect::Rect) -> Region {
    let corners = vec![
        Point::new(union.left(), union.top()),
        Point::new(union.right(), union.top()),
        Point::new(union.right(), union.bottom()),
        Point::new(union.left(), union.bottom()),
    ];
    match Region::new(corners) {
        Some(region) => region,
        // Four corner points always satisfy the contour minimum
        None => unreachable!("rect outline has four points"),
    }
}

fn first_intersecting_pair(regions: &[Region]) -> Option<(usize, usize)> {
    for i in 0..regions.len() {
        for j in (i + 1)..regions.len() {
            if rects_intersect(regions[i].bbox(), regions[j].bbox()) {
                return Some((i, j));
            }
        }
    }
    None
}
