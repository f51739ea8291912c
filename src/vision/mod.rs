//! Capture → segment → merge → select pipeline
//!
//! Turns a captured frame into at most one target per iteration: a binary
//! HSV mask is traced into boundary contours, overlapping blobs are merged
//! into convex regions, and the region closest to the reference aim point
//! wins.

pub mod frame;
pub mod merger;
pub mod region;
pub mod segmenter;
pub mod selector;

pub use frame::{CaptureRect, Frame, FrameSource};
pub use merger::merge_overlapping;
pub use region::Region;
pub use segmenter::{rgb_to_hsv, HsvRange, RegionSegmenter};
pub use selector::{anchor_point, annotate, reference_point, select_target, AxisOffset, Target};
