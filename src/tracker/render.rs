//! Debug-overlay rendering seam.
//!
//! The loop describes annotations as primitives; what happens to them is up
//! to the installed renderer. The default renderer discards everything, so
//! annotation costs nothing unless a frontend opts in.

use imageproc::point::Point;
use imageproc::rect::Rect;

/// One annotation shape in capture-space coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawPrimitive {
    Rect {
        rect: Rect,
        /// Emphasized rectangles mark the chosen target
        emphasis: bool,
    },
    Line {
        from: Point<i32>,
        to: Point<i32>,
    },
    Circle {
        center: Point<i32>,
        radius: i32,
    },
}

/// Sink for per-iteration annotation primitives
pub trait OverlayRenderer: Send {
    /// Called once at the start of each annotated iteration
    fn begin_frame(&mut self, width: u32, height: u32);

    fn draw(&mut self, primitive: DrawPrimitive);

    /// Called after all primitives for the iteration were submitted
    fn commit(&mut self);
}

/// Renderer that drops every primitive
#[derive(Debug, Default)]
pub struct NullRenderer;

impl OverlayRenderer for NullRenderer {
    fn begin_frame(&mut self, _width: u32, _height: u32) {}
    fn draw(&mut self, _primitive: DrawPrimitive) {}
    fn commit(&mut self) {}
}
