//! Frame data and the capture source boundary

use image::RgbaImage;

/// Screen-space rectangle requested from a capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle of the given size centered on the screen, shifted by an
    /// optional offset. Clamped so it never leaves the screen bounds.
    pub fn centered(
        screen_width: u32,
        screen_height: u32,
        width: u32,
        height: u32,
        offset_x: i32,
        offset_y: i32,
    ) -> Self {
        let width = width.min(screen_width);
        let height = height.min(screen_height);
        let x = (screen_width as i32 - width as i32) / 2 + offset_x;
        let y = (screen_height as i32 - height as i32) / 2 + offset_y;
        let x = x.clamp(0, screen_width as i32 - width as i32);
        let y = y.clamp(0, screen_height as i32 - height as i32);
        Self::new(x, y, width, height)
    }
}

/// A captured frame: an owned RGBA pixel grid
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// RGBA pixel data, row-major
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    /// Solid-color frame, mostly useful for tests and previews
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self::new(width, height, data)
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    /// Get a pixel, or `None` when out of bounds
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixel(x, y))
    }

    /// Bounds-unchecked pixel accessor for hot loops that already iterate
    /// within the frame dimensions
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) * 4) as usize;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Paint an axis-aligned rectangle of pixels (test fixture helper)
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: [u8; 4]) {
        for py in y..(y + height).min(self.height) {
            for px in x..(x + width).min(self.width) {
                let idx = ((py * self.width + px) * 4) as usize;
                self.data[idx..idx + 4].copy_from_slice(&rgba);
            }
        }
    }
}

/// Source of screen frames
///
/// `None` signals a transient capture failure; the loop skips the iteration
/// with a short backoff and retries on the next cycle.
pub trait FrameSource: Send {
    fn capture(&mut self, rect: CaptureRect) -> Option<Frame>;
}
