//! Pointer injection through the operating system input stack

use anyhow::{Context, Result};
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Mouse, Settings};

use super::packet::LogicalButton;

/// Synthesizes pointer input on the host, independent of any external
/// actuator hardware.
pub trait PointerBackend: Send {
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()>;
    fn set_button(&mut self, button: LogicalButton, pressed: bool) -> Result<()>;
    fn scroll(&mut self, amount: i32) -> Result<()>;
}

/// Production backend wrapping the platform input-synthesis API
pub struct OsPointer {
    enigo: Enigo,
}

impl OsPointer {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .context("failed to initialize OS input synthesis")?;
        Ok(Self { enigo })
    }
}

fn map_button(button: LogicalButton) -> Button {
    match button {
        LogicalButton::Left => Button::Left,
        LogicalButton::Right => Button::Right,
        LogicalButton::Middle => Button::Middle,
        LogicalButton::Back => Button::Back,
        LogicalButton::Forward => Button::Forward,
    }
}

impl PointerBackend for OsPointer {
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        self.enigo
            .move_mouse(dx, dy, Coordinate::Rel)
            .context("relative pointer move failed")
    }

    fn set_button(&mut self, button: LogicalButton, pressed: bool) -> Result<()> {
        let direction = if pressed {
            Direction::Press
        } else {
            Direction::Release
        };
        self.enigo
            .button(map_button(button), direction)
            .context("pointer button injection failed")
    }

    fn scroll(&mut self, amount: i32) -> Result<()> {
        self.enigo
            .scroll(amount, Axis::Vertical)
            .context("pointer scroll injection failed")
    }
}
