//! Trigger-input seam.
//!
//! The loop gates actuation on a held trigger key. Key codes follow the
//! common virtual-key convention where 0x01 is the left pointer button and
//! 0x02 the right one.

use std::sync::Arc;

use crate::actuator::{ActuatorDispatch, LogicalButton};

pub const KEY_LEFT_BUTTON: u16 = 0x01;
pub const KEY_RIGHT_BUTTON: u16 = 0x02;

/// Answers whether a trigger key is currently held
pub trait InputSource: Send {
    fn is_pressed(&mut self, key: u16) -> bool;
}

/// Input source that never reports a held key; keeps the loop idle
#[derive(Debug, Default)]
pub struct NullInput;

impl InputSource for NullInput {
    fn is_pressed(&mut self, _key: u16) -> bool {
        false
    }
}

/// Maps pointer-button key codes onto the actuator's device-reported
/// button table. Non-pointer key codes read as released.
pub struct ActuatorButtons {
    dispatch: Arc<ActuatorDispatch>,
}

impl ActuatorButtons {
    pub fn new(dispatch: Arc<ActuatorDispatch>) -> Self {
        Self { dispatch }
    }
}

impl InputSource for ActuatorButtons {
    fn is_pressed(&mut self, key: u16) -> bool {
        let button = match key {
            KEY_LEFT_BUTTON => LogicalButton::Left,
            KEY_RIGHT_BUTTON => LogicalButton::Right,
            0x04 => LogicalButton::Middle,
            0x05 => LogicalButton::Back,
            0x06 => LogicalButton::Forward,
            _ => return false,
        };
        self.dispatch.button_pressed(button)
    }
}
