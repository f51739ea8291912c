//! Routes actuation intents to the serial device or the OS input stack.
//!
//! The serial session is brought up lazily on first use. Any serial failure
//! demotes the dispatcher to OS injection for the remainder of the run;
//! demotion is one-way and is the only actuation state the targeting loop
//! and configuration both observe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::os::{OsPointer, PointerBackend};
use super::packet::{ButtonEvent, LogicalButton};
use super::protocol::ActuatorSession;
use super::transport::{SystemSerial, TransportFactory};
use crate::config::ActuatorConfig;
use crate::error::ActuatorError;

/// Which actuation path the configuration asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    OsInjection,
    SerialActuator,
}

pub struct ActuatorDispatch {
    config: ActuatorConfig,
    factory: Box<dyn TransportFactory>,
    os: Mutex<Box<dyn PointerBackend>>,
    serial: Mutex<Option<ActuatorSession>>,
    demoted: AtomicBool,
}

impl ActuatorDispatch {
    pub fn new(
        config: ActuatorConfig,
        os: Box<dyn PointerBackend>,
        factory: Box<dyn TransportFactory>,
    ) -> Self {
        Self {
            config,
            factory,
            os: Mutex::new(os),
            serial: Mutex::new(None),
            demoted: AtomicBool::new(false),
        }
    }

    /// Production dispatcher: OS input synthesis plus the system serial stack
    pub fn with_system(config: ActuatorConfig) -> Result<Self> {
        Ok(Self::new(
            config,
            Box::new(OsPointer::new()?),
            Box::new(SystemSerial),
        ))
    }

    /// The backend actually in use after demotion is applied
    pub fn effective_backend(&self, configured: Backend) -> Backend {
        if self.demoted.load(Ordering::SeqCst) {
            Backend::OsInjection
        } else {
            configured
        }
    }

    pub fn is_demoted(&self) -> bool {
        self.demoted.load(Ordering::SeqCst)
    }

    pub fn move_relative(&self, configured: Backend, dx: i32, dy: i32) -> Result<()> {
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        match self.effective_backend(configured) {
            Backend::SerialActuator => match self.with_serial(|s| s.move_relative(dx, dy)) {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.demote(&e);
                    self.os.lock().move_relative(dx, dy)
                }
            },
            Backend::OsInjection => self.os.lock().move_relative(dx, dy),
        }
    }

    pub fn set_button(
        &self,
        configured: Backend,
        button: LogicalButton,
        pressed: bool,
    ) -> Result<()> {
        match self.effective_backend(configured) {
            Backend::SerialActuator => match self.with_serial(|s| s.set_button(button, pressed)) {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.demote(&e);
                    self.os.lock().set_button(button, pressed)
                }
            },
            Backend::OsInjection => self.os.lock().set_button(button, pressed),
        }
    }

    /// Timed click: press, hold for `duration`, release. The release is
    /// attempted even when the press failed over to the OS path.
    pub fn click(
        &self,
        configured: Backend,
        button: LogicalButton,
        duration: Duration,
    ) -> Result<()> {
        self.set_button(configured, button, true)?;
        thread::sleep(duration);
        self.set_button(configured, button, false)
    }

    pub fn scroll(&self, configured: Backend, amount: i32) -> Result<()> {
        match self.effective_backend(configured) {
            Backend::SerialActuator => match self.with_serial(|s| s.scroll(amount)) {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.demote(&e);
                    self.os.lock().scroll(amount)
                }
            },
            Backend::OsInjection => self.os.lock().scroll(amount),
        }
    }

    /// Device-reported button state; always false without a live session
    pub fn button_pressed(&self, button: LogicalButton) -> bool {
        self.serial
            .lock()
            .as_ref()
            .map(|s| s.is_connected() && s.button_pressed(button))
            .unwrap_or(false)
    }

    /// Next device-reported button event, bounded by `timeout`
    pub fn wait_button_event(&self, timeout: Duration) -> Option<ButtonEvent> {
        let guard = self.serial.lock();
        guard.as_ref().and_then(|s| s.wait_button_event(timeout))
    }

    /// Tear down the serial session, releasing the endpoint
    pub fn shutdown(&self) {
        self.serial.lock().take();
    }

    /// Run `f` against a live session, reinitializing once if the current
    /// one is missing or faulted.
    fn with_serial<T>(
        &self,
        f: impl FnOnce(&ActuatorSession) -> std::result::Result<T, ActuatorError>,
    ) -> std::result::Result<T, ActuatorError> {
        let mut guard = self.serial.lock();
        let usable = guard.as_ref().map(|s| s.is_connected()).unwrap_or(false);
        if !usable {
            // Drop a dead session first so the endpoint is released
            guard.take();
            *guard = Some(ActuatorSession::discover(
                self.factory.as_ref(),
                &self.config,
            )?);
        }
        match guard.as_ref() {
            Some(session) => f(session),
            None => Err(ActuatorError::NotConnected("unbound".to_string())),
        }
    }

    fn demote(&self, error: &ActuatorError) {
        if !self.demoted.swap(true, Ordering::SeqCst) {
            log::warn!("serial actuator failed ({error}); falling back to OS injection");
        }
        self.serial.lock().take();
    }
}
