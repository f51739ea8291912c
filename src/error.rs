//! Error taxonomy for the targeting engine

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Top-level engine errors
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("targeting loop is already running")]
    AlreadyRunning,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures on the serial actuator path
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("no compatible device found on any serial endpoint")]
    NoDevice,

    #[error("handshake failed on {port}: {reason}")]
    HandshakeFailed { port: String, reason: String },

    #[error("device did not respond within {0:?}")]
    Timeout(Duration),

    #[error("another actuator session is already live")]
    SessionBusy,

    #[error("session is not connected (state: {0})")]
    NotConnected(String),

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}
