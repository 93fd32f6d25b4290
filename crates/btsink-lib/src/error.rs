//! Unified error type for the btsink-lib crate.
//!
//! [`BtsinkError`] wraps module-specific errors (`DriverError`, `GpioError`)
//! and configuration problems. `From` impls allow `?` to propagate across
//! module boundaries. The sink switch engine never surfaces these to its
//! caller; the power-button watcher does.

use std::fmt;

use crate::gpio::GpioError;
use crate::mpd::DriverError;

/// Unified error type for btsink-lib operations.
#[derive(Debug)]
pub enum BtsinkError {
    /// External command (mpc, bluetoothctl, systemctl) failed.
    Driver(DriverError),
    /// GPIO line acquisition or I/O failed.
    Gpio(GpioError),
    /// Standard I/O error.
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
}

impl fmt::Display for BtsinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BtsinkError::Driver(e) => write!(f, "{e}"),
            BtsinkError::Gpio(e) => write!(f, "{e}"),
            BtsinkError::Io(e) => write!(f, "I/O error: {e}"),
            BtsinkError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for BtsinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BtsinkError::Driver(e) => Some(e),
            BtsinkError::Gpio(e) => Some(e),
            BtsinkError::Io(e) => Some(e),
            BtsinkError::Config(_) => None,
        }
    }
}

impl From<DriverError> for BtsinkError {
    fn from(e: DriverError) -> Self {
        BtsinkError::Driver(e)
    }
}

impl From<GpioError> for BtsinkError {
    fn from(e: GpioError) -> Self {
        BtsinkError::Gpio(e)
    }
}

impl From<std::io::Error> for BtsinkError {
    fn from(e: std::io::Error) -> Self {
        BtsinkError::Io(e)
    }
}

/// Crate-level Result alias using [`BtsinkError`].
pub type Result<T> = std::result::Result<T, BtsinkError>;
