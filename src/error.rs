//! # Error Module
//!
//! This module provides custom error types for the `serial_console` application.
//! It uses the `thiserror` crate for ergonomic error handling.

use thiserror::Error;

/// Result type alias for `serial_console` operations.
pub type Result<T> = std::result::Result<T, SerialConsoleError>;

/// Main error type for the `serial_console` application.
#[derive(Debug, Error)]
pub enum SerialConsoleError {
    /// Failed to open serial port.
    #[error("Failed to open serial port '{port_name}': {reason}")]
    PortOpen { port_name: String, reason: String },

    /// Failed to read from serial port.
    #[error("Failed to read from serial port: {0}")]
    PortRead(String),

    /// Failed to write to serial port.
    #[error("Failed to write to serial port: {0}")]
    PortWrite(String),

    /// The operation needs a connected session.
    #[error("Serial port is not connected")]
    NotConnected,

    /// `connect` was called while a link is already up.
    #[error("Serial port '{0}' is already connected")]
    AlreadyConnected(String),

    /// No serial port was found on this machine.
    #[error("No serial ports detected")]
    NoPorts,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Console I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerialConsoleError {
    /// Creates a new port open error.
    #[must_use]
    pub fn port_open(port_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PortOpen {
            port_name: port_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new port read error.
    #[must_use]
    pub fn port_read(msg: impl Into<String>) -> Self {
        Self::PortRead(msg.into())
    }

    /// Creates a new port write error.
    #[must_use]
    pub fn port_write(msg: impl Into<String>) -> Self {
        Self::PortWrite(msg.into())
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
