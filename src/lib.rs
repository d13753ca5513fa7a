//! # Serial Console
//!
//! An interactive serial port terminal.
//!
//! A background task reads whatever the device sends while the foreground
//! accepts input to write back. Received data is shown either as hex pairs
//! or as UTF-8 text, and the mode can be switched at any time.
//!
//! ## Architecture
//!
//! The project is organized into the following modules:
//!
//! - [`serial`]: Core serial port communication functionality
//! - [`console`]: Line-oriented front end (prompts, commands, stdout sink)
//! - [`error`]: Custom error types for the application

pub mod console;
pub mod error;
pub mod serial;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::error::*;
    pub use crate::serial::{
        DisplayMode, Drain, PortSettings, PresentationSink, SerialConnector, Session,
        SessionState,
    };
}
