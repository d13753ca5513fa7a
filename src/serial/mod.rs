//! # Serial Module
//!
//! Core serial port communication: the transport, the inbound pump that
//! reads it in the background, the byte/text codec, the session controller
//! and the drain that feeds a presentation sink.

pub mod data;
pub mod display;
pub mod encoding;
pub mod port;
pub mod pump;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use data::{ByteChunk, DisplayMode, Record, RecordKind, SharedMode};
pub use display::{DisplayLine, Direction, Drain, PresentationSink};
pub use port::{PortInfo, PortSettings, SerialConnector, list_ports};
pub use session::{Session, SessionState};
