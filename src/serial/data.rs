//! Data passed between the inbound pump, the session and the display drain.

use chrono::{DateTime, Local};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;

/// Bytes captured from one non-empty read, or written by one send.
///
/// Chunk boundaries follow read timing only; they carry no framing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteChunk(Vec<u8>);

impl ByteChunk {
    /// An empty chunk.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Raw bytes of the chunk.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for ByteChunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ByteChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ByteChunk {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// How received bytes are shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// uppercase hex pairs
    #[default]
    Hex,
    /// utf8 text, invalid sequences replaced
    Text,
}

impl DisplayMode {
    /// The other mode.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Hex => DisplayMode::Text,
            DisplayMode::Text => DisplayMode::Hex,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            DisplayMode::Hex => 0,
            DisplayMode::Text => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        if value == 1 {
            DisplayMode::Text
        } else {
            DisplayMode::Hex
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Hex => write!(f, "HEX"),
            DisplayMode::Text => write!(f, "TEXT"),
        }
    }
}

/// Display mode cell shared between the session (writer) and the drain (reader).
#[derive(Clone, Debug, Default)]
pub struct SharedMode(Arc<AtomicU8>);

impl SharedMode {
    /// Creates a cell holding `mode`.
    #[must_use]
    pub fn new(mode: DisplayMode) -> Self {
        Self(Arc::new(AtomicU8::new(mode.as_u8())))
    }

    /// Current mode.
    #[must_use]
    pub fn get(&self) -> DisplayMode {
        DisplayMode::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replaces the mode.
    pub fn set(&self, mode: DisplayMode) {
        self.0.store(mode.as_u8(), Ordering::Release);
    }

    /// Flips the mode and returns the new one.
    pub fn toggle(&self) -> DisplayMode {
        let previous = self.0.fetch_xor(1, Ordering::AcqRel);
        DisplayMode::from_u8(previous).toggled()
    }
}

/// What a record carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// bytes received from the device
    Rx(ByteChunk),
    /// bytes written to the device by the local user
    Tx(ByteChunk),
    /// locally generated message, never device bytes
    Diagnostic(String),
}

/// One entry on the hand-off channel.
#[derive(Clone, Debug)]
pub struct Record {
    pub timestamp: DateTime<Local>,
    pub kind: RecordKind,
}

impl Record {
    fn now(kind: RecordKind) -> Self {
        Record {
            timestamp: Local::now(),
            kind,
        }
    }

    /// Received bytes.
    #[must_use]
    pub fn rx(chunk: ByteChunk) -> Self {
        Self::now(RecordKind::Rx(chunk))
    }

    /// Echo of sent bytes.
    #[must_use]
    pub fn tx(chunk: ByteChunk) -> Self {
        Self::now(RecordKind::Tx(chunk))
    }

    /// Diagnostic message.
    #[must_use]
    pub fn diagnostic(message: impl Into<String>) -> Self {
        Self::now(RecordKind::Diagnostic(message.into()))
    }
}

/// Producer side of the hand-off channel.
///
/// The channel is unbounded: producers (the pump and the session's TX echo)
/// never wait on the consumer, and a device that outpaces the display grows
/// the queue instead of losing records.
pub type RecordSender = mpsc::UnboundedSender<Record>;

/// Consumer side of the hand-off channel.
pub type RecordReceiver = mpsc::UnboundedReceiver<Record>;

/// Creates the hand-off channel.
#[must_use]
pub fn record_channel() -> (RecordSender, RecordReceiver) {
    mpsc::unbounded_channel()
}
