//! # Display Module
//!
//! Consumes the hand-off channel and turns records into display lines.
//!
//! The [`Drain`] reads the display mode when each record is rendered, so a
//! mode change applies to every record rendered after it, whenever that
//! record was received. Concrete destinations implement [`PresentationSink`].

use chrono::{DateTime, Local};
use std::fmt;
use tokio::time::{self, Duration, MissedTickBehavior};

use crate::serial::data::{Record, RecordKind, RecordReceiver, SharedMode};
use crate::serial::encoding::{decode_bytes, to_hex_string};

/// Period of a timer-driven drain.
pub const DRAIN_TICK: Duration = Duration::from_millis(100);

/// Where a display line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
    Diagnostic,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
            Direction::Diagnostic => write!(f, "ERR"),
        }
    }
}

/// A rendered record.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayLine {
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    pub text: String,
}

impl fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.direction, self.text)
    }
}

/// Destination for rendered records (console, log widget, ...).
#[cfg_attr(test, mockall::automock)]
pub trait PresentationSink {
    fn render(&mut self, line: &DisplayLine);
}

/// Consumer end of the hand-off channel.
pub struct Drain {
    records: RecordReceiver,
    mode: SharedMode,
}

impl Drain {
    pub fn new(records: RecordReceiver, mode: SharedMode) -> Self {
        Drain { records, mode }
    }

    /// Renders a record using the current display mode.
    #[must_use]
    pub fn render_record(&self, record: &Record) -> DisplayLine {
        let (direction, text) = match &record.kind {
            RecordKind::Rx(chunk) => (Direction::Rx, decode_bytes(chunk, self.mode.get())),
            RecordKind::Tx(chunk) => (Direction::Tx, to_hex_string(chunk)),
            RecordKind::Diagnostic(message) => (Direction::Diagnostic, message.clone()),
        };
        DisplayLine {
            timestamp: record.timestamp,
            direction,
            text,
        }
    }

    /// Renders everything queued right now without waiting. Returns the count.
    pub fn drain_pending<S: PresentationSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut count = 0;
        while let Ok(record) = self.records.try_recv() {
            sink.render(&self.render_record(&record));
            count += 1;
        }
        count
    }

    /// Renders records as they arrive until every producer is gone.
    pub async fn run<S: PresentationSink>(mut self, mut sink: S) -> S {
        while let Some(record) = self.records.recv().await {
            sink.render(&self.render_record(&record));
        }
        sink
    }

    /// Drains on a fixed timer until every producer is gone.
    pub async fn run_ticked<S: PresentationSink>(mut self, mut sink: S, period: Duration) -> S {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.drain_pending(&mut sink);
            if self.records.is_closed() && self.records.is_empty() {
                break;
            }
        }
        sink
    }
}
