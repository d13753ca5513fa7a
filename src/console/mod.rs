//! # Console Module
//!
//! Line-oriented front end for a [`Session`]: in-band commands, the stdout
//! presentation sink and the interactive input loop.

pub mod prompt;

use log::{error, warn};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufRead, Lines};

use crate::error::Result;
use crate::serial::data::DisplayMode;
use crate::serial::display::{DisplayLine, PresentationSink};
use crate::serial::pump::PumpExit;
use crate::serial::session::Session;

/// Timestamp format used when console timestamps are on.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// empty line
    Quit,
    /// `/toggle`
    ToggleMode,
    /// `/hex` or `/text`
    SetMode(DisplayMode),
    /// `/time`
    ToggleTimestamps,
    /// anything else
    Send(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        if line.is_empty() {
            return Command::Quit;
        }
        match line.trim().to_lowercase().as_str() {
            "/toggle" => Command::ToggleMode,
            "/hex" => Command::SetMode(DisplayMode::Hex),
            "/text" => Command::SetMode(DisplayMode::Text),
            "/time" => Command::ToggleTimestamps,
            _ => Command::Send(line.to_string()),
        }
    }
}

/// On/off switch for console timestamps, shared between the input loop and
/// the sink running in the drain task.
#[derive(Clone, Debug, Default)]
pub struct TimestampSwitch(Arc<AtomicBool>);

impl TimestampSwitch {
    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::Relaxed);
    }

    /// Flips the switch and returns the new setting.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Writes display lines to a console stream.
///
/// Every line starts on a fresh row, so output from the drain task does not
/// run into a pending `>> ` prompt.
pub struct ConsoleSink<W: Write> {
    out: W,
    timestamps: TimestampSwitch,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        ConsoleSink {
            out,
            timestamps: TimestampSwitch::default(),
        }
    }

    /// Handle that turns timestamps on and off while the sink is running.
    pub fn timestamps(&self) -> TimestampSwitch {
        self.timestamps.clone()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PresentationSink for ConsoleSink<W> {
    fn render(&mut self, line: &DisplayLine) {
        let result = if self.timestamps.is_on() {
            writeln!(
                self.out,
                "\n[{}] {}",
                line.timestamp.format(TIMESTAMP_FORMAT),
                line
            )
        } else {
            writeln!(self.out, "\n{line}")
        }
        .and_then(|()| self.out.flush());
        if let Err(e) = result {
            error!("Failed to write to console: {e}");
        }
    }
}

/// Usage text shown once connected.
pub const HELP: &str = "\
Enter the data to send. Just press Enter on an empty line to exit.
If the input consists of space-separated hexadecimal numbers (e.g., 0x12 0xA5 or 12 A5),
it will be sent as hex; otherwise, it will be sent as text.
Type /toggle to switch the received data display mode between hexadecimal and text
(or /hex, /text to pick one). Type /time to turn timestamps on or off.";

enum Event {
    Input(Option<String>),
    LinkLost(PumpExit),
}

/// Reads commands from `input` and drives `session` until the user quits or
/// input ends. `/time` flips `timestamps`.
pub async fn interact<R, W>(
    session: &mut Session,
    input: &mut Lines<R>,
    out: &mut W,
    timestamps: &TimestampSwitch,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{HELP}")?;
    loop {
        write!(out, ">> ")?;
        out.flush()?;
        let port_name = session.port_name().unwrap_or("the port").to_string();

        let event = tokio::select! {
            line = input.next_line() => Event::Input(line?),
            exit = session.link_lost() => Event::LinkLost(exit),
        };

        let line = match event {
            Event::Input(Some(line)) => line,
            Event::Input(None) => break,
            Event::LinkLost(exit) => {
                warn!("Session ended by the device side: {exit:?}");
                let state = session.state().await;
                writeln!(out)?;
                writeln!(
                    out,
                    "Connection to {port_name} lost, session {state}. Press Enter on an empty line to exit."
                )?;
                continue;
            }
        };

        match Command::parse(&line) {
            Command::Quit => {
                writeln!(out, "Exiting...")?;
                break;
            }
            Command::ToggleMode => {
                let mode = session.toggle_mode();
                writeln!(out, "Received data display mode switched to {mode}.")?;
            }
            Command::SetMode(mode) => {
                session.set_mode(mode);
                writeln!(out, "Received data display mode switched to {mode}.")?;
            }
            Command::ToggleTimestamps => {
                let on = timestamps.toggle();
                writeln!(out, "Timestamps {}.", if on { "on" } else { "off" })?;
            }
            Command::Send(token) => {
                if let Err(e) = session.send(&token).await {
                    writeln!(out, "Error sending data: {e}")?;
                }
            }
        }
    }
    Ok(())
}
