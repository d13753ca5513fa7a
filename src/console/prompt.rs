//! Startup prompts: pick a port and a baud rate.

use log::warn;
use std::io::Write;
use tokio::io::{AsyncBufRead, Lines};

use crate::error::{Result, SerialConsoleError};
use crate::serial::port::{COMMON_BAUD_RATES, DEFAULT_BAUD_RATE, PortInfo, PortSettings};

/// `[i] name - description`, one port per line.
pub fn format_port_list(ports: &[PortInfo]) -> String {
    ports
        .iter()
        .enumerate()
        .map(|(i, port)| format!("[{i}] {} - {}", port.port_name, port.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolves a typed index into one of `ports`.
pub fn parse_port_selection<'a>(input: &str, ports: &'a [PortInfo]) -> Result<&'a PortInfo> {
    input
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|index| ports.get(index))
        .ok_or_else(|| SerialConsoleError::invalid_config(format!("Invalid selection '{}'", input.trim())))
}

/// Parses a positive baud rate.
pub fn parse_baud_rate(input: &str) -> Option<u32> {
    input.trim().parse::<u32>().ok().filter(|baud| *baud > 0)
}

/// Prints `question` and reads one line of input.
pub async fn ask<R, W>(input: &mut Lines<R>, out: &mut W, question: &str) -> Result<String>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{question}")?;
    out.flush()?;
    match input.next_line().await? {
        Some(line) => Ok(line),
        None => Err(SerialConsoleError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "input closed",
        ))),
    }
}

/// Lists `ports` and asks for the port and baud rate to use.
pub async fn select_settings<R, W>(
    input: &mut Lines<R>,
    out: &mut W,
    ports: &[PortInfo],
) -> Result<PortSettings>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if ports.is_empty() {
        return Err(SerialConsoleError::NoPorts);
    }
    writeln!(out, "Available serial ports:")?;
    writeln!(out, "{}", format_port_list(ports))?;

    let answer = ask(input, out, "Select serial port index: ").await?;
    let port = parse_port_selection(&answer, ports)?;

    let answer = ask(input, out, "Enter baud rate (e.g., 9600, 115200): ").await?;
    let baud_rate = match parse_baud_rate(&answer) {
        Some(baud) => {
            if !COMMON_BAUD_RATES.contains(&baud) {
                warn!("Using non-standard baud rate {baud}");
            }
            baud
        }
        None => {
            writeln!(
                out,
                "Invalid baud rate input, defaulting to {DEFAULT_BAUD_RATE}"
            )?;
            DEFAULT_BAUD_RATE
        }
    };

    Ok(PortSettings::new(port.port_name.clone(), baud_rate))
}
