//! # Encoding Module
//!
//! This module converts between raw serial bytes and their textual forms.
//! Received data is shown either as hex pairs or as UTF-8 text, and typed
//! input is sent either as hex bytes or as literal text.

use regex::Regex;
use std::sync::LazyLock;

use crate::serial::data::{ByteChunk, DisplayMode};

/// A single hex byte as typed by a user: `A5`, `0x12`, `0FF`.
static HEX_PIECE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:0[xX])?([0-9a-fA-F]+)$").expect("Invalid regex pattern"));

/// Decodes bytes to a string based on the display mode.
///
/// # Examples
///
/// ```
/// use serial_console::serial::data::DisplayMode;
/// use serial_console::serial::encoding::decode_bytes;
///
/// assert_eq!(decode_bytes(&[0x0A, 0xFF, 0x10], DisplayMode::Hex), "0A FF 10");
/// assert_eq!(decode_bytes(b"Hello", DisplayMode::Text), "Hello");
/// ```
#[must_use]
pub fn decode_bytes(source_data: &[u8], mode: DisplayMode) -> String {
    match mode {
        DisplayMode::Hex => to_hex_string(source_data),
        DisplayMode::Text => String::from_utf8_lossy(source_data).into_owned(),
    }
}

/// Renders bytes as uppercase hex pairs separated by single spaces.
#[must_use]
pub fn to_hex_string(source_data: &[u8]) -> String {
    source_data
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses user input into the bytes to send.
///
/// If every whitespace separated piece is a hex number that fits in a byte,
/// each piece becomes one byte. Otherwise the whole input is sent as its
/// UTF-8 bytes. Blank input yields an empty chunk.
///
/// # Examples
///
/// ```
/// use serial_console::serial::encoding::parse_outbound;
///
/// assert_eq!(parse_outbound("0A FF 10").as_bytes(), &[0x0A, 0xFF, 0x10]);
/// assert_eq!(parse_outbound("0A hello").as_bytes(), b"0A hello");
/// assert!(parse_outbound("   ").is_empty());
/// ```
#[must_use]
pub fn parse_outbound(token: &str) -> ByteChunk {
    let pieces: Vec<&str> = token.split_whitespace().collect();
    if pieces.is_empty() {
        return ByteChunk::empty();
    }

    let hex_bytes: Option<Vec<u8>> = pieces.iter().map(|piece| parse_hex_piece(piece)).collect();
    match hex_bytes {
        Some(bytes) => ByteChunk::from(bytes),
        None => ByteChunk::from(token.as_bytes()),
    }
}

fn parse_hex_piece(piece: &str) -> Option<u8> {
    let digits = HEX_PIECE.captures(piece)?.get(1)?.as_str();
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Some(0);
    }
    u8::from_str_radix(digits, 16).ok()
}
