//! Zero-escape codec for data read by scanning raw memory.
//!
//! The host reads the target-to-host ring by peeking at RAM over the debug
//! interface and treating any zero byte as an empty slot.  Payload zero bytes
//! therefore have to be escaped before they are stored:
//!
//! | Payload                  | Encoded            |
//! |--------------------------|--------------------|
//! | `n` zero bytes (1..=254) | `0x80, n`          |
//! | literal `0x80`           | `0x80, 0xFF`       |
//! | any other byte           | unchanged          |
//!
//! Runs of more than 254 zeros are split into several escape pairs.  The
//! encoded form never contains a zero byte, so an escape followed by zero
//! always means the count has not been written (or not yet been seen) and
//! the reader must wait.
//!
//! The host-to-target ring is consumed through its indices rather than by
//! scanning, so it carries raw bytes and does not use this codec.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use crate::{Error, Result};

/// Escape byte introducing a zero run (or, with [`MARKER_COUNT`], a literal
/// `0x80`).
pub const ESCAPE: u8 = 0x80;

/// Count byte following [`ESCAPE`] for a literal `0x80`.
pub const MARKER_COUNT: u8 = 0xFF;

/// Longest zero run a single escape pair can describe.
pub const MAX_RUN: usize = MARKER_COUNT as usize - 1;

/// One encoded unit of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// A byte passed through unchanged.  Never zero or [`ESCAPE`].
    Literal(u8),
    /// A run of 1 to [`MAX_RUN`] zero bytes.
    ZeroRun(u8),
    /// A literal [`ESCAPE`] payload byte.
    Marker,
}

impl Symbol {
    /// Symbol for a single payload byte, without any run coalescing.
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Symbol::ZeroRun(1),
            ESCAPE => Symbol::Marker,
            b => Symbol::Literal(b),
        }
    }

    /// Parse the symbol at the start of `window`.
    ///
    /// Errors:
    /// - [`Error::BufferEmpty`] if the window is empty or starts with a
    ///   sentinel zero (an empty slot).
    /// - [`Error::MalformedEscape`] if the window ends straight after an
    ///   escape byte, or the count byte is still an empty slot.  The peer
    ///   has probably not written the count yet, so callers should leave
    ///   the escape unconsumed and retry later.
    pub fn parse(window: &[u8]) -> Result<Self> {
        match window {
            [] | [0, ..] => Err(Error::BufferEmpty),
            [ESCAPE] | [ESCAPE, 0, ..] => Err(Error::MalformedEscape),
            [ESCAPE, MARKER_COUNT, ..] => Ok(Symbol::Marker),
            [ESCAPE, n, ..] => Ok(Symbol::ZeroRun(*n)),
            [b, ..] => Ok(Symbol::Literal(*b)),
        }
    }

    /// Number of bytes this symbol occupies once encoded.
    pub const fn encoded_len(&self) -> usize {
        match self {
            Symbol::Literal(_) => 1,
            Symbol::ZeroRun(_) | Symbol::Marker => 2,
        }
    }

    /// Number of payload bytes this symbol stands for.
    pub const fn decoded_len(&self) -> usize {
        match self {
            Symbol::Literal(_) | Symbol::Marker => 1,
            Symbol::ZeroRun(n) => *n as usize,
        }
    }

    /// The encoded bytes of this symbol.
    pub const fn encoded(&self) -> Encoded {
        match self {
            Symbol::Literal(b) => Encoded {
                bytes: [*b, 0],
                len: 1,
            },
            Symbol::ZeroRun(n) => Encoded {
                bytes: [ESCAPE, *n],
                len: 2,
            },
            Symbol::Marker => Encoded {
                bytes: [ESCAPE, MARKER_COUNT],
                len: 2,
            },
        }
    }

    /// Write the payload bytes of this symbol to the start of `out`,
    /// returning how many were written.
    pub fn write_decoded(&self, out: &mut [u8]) -> Result<usize> {
        let len = self.decoded_len();
        let out = out.get_mut(..len).ok_or(Error::BufferTooSmall)?;
        match self {
            Symbol::Literal(b) => out[0] = *b,
            Symbol::Marker => out[0] = ESCAPE,
            Symbol::ZeroRun(_) => out.fill(0),
        }
        Ok(len)
    }
}

/// Encoded form of a single [`Symbol`], one or two bytes long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    bytes: [u8; 2],
    len: usize,
}

impl Encoded {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Iterator over the symbols of a payload, coalescing zero runs.
#[derive(Debug, Clone)]
pub struct Encoder<'a> {
    input: &'a [u8],
}

impl<'a> Encoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input }
    }
}

impl Iterator for Encoder<'_> {
    type Item = Symbol;

    fn next(&mut self) -> Option<Symbol> {
        let first = *self.input.first()?;
        let symbol = if first == 0 {
            let run = self
                .input
                .iter()
                .take(MAX_RUN)
                .take_while(|&&b| b == 0)
                .count();
            Symbol::ZeroRun(run as u8)
        } else {
            Symbol::from_byte(first)
        };
        self.input = &self.input[symbol.decoded_len()..];
        Some(symbol)
    }
}

/// Length of `input` once encoded.
pub fn encoded_len(input: &[u8]) -> usize {
    Encoder::new(input).map(|s| s.encoded_len()).sum()
}

/// Encode `input` into `out`, returning the number of bytes written.
///
/// Returns [`Error::BufferTooSmall`] if `out` cannot hold the whole
/// encoding; use [`encoded_len()`] to size it.
pub fn encode(input: &[u8], out: &mut [u8]) -> Result<usize> {
    let mut written = 0;
    for symbol in Encoder::new(input) {
        let encoded = symbol.encoded();
        let bytes = encoded.as_slice();
        out.get_mut(written..written + bytes.len())
            .ok_or(Error::BufferTooSmall)?
            .copy_from_slice(bytes);
        written += bytes.len();
    }
    Ok(written)
}

/// Decode `input` into `out`, returning the number of payload bytes written.
///
/// A sentinel zero in `input` marks the end of the valid data, as it does
/// when scanning a ring, and decoding stops there.
///
/// Errors:
/// - [`Error::MalformedEscape`] if `input` has an escape byte without a
///   count, at the end or followed by a zero.
/// - [`Error::BufferTooSmall`] if `out` is too short.
pub fn decode(input: &[u8], out: &mut [u8]) -> Result<usize> {
    let mut pos = 0;
    let mut written = 0;
    while pos < input.len() {
        let symbol = match Symbol::parse(&input[pos..]) {
            Ok(symbol) => symbol,
            Err(Error::BufferEmpty) => break,
            Err(e) => return Err(e),
        };
        written += symbol.write_decoded(&mut out[written..])?;
        pos += symbol.encoded_len();
    }
    Ok(written)
}
