//! Cursor-Based RESP Request Decoder
//!
//! This module turns a buffered payload into the commands it contains.
//! Requests are arrays of bulk strings; a bare bulk string is accepted as a
//! one-element frame.
//!
//! ## How the Decoder Works
//!
//! Each top-level frame goes through the same states:
//!
//! ```text
//!   Start ──skip CR/LF──> ArrayHeader ──N──> BulkElement × N ──> Resolve
//!     │                       (`*N`)          (`$L` + L bytes)      │
//!     │                                                            │
//!     └──────────── bare `$L` ──> BulkElement × 1 ─────────────────┘
//! ```
//!
//! The decoder never waits for more bytes. A declared length that the
//! buffer cannot satisfy is a [`DecodeError::TruncatedInput`]; it is up to
//! the connection reader to only hand over whole frames, which it does with
//! [`frame_boundary`].
//!
//! A bulk string may not declare more than [`MAX_BULK_SIZE`] bytes. Such a
//! frame fails with [`DecodeError::MessageTooLarge`] as soon as its length
//! line is read, and nothing after it in the payload is decoded.
//!
//! ## Error Recovery
//!
//! A bad frame fails on its own and decoding resumes with the next one:
//!
//! - If the frame was fully scanned (unknown command, wrong arity, empty
//!   array) decoding resumes right after it.
//! - If the frame structure itself is broken, the decoder skips ahead to the
//!   next `*` that starts a line. Without one, the rest of the buffer is
//!   dropped.
//!
//! Arguments are zero-copy: every argument is a `Bytes` slice of the
//! original payload.

use crate::commands::Command;
use crate::protocol::types::{prefix, Reply};
use bytes::Bytes;
use std::ops::Range;
use thiserror::Error;

/// Upper bound on the elements preallocated for one array header.
const MAX_PREALLOCATED_ELEMENTS: usize = 16;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A length prefix that is not a non-negative decimal integer
    #[error("malformed length '{0}'")]
    MalformedLength(String),

    /// A sigil or terminator was expected but another byte was found
    #[error("unexpected byte '{}', expected '{}'", .found.escape_ascii(), .expected)]
    UnexpectedToken { expected: &'static str, found: u8 },

    /// The buffer ends before the frame does
    #[error("truncated input: expected {expected} bytes, found {found}")]
    TruncatedInput { expected: usize, found: usize },

    /// The command name is not one of PING, ECHO, SET, GET
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// The frame does not start with `*` or `$`, or is an empty array
    #[error("invalid command")]
    InvalidCommand,

    /// The command was given the wrong number of arguments
    #[error("wrong number of arguments for '{command}' command")]
    WrongArity { command: String },

    /// A bulk string declared more than [`MAX_BULK_SIZE`] bytes
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

impl DecodeError {
    /// Returns true if more input could turn this error into a valid frame.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::TruncatedInput { .. })
    }

    /// Returns true if the rest of the stream can no longer be framed.
    ///
    /// The body of an oversized bulk string is never read, so whatever
    /// follows its length line is not a frame boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::MessageTooLarge { .. })
    }
}

impl From<&DecodeError> for Reply {
    fn from(err: &DecodeError) -> Self {
        Reply::error(format!("ERR {}", err))
    }
}

impl From<DecodeError> for Reply {
    fn from(err: DecodeError) -> Self {
        Reply::from(&err)
    }
}

/// Low-level cursor over a byte slice.
///
/// The scanner only knows about frame structure. It reports element
/// contents as ranges so the same code serves both [`Decoder`] and
/// [`frame_boundary`].
struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn skip_line_breaks(&mut self) {
        while matches!(self.peek(), Some(b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8, expected: &'static str) -> Result<(), DecodeError> {
        match self.peek() {
            Some(found) if found == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(DecodeError::UnexpectedToken { expected, found }),
            None => Err(DecodeError::TruncatedInput {
                expected: 1,
                found: 0,
            }),
        }
    }

    fn expect_crlf(&mut self) -> Result<(), DecodeError> {
        if self.remaining() < 2 {
            return Err(DecodeError::TruncatedInput {
                expected: 2,
                found: self.remaining(),
            });
        }
        self.expect(b'\r', "\\r")?;
        self.expect(b'\n', "\\n")
    }

    /// Reads the decimal digits up to CR and the CRLF that follows them.
    fn read_length(&mut self) -> Result<usize, DecodeError> {
        let rest = &self.buf[self.pos..];
        let cr = rest.iter().position(|&b| b == b'\r');
        let digits = &rest[..cr.unwrap_or(rest.len())];

        let malformed =
            || DecodeError::MalformedLength(String::from_utf8_lossy(digits).into_owned());
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(malformed());
        }
        let Some(cr) = cr else {
            return Err(DecodeError::TruncatedInput {
                expected: digits.len() + 2,
                found: digits.len(),
            });
        };
        if digits.is_empty() {
            return Err(malformed());
        }

        // All ASCII digits, so the only possible failure is overflow.
        let length = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(malformed)?;

        self.pos += cr;
        self.expect_crlf()?;
        Ok(length)
    }

    /// Reads one `$L\r\n<L bytes>\r\n` element and returns the content range.
    fn read_bulk(&mut self) -> Result<Range<usize>, DecodeError> {
        self.expect(prefix::BULK_STRING, "$")?;
        let length = self.read_length()?;

        if length > MAX_BULK_SIZE {
            return Err(DecodeError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        if self.remaining() < length + 2 {
            return Err(DecodeError::TruncatedInput {
                expected: length + 2,
                found: self.remaining(),
            });
        }

        let start = self.pos;
        self.pos += length;
        self.expect_crlf()?;
        Ok(start..start + length)
    }

    /// Scans the next top-level frame.
    ///
    /// Returns `Ok(None)` when only line breaks are left.
    fn scan_frame(&mut self) -> Result<Option<Vec<Range<usize>>>, DecodeError> {
        self.skip_line_breaks();

        match self.peek() {
            None => Ok(None),
            Some(prefix::ARRAY) => {
                self.pos += 1;
                let count = self.read_length()?;
                let mut elements = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));
                for _ in 0..count {
                    elements.push(self.read_bulk()?);
                }
                Ok(Some(elements))
            }
            Some(prefix::BULK_STRING) => Ok(Some(vec![self.read_bulk()?])),
            Some(_) => Err(DecodeError::InvalidCommand),
        }
    }
}

/// Finds where decoding resumes after a structurally broken frame: the next
/// `*` at the start of a line at or after `from`, or the end of the buffer.
///
/// `from` itself qualifies: a frame with fewer elements than its header
/// announced fails right on the `*` of the frame after it. A frame's own
/// leading `*` is consumed before it can fail, so this always makes progress.
fn resync(buf: &[u8], from: usize) -> usize {
    let start = from.saturating_sub(1);
    buf.get(start..)
        .and_then(|rest| rest.windows(2).position(|w| w == b"\n*"))
        .map(|i| start + i + 1)
        .unwrap_or(buf.len())
}

/// Decodes the frames of one payload, in order.
///
/// Each call to `next` yields the result for exactly one frame, so one
/// malformed frame never hides the frames after it.
///
/// # Example
///
/// ```
/// use respkv::commands::Command;
/// use respkv::protocol::Decoder;
/// use bytes::Bytes;
///
/// let payload = Bytes::from_static(b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
/// let commands: Vec<_> = Decoder::new(payload).collect();
/// assert_eq!(commands.len(), 2);
/// assert_eq!(commands[0], Ok(Command::Ping { argument: None }));
/// ```
#[derive(Debug, Clone)]
pub struct Decoder {
    payload: Bytes,
    pos: usize,
}

impl Decoder {
    /// Creates a decoder positioned at the start of `payload`.
    pub fn new(payload: Bytes) -> Self {
        Self { payload, pos: 0 }
    }
}

impl Iterator for Decoder {
    type Item = Result<Command, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut scanner = Scanner::new(&self.payload, self.pos);

        match scanner.scan_frame() {
            Ok(None) => {
                self.pos = self.payload.len();
                None
            }
            Ok(Some(ranges)) => {
                self.pos = scanner.pos;
                let parts = ranges
                    .into_iter()
                    .map(|range| self.payload.slice(range))
                    .collect();
                Some(Command::from_parts(parts))
            }
            Err(err) if err.is_fatal() => {
                self.pos = self.payload.len();
                Some(Err(err))
            }
            Err(err) => {
                self.pos = resync(&self.payload, scanner.pos);
                Some(Err(err))
            }
        }
    }
}

/// Decodes every frame of `payload`, failing at the first malformed one.
pub fn decode(payload: Bytes) -> Result<Vec<Command>, DecodeError> {
    Decoder::new(payload).collect()
}

/// Where the whole frames at the front of a read buffer end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBoundary {
    /// Length of the prefix that can be handed to the decoder
    pub len: usize,
    /// The prefix ends with a frame that declared an oversized bulk string;
    /// nothing after it can be framed
    pub oversized: bool,
}

/// Finds the longest prefix of `buf` made of whole frames.
///
/// A frame that is only missing bytes ends the prefix; those bytes stay
/// buffered until the next read. A frame that is broken in a way more
/// bytes cannot fix counts as whole up to its resync point, so the decoder
/// gets to report it. A frame declaring more than [`MAX_BULK_SIZE`] bytes
/// ends the prefix right after its length line.
pub fn frame_boundary(buf: &[u8]) -> FrameBoundary {
    let mut scanner = Scanner::new(buf, 0);
    let mut complete = 0;

    loop {
        match scanner.scan_frame() {
            Ok(Some(_)) => complete = scanner.pos,
            Ok(None) => {
                return FrameBoundary {
                    len: buf.len(),
                    oversized: false,
                }
            }
            Err(err) if err.is_fatal() => {
                return FrameBoundary {
                    len: scanner.pos,
                    oversized: true,
                }
            }
            Err(err) if err.is_incomplete() => {
                return FrameBoundary {
                    len: complete,
                    oversized: false,
                }
            }
            Err(_) => {
                scanner.pos = resync(buf, scanner.pos);
                complete = scanner.pos;
            }
        }
    }
}
