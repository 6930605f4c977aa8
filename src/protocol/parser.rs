//! RESP Request Decoder
//!
//! Clients send every request as an array of bulk strings:
//!
//! ```text
//! *<N>\r\n
//! $<L1>\r\n<L1 bytes>\r\n
//! ...
//! $<LN>\r\n<LN bytes>\r\n
//! ```
//!
//! The first bulk string is the command name, the rest are its arguments.
//!
//! ## How the Decoder Works
//!
//! [`decode_frame`] reads from a buffer and returns either:
//! - `Ok(Some((command, consumed)))` - a complete frame, `consumed` bytes were used
//! - `Ok(None)` - the frame is incomplete, more bytes are needed
//! - `Err(ProtocolError)` - the bytes are not a valid request
//!
//! [`decode`] is the strict variant for callers that already hold exactly
//! one request: an incomplete frame is an error there.

use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding a request frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Missing `*`, unparsable count, or a count below one
    #[error("invalid array header")]
    InvalidArrayHeader,

    /// Missing `$` or an unparsable length
    #[error("invalid bulk string header")]
    InvalidBulkHeader,

    /// `$-1` (or any negative length) inside a request
    #[error("null bulk string not permitted in request")]
    NullBulkString,

    /// Bulk payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// The buffer ended before the frame did
    #[error("incomplete request frame")]
    Incomplete,

    /// A bulk string longer than [`MAX_BULK_SIZE`]
    #[error("bulk string too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ProtocolError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name, upper-cased
    pub name: String,
    /// Arguments in request order
    pub args: Vec<Bytes>,
}

impl Command {
    /// Builds a command, normalizing the name to upper case.
    pub fn new(name: &str, args: Vec<Bytes>) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            args,
        }
    }

    /// Encodes the command as a request frame, the way a client would send it.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(prefix::ARRAY);
        buf.extend_from_slice((self.args.len() + 1).to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        write_bulk(&mut buf, self.name.as_bytes());
        for arg in &self.args {
            write_bulk(&mut buf, arg);
        }
        buf
    }
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(prefix::BULK_STRING);
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(data);
    buf.extend_from_slice(CRLF);
}

/// Decodes exactly one request from `buf`.
///
/// Bytes after the first complete frame are ignored.
pub fn decode(buf: &[u8]) -> ParseResult<Command> {
    match decode_frame(buf)? {
        Some((command, _)) => Ok(command),
        None => Err(ProtocolError::Incomplete),
    }
}

/// Attempts to decode one request frame from the front of `buf`.
pub fn decode_frame(buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != prefix::ARRAY {
        return Err(ProtocolError::InvalidArrayHeader);
    }

    let (count, mut consumed) = match read_header(buf, ProtocolError::InvalidArrayHeader)? {
        Some(header) => header,
        None => return Ok(None),
    };
    if count < 1 {
        return Err(ProtocolError::InvalidArrayHeader);
    }

    let mut parts = Vec::with_capacity((count as usize).min(16));
    for _ in 0..count {
        match decode_bulk(&buf[consumed..])? {
            Some((data, used)) => {
                parts.push(data);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    let mut parts = parts.into_iter();
    let name = parts
        .next()
        .map(|raw| String::from_utf8_lossy(&raw).to_ascii_uppercase())
        .unwrap_or_default();

    Ok(Some((
        Command {
            name,
            args: parts.collect(),
        },
        consumed,
    )))
}

/// Decodes a bulk string: `$<length>\r\n<data>\r\n`
fn decode_bulk(buf: &[u8]) -> ParseResult<Option<(Bytes, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != prefix::BULK_STRING {
        return Err(ProtocolError::InvalidBulkHeader);
    }

    let (length, data_start) = match read_header(buf, ProtocolError::InvalidBulkHeader)? {
        Some(header) => header,
        None => return Ok(None),
    };
    if length < 0 {
        return Err(ProtocolError::NullBulkString);
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ProtocolError::TooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total_needed = data_start + length + 2;
    if buf.len() < total_needed {
        return Ok(None);
    }
    if &buf[data_start + length..total_needed] != CRLF {
        return Err(ProtocolError::MissingCrlf);
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
    Ok(Some((data, total_needed)))
}

/// Reads a `<prefix><integer>\r\n` line, returning the integer and the
/// number of bytes the line occupies.
fn read_header(buf: &[u8], invalid: ProtocolError) -> ParseResult<Option<(i64, usize)>> {
    let end = match find_crlf(&buf[1..]) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let value = std::str::from_utf8(&buf[1..1 + end])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(invalid)?;

    Ok(Some((value, 1 + end + 2)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
