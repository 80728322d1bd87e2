//! Request Decoder
//!
//! Requests are always RESP arrays of bulk strings:
//!
//! ```text
//! *<N>\r\n
//! $<L1>\r\n<L1 bytes>\r\n
//! ...
//! $<LN>\r\n<LN bytes>\r\n
//! ```
//!
//! ## How the Decoder Works
//!
//! The parser works on whatever bytes have been buffered so far and returns:
//! - `Ok(Some((request, consumed)))` - a whole request was available
//! - `Ok(None)` - the request is incomplete, read more bytes and retry
//! - `Err(DecodeError)` - the bytes cannot be a valid request
//!
//! Only header lines are searched for CRLF. Payloads are taken by their
//! declared length and never scanned, so a payload may contain any byte,
//! the CRLF sequence included. After exactly `L` payload bytes the next two
//! bytes must be CRLF, otherwise the declared length was wrong.
//!
//! [`decode_request`] wraps the parser for a connection's read buffer: it
//! consumes the request on success and skips past the broken input on error,
//! so the connection can keep serving subsequent requests.

use crate::protocol::types::{prefix, CRLF};
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Errors produced while decoding a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A header line has the wrong sigil, a bad integer, or an invalid count/length
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The payload was not followed by CRLF at its declared length
    #[error("argument {index} does not match its declared length of {declared} bytes")]
    LengthMismatch { index: usize, declared: usize },

    /// The stream ended in the middle of a request
    #[error("stream ended with {buffered} bytes of an incomplete request")]
    Truncated { buffered: usize },

    /// The request was well framed but names a command we do not support.
    /// `frame_len` is the size of the whole request on the wire.
    #[error("unknown command '{name}'")]
    UnknownCommand { name: String, frame_len: usize },

    /// The request would not fit in `limit` bytes
    #[error("request exceeds the {limit} byte limit")]
    RequestTooLarge { limit: usize },
}

impl DecodeError {
    /// True when the rest of the stream cannot be trusted, so the
    /// connection should be closed after replying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::RequestTooLarge { .. })
    }
}

/// A decode error plus the offset where resynchronisation may start
/// looking for the next request.
#[derive(Debug)]
struct FrameError {
    error: DecodeError,
    resume_at: usize,
}

impl FrameError {
    fn new(error: DecodeError, resume_at: usize) -> Self {
        Self { error, resume_at }
    }

    fn at(resume_at: usize) -> impl FnOnce(DecodeError) -> Self {
        move |error| Self::new(error, resume_at)
    }
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Maximum size of one request on the wire (64 KB). This bounds how much a
/// single client can make the server buffer.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Maximum number of arguments in one request
pub const MAX_ARGUMENTS: usize = 1024 * 1024;

/// Longest header line we will wait for: a sigil and a signed 64-bit integer.
const MAX_HEADER_LEN: usize = 21;

/// The commands the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Ping,
    Echo,
    Set,
    Get,
}

impl Command {
    /// Resolves a command name, ignoring ASCII case.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        [Command::Ping, Command::Echo, Command::Set, Command::Get]
            .into_iter()
            .find(|cmd| name.eq_ignore_ascii_case(cmd.name().as_bytes()))
    }

    /// The canonical (uppercase) command name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Echo => "ECHO",
            Command::Set => "SET",
            Command::Get => "GET",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded request.
///
/// `args()` holds every argument as sent, so `args()[0]` is the command
/// name in the client's original spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    command: Command,
    args: Vec<Bytes>,
}

impl Request {
    /// Builds a request from raw arguments, resolving the command from the
    /// first one. Returns `None` for an empty list or an unsupported command.
    pub fn from_args(args: Vec<Bytes>) -> Option<Self> {
        let command = Command::from_name(args.first()?)?;
        Some(Self { command, args })
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// All arguments, command name first.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// The arguments after the command name.
    pub fn params(&self) -> &[Bytes] {
        &self.args[1..]
    }
}

/// Incremental request parser.
///
/// # Example
///
/// ```
/// use emberkv::protocol::{Command, RequestParser};
///
/// let parser = RequestParser::new();
/// let (request, consumed) = parser
///     .parse(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
///     .unwrap()
///     .unwrap();
/// assert_eq!(request.command(), Command::Get);
/// assert_eq!(consumed, 23);
/// ```
#[derive(Debug, Clone)]
pub struct RequestParser {
    /// Largest request accepted, headers and terminators included
    max_request_len: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    /// Creates a parser with the default request size limit.
    pub fn new() -> Self {
        Self {
            max_request_len: MAX_REQUEST_SIZE,
        }
    }

    /// Creates a parser that rejects requests longer than `max_request_len`.
    pub fn with_max_request_len(max_request_len: usize) -> Self {
        Self { max_request_len }
    }

    /// Attempts to parse one request from the start of `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((request, consumed)))` - Successfully parsed a request
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - The buffered bytes can never form a valid request
    pub fn parse(&self, buf: &[u8]) -> DecodeResult<Option<(Request, usize)>> {
        self.parse_frame(buf).map_err(|e| e.error)
    }

    fn parse_frame(&self, buf: &[u8]) -> Result<Option<(Request, usize)>, FrameError> {
        let header = read_header(buf, 0, prefix::ARRAY).map_err(FrameError::at(0))?;
        let (count, mut pos) = match header {
            Some(header) => header,
            None => return Ok(None),
        };

        if count < 1 || count as u64 > MAX_ARGUMENTS as u64 {
            let error = DecodeError::MalformedHeader(format!("invalid argument count {}", count));
            return Err(FrameError::new(error, 0));
        }
        let count = count as usize;

        let mut args = Vec::with_capacity(count.min(16));

        for index in 0..count {
            let header = read_header(buf, pos, prefix::BULK_STRING).map_err(FrameError::at(pos))?;
            let (declared, data_start) = match header {
                Some(header) => header,
                None => return Ok(None),
            };

            if declared < 0 {
                let error = DecodeError::MalformedHeader(format!("invalid bulk length {}", declared));
                return Err(FrameError::new(error, pos));
            }

            // Checked before waiting for the payload so a huge declared
            // length is refused without buffering any of it
            let frame_end = (declared as u64).saturating_add((data_start + CRLF.len()) as u64);
            if frame_end > self.max_request_len as u64 {
                let error = DecodeError::RequestTooLarge {
                    limit: self.max_request_len,
                };
                return Err(FrameError::new(error, buf.len()));
            }
            let declared = declared as usize;

            let data_end = data_start + declared;
            if buf.len() < data_end + CRLF.len() {
                return Ok(None);
            }

            if &buf[data_end..data_end + CRLF.len()] != CRLF {
                let error = DecodeError::LengthMismatch { index, declared };
                return Err(FrameError::new(error, data_end));
            }

            args.push(Bytes::copy_from_slice(&buf[data_start..data_end]));
            pos = data_end + CRLF.len();
        }

        match Command::from_name(&args[0]) {
            Some(command) => Ok(Some((Request { command, args }, pos))),
            None => {
                let error = DecodeError::UnknownCommand {
                    name: String::from_utf8_lossy(&args[0]).into_owned(),
                    frame_len: pos,
                };
                Err(FrameError::new(error, pos))
            }
        }
    }

    /// Decodes the next request out of a connection's read buffer.
    ///
    /// On success the request's bytes are removed from `buf`. On error the
    /// offending input is discarded (see [`resync_offset`]) so the next call
    /// starts at the following request. An unknown command is dropped as
    /// one whole request, and an oversized request empties the buffer.
    pub fn decode(&self, buf: &mut BytesMut) -> DecodeResult<Option<Request>> {
        match self.parse_frame(buf) {
            Ok(Some((request, consumed))) => {
                buf.advance(consumed);
                Ok(Some(request))
            }
            Ok(None) => Ok(None),
            Err(FrameError { error, resume_at }) => {
                let skip = match &error {
                    DecodeError::UnknownCommand { frame_len, .. } => *frame_len,
                    DecodeError::RequestTooLarge { .. } => buf.len(),
                    _ => resync_offset(buf, resume_at),
                };
                buf.advance(skip);
                Err(error)
            }
        }
    }
}

/// Reads a `<sigil><integer>\r\n` line starting at `pos`.
///
/// Returns the integer and the offset just past the line's CRLF.
fn read_header(buf: &[u8], pos: usize, sigil: u8) -> DecodeResult<Option<(i64, usize)>> {
    let rest = &buf[pos..];
    let window = &rest[..rest.len().min(MAX_HEADER_LEN + CRLF.len())];

    let end = match find_crlf(window) {
        Some(end) => end,
        None if window.len() == MAX_HEADER_LEN + CRLF.len() => {
            return Err(DecodeError::MalformedHeader(
                "header line too long".to_string(),
            ));
        }
        None => return Ok(None),
    };

    let line = &rest[..end];
    if line.first() != Some(&sigil) {
        return Err(DecodeError::MalformedHeader(format!(
            "expected '{}', got {:?}",
            sigil as char,
            String::from_utf8_lossy(line)
        )));
    }

    let value = std::str::from_utf8(&line[1..])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            DecodeError::MalformedHeader(format!(
                "invalid integer in {:?}",
                String::from_utf8_lossy(line)
            ))
        })?;

    Ok(Some((value, pos + end + CRLF.len())))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

/// How many bytes to drop after a framing error detected at `from`.
///
/// Bytes before `from` belong to arguments that were already read by their
/// length, so they are never searched. The search does start two bytes
/// early so that a request beginning exactly at `from` is kept.
///
/// Skips to the next line that starts with `*`. If there is none, drops
/// every complete line and keeps a trailing partial one; with no CRLF at
/// all the whole buffer is dropped. Always makes progress on a non-empty
/// buffer.
pub fn resync_offset(buf: &[u8], from: usize) -> usize {
    let start = from.min(buf.len()).saturating_sub(CRLF.len());
    let rest = &buf[start..];

    if let Some(pos) = rest.windows(3).position(|w| w == b"\r\n*") {
        return start + pos + CRLF.len();
    }
    match rest.windows(CRLF.len()).rposition(|w| w == CRLF) {
        Some(pos) => start + pos + CRLF.len(),
        None => buf.len(),
    }
}

/// Decodes the next request from `buf` with the default parser.
///
/// This is the entry point used by connection handlers.
pub fn decode_request(buf: &mut BytesMut) -> DecodeResult<Option<Request>> {
    RequestParser::new().decode(buf)
}

/// Checks a read buffer once the peer has closed its side.
///
/// Anything left over is a request that will never be completed.
pub fn finish_stream(buf: &[u8]) -> DecodeResult<()> {
    if buf.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::Truncated {
            buffered: buf.len(),
        })
    }
}
