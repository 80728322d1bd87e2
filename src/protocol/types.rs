//! Reply Types
//!
//! The server only ever answers with four RESP shapes:
//!
//! - `+<text>\r\n` simple status (`+OK`, `+PONG`)
//! - `$<len>\r\n<bytes>\r\n` bulk string
//! - `$-1\r\n` null bulk string
//! - `-ERR <text>\r\n` error
//!
//! Encoding is total: every `Reply` has exactly one wire form.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// Prefix written in front of every error message.
const ERROR_KIND: &[u8] = b"ERR ";

/// A reply sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status line. CR and LF in the text are written as spaces.
    /// Format: `+<text>\r\n`
    Status(String),

    /// Binary-safe bulk string.
    /// Format: `$<length>\r\n<data>\r\n`
    Bulk(Bytes),

    /// Null bulk string, used for missing keys.
    /// Format: `$-1\r\n`
    Null,

    /// Error message, without the leading `ERR `. CR and LF in the
    /// message are written as spaces.
    /// Format: `-ERR <message>\r\n`
    Error(String),
}

impl Reply {
    /// Creates a new error reply.
    ///
    /// # Example
    /// ```
    /// use emberkv::protocol::types::Reply;
    /// let err = Reply::error("syntax error");
    /// assert_eq!(err.serialize(), b"-ERR syntax error\r\n");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Creates a new bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Creates a null bulk reply.
    pub fn null() -> Self {
        Reply::Null
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Common response for PING
    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    /// The reply for any request that could not be decoded.
    pub fn invalid_request() -> Self {
        Reply::Error("invalid request".to_string())
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                buf.push(prefix::STATUS);
                write_line(buf, s);
            }
            Reply::Bulk(data) => {
                buf.reserve(data.len() + 16);
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Reply::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(ERROR_KIND);
                write_line(buf, s);
            }
        }
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Returns the payload of a bulk reply.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(b) => Some(b),
            _ => None,
        }
    }
}

/// Writes `text` and the terminator, keeping the line a single line.
fn write_line(buf: &mut Vec<u8>, text: &str) {
    buf.extend(text.bytes().map(|b| match b {
        b'\r' | b'\n' => b' ',
        b => b,
    }));
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Bulk(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            Reply::Null => write!(f, "(nil)"),
            Reply::Error(s) => write!(f, "(error) ERR {}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialize() {
        assert_eq!(Reply::ok().serialize(), b"+OK\r\n");
        assert_eq!(Reply::pong().serialize(), b"+PONG\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = Reply::error("wrong number of arguments for 'get' command");
        assert_eq!(
            value.serialize(),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );
        assert_eq!(
            Reply::invalid_request().serialize(),
            b"-ERR invalid request\r\n"
        );
    }

    #[test]
    fn test_line_replies_stay_on_one_line() {
        assert_eq!(
            Reply::error("unsupported option 'a\r\n+OK'").serialize(),
            b"-ERR unsupported option 'a  +OK'\r\n"
        );
        assert_eq!(
            Reply::Status("multi\nline".to_string()).serialize(),
            b"+multi line\r\n"
        );
    }

    #[test]
    fn test_bulk_serialize() {
        let value = Reply::bulk(Bytes::from("hello"));
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_empty_bulk_serialize() {
        assert_eq!(Reply::bulk(Bytes::new()).serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_binary_bulk_serialize() {
        // Length counts raw bytes, CRLF inside the payload included
        let value = Reply::bulk(Bytes::from_static(b"a\r\n\xff"));
        assert_eq!(value.serialize(), b"$4\r\na\r\n\xff\r\n");
    }

    #[test]
    fn test_null_serialize() {
        assert_eq!(Reply::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_serialize_into_appends() {
        let mut buf = Vec::new();
        Reply::ok().serialize_into(&mut buf);
        Reply::null().serialize_into(&mut buf);
        assert_eq!(buf, b"+OK\r\n$-1\r\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(Reply::null().to_string(), "(nil)");
        assert_eq!(Reply::bulk(Bytes::from("v")).to_string(), "\"v\"");
        assert_eq!(
            Reply::bulk(Bytes::from_static(b"\xff\xfe")).to_string(),
            "(binary data, 2 bytes)"
        );
    }
}
