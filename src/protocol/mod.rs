//! RESP Protocol Codec
//!
//! Decodes client requests (arrays of bulk strings) off a byte stream and
//! serializes replies. Nothing in here knows about the store.
//!
//! ## Modules
//!
//! - `types`: The `Reply` enum and its wire encoding
//! - `parser`: Length-prefixed request decoder
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{decode_request, Command, Reply};
//! use bytes::{Bytes, BytesMut};
//!
//! let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
//! let request = decode_request(&mut buf).unwrap().unwrap();
//! assert_eq!(request.command(), Command::Get);
//! assert!(buf.is_empty());
//!
//! let reply = Reply::bulk(Bytes::from("Alba"));
//! assert_eq!(reply.serialize(), b"$4\r\nAlba\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{
    decode_request, finish_stream, Command, DecodeError, DecodeResult, Request, RequestParser,
};
pub use types::Reply;
