//! Command Handler
//!
//! Maps a decoded [`Request`] onto the store and builds the reply.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - `+PONG`, or the message as a bulk string
//! - `ECHO message` - The message as a bulk string
//! - `SET key value [XP milliseconds]` - Store a value, optionally expiring
//! - `GET key` - The stored value, or a null bulk string
//!
//! Argument errors never touch the store: a rejected `SET` leaves any
//! previous value and deadline in place.

use crate::protocol::{Command, Reply, Request};
use crate::storage::clock::{self, EpochMillis, NO_EXPIRY};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// The `SET` option introducing a time-to-live in milliseconds.
const TTL_OPTION: &[u8] = b"XP";

/// Why a request was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Too few or too many arguments; holds the lowercase command name
    #[error("wrong number of arguments for '{0}' command")]
    Arity(&'static str),

    /// An argument has the wrong shape or value
    #[error("{0}")]
    InvalidArgument(String),
}

pub type DispatchResult = Result<Reply, DispatchError>;

/// Executes requests against a shared [`StorageEngine`].
///
/// Holds no per-connection state, so one handler can be cloned into every
/// connection task.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a request and returns the reply to send.
    ///
    /// Rejected requests become `-ERR <message>` replies.
    pub fn dispatch(&self, request: &Request) -> Reply {
        match self.execute(request) {
            Ok(reply) => {
                trace!(command = %request.command(), reply = %reply, "Command executed");
                reply
            }
            Err(e) => {
                debug!(command = %request.command(), error = %e, "Command rejected");
                Reply::error(e.to_string())
            }
        }
    }

    /// Executes a request, keeping the rejection reason typed.
    pub fn execute(&self, request: &Request) -> DispatchResult {
        let args = request.params();

        match request.command() {
            Command::Ping => self.cmd_ping(args),
            Command::Echo => self.cmd_echo(args),
            Command::Set => self.cmd_set(args),
            Command::Get => self.cmd_get(args),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> DispatchResult {
        match args {
            [] => Ok(Reply::pong()),
            [message] => Ok(Reply::bulk(message.clone())),
            _ => Err(DispatchError::Arity("ping")),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> DispatchResult {
        match args {
            [message] => Ok(Reply::bulk(message.clone())),
            _ => Err(DispatchError::Arity("echo")),
        }
    }

    /// SET key value [XP milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> DispatchResult {
        let (key, value, options) = match args {
            [key, value, options @ ..] => (key, value, options),
            _ => return Err(DispatchError::Arity("set")),
        };

        let deadline = parse_set_options(options)?;
        self.storage.set(key.clone(), value.clone(), deadline);

        Ok(Reply::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> DispatchResult {
        let [key] = args else {
            return Err(DispatchError::Arity("get"));
        };

        Ok(match self.storage.get(key) {
            Some(value) => Reply::bulk(value),
            None => Reply::null(),
        })
    }
}

/// Parses the options following `SET key value` into a deadline.
///
/// The only option is `XP <ttl-ms>` (case-insensitive), given at most once.
fn parse_set_options(options: &[Bytes]) -> Result<EpochMillis, DispatchError> {
    let mut ttl_ms = None;
    let mut i = 0;

    while i < options.len() {
        if !options[i].eq_ignore_ascii_case(TTL_OPTION) {
            return Err(DispatchError::InvalidArgument(format!(
                "unsupported option '{}'",
                String::from_utf8_lossy(&options[i])
            )));
        }
        if ttl_ms.is_some() {
            return Err(syntax_error());
        }

        let raw = options.get(i + 1).ok_or_else(syntax_error)?;
        ttl_ms = Some(parse_ttl(raw)?);
        i += 2;
    }

    Ok(ttl_ms.map_or(NO_EXPIRY, clock::deadline_after))
}

/// Parses a strictly positive millisecond count.
fn parse_ttl(raw: &[u8]) -> Result<u64, DispatchError> {
    let ttl: i64 = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            DispatchError::InvalidArgument("value is not an integer or out of range".to_string())
        })?;

    if ttl <= 0 {
        return Err(DispatchError::InvalidArgument(
            "invalid expire time in 'set' command".to_string(),
        ));
    }

    Ok(ttl as u64)
}

fn syntax_error() -> DispatchError {
    DispatchError::InvalidArgument("syntax error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage)
    }

    fn make_request(args: &[&str]) -> Request {
        Request::from_args(args.iter().map(|s| Bytes::from(s.to_string())).collect())
            .expect("supported command")
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        let response = handler.dispatch(&make_request(&["PING"]));
        assert_eq!(response, Reply::pong());

        let response = handler.dispatch(&make_request(&["ping", "hello"]));
        assert_eq!(response, Reply::bulk(Bytes::from("hello")));

        assert_eq!(
            handler.execute(&make_request(&["PING", "a", "b"])),
            Err(DispatchError::Arity("ping"))
        );
    }

    #[test]
    fn test_echo() {
        let handler = create_handler();

        let response = handler.dispatch(&make_request(&["ECHO", "hey"]));
        assert_eq!(response, Reply::bulk(Bytes::from("hey")));

        assert_eq!(
            handler.execute(&make_request(&["ECHO"])),
            Err(DispatchError::Arity("echo"))
        );
        assert_eq!(
            handler.execute(&make_request(&["ECHO", "a", "b"])),
            Err(DispatchError::Arity("echo"))
        );
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.dispatch(&make_request(&["SET", "key", "value"]));
        assert_eq!(response, Reply::ok());

        let response = handler.dispatch(&make_request(&["GET", "key"]));
        assert_eq!(response, Reply::bulk(Bytes::from("value")));
    }

    #[test]
    fn test_set_get_binary() {
        let handler = create_handler();
        let value = Bytes::from_static(b"\x00\xff\r\n\xc3\x28");

        let set = Request::from_args(vec![Bytes::from("SET"), Bytes::from("bin"), value.clone()])
            .unwrap();
        assert_eq!(handler.dispatch(&set), Reply::ok());

        let response = handler.dispatch(&make_request(&["GET", "bin"]));
        assert_eq!(response.as_bytes(), Some(&value[..]));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.dispatch(&make_request(&["GET", "nonexistent"]));
        assert_eq!(response, Reply::null());
    }

    #[test]
    fn test_overwrite() {
        let handler = create_handler();

        handler.dispatch(&make_request(&["SET", "k", "v1-much-longer"]));
        handler.dispatch(&make_request(&["SET", "k", "v2"]));

        let response = handler.dispatch(&make_request(&["GET", "k"]));
        assert_eq!(response, Reply::bulk(Bytes::from("v2")));
    }

    #[test]
    fn test_arity_errors() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(&make_request(&["SET", "key"])),
            Err(DispatchError::Arity("set"))
        );
        assert_eq!(
            handler.execute(&make_request(&["SET"])),
            Err(DispatchError::Arity("set"))
        );
        assert_eq!(
            handler.execute(&make_request(&["GET"])),
            Err(DispatchError::Arity("get"))
        );
        assert_eq!(
            handler.execute(&make_request(&["GET", "a", "b"])),
            Err(DispatchError::Arity("get"))
        );
    }

    #[test]
    fn test_errors_become_replies() {
        let handler = create_handler();

        let response = handler.dispatch(&make_request(&["GET"]));
        assert_eq!(
            response.serialize(),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );

        let response = handler.dispatch(&make_request(&["SET", "k", "v", "XP", "soon"]));
        assert_eq!(
            response.serialize(),
            b"-ERR value is not an integer or out of range\r\n"
        );

        // A client-supplied token echoed in an error cannot split the line
        let response = handler.dispatch(&make_request(&["SET", "k", "v", "EX\r\n+OK"]));
        assert_eq!(
            response.serialize(),
            b"-ERR unsupported option 'EX  +OK'\r\n"
        );
    }

    #[test]
    fn test_set_with_ttl() {
        let handler = create_handler();

        let response = handler.dispatch(&make_request(&["SET", "key", "value", "XP", "50"]));
        assert_eq!(response, Reply::ok());

        let response = handler.dispatch(&make_request(&["GET", "key"]));
        assert_eq!(response, Reply::bulk(Bytes::from("value")));

        std::thread::sleep(Duration::from_millis(80));

        let response = handler.dispatch(&make_request(&["GET", "key"]));
        assert_eq!(response, Reply::null());
    }

    #[test]
    fn test_set_with_long_ttl() {
        let handler = create_handler();

        handler.dispatch(&make_request(&["SET", "key", "value", "xp", "100000"]));

        let response = handler.dispatch(&make_request(&["GET", "key"]));
        assert_eq!(response, Reply::bulk(Bytes::from("value")));
    }

    #[test]
    fn test_set_sets_deadline() {
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage));

        let before = clock::now_millis();
        handler.dispatch(&make_request(&["SET", "a", "1", "XP", "5000"]));
        handler.dispatch(&make_request(&["SET", "b", "1"]));

        let deadline = storage.get_entry(&Bytes::from("a")).unwrap().deadline;
        assert!(deadline >= before + 5000);
        assert_eq!(
            storage.get_entry(&Bytes::from("b")).unwrap().deadline,
            NO_EXPIRY
        );
    }

    #[test]
    fn test_set_invalid_options() {
        let handler = create_handler();

        let cases: &[&[&str]] = &[
            &["SET", "k", "v", "XP"],
            &["SET", "k", "v", "XP", "abc"],
            &["SET", "k", "v", "XP", "1.5"],
            &["SET", "k", "v", "XP", "0"],
            &["SET", "k", "v", "XP", "-10"],
            &["SET", "k", "v", "EX", "10"],
            &["SET", "k", "v", "NX"],
            &["SET", "k", "v", "XP", "10", "XP", "20"],
            &["SET", "k", "v", "XP", "10", "extra"],
        ];

        for args in cases {
            let result = handler.execute(&make_request(args));
            assert!(
                matches!(result, Err(DispatchError::InvalidArgument(_))),
                "{:?} should be rejected, got {:?}",
                args,
                result
            );
        }
    }

    #[test]
    fn test_rejected_set_leaves_store_untouched() {
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage));

        handler.dispatch(&make_request(&["SET", "k", "original"]));
        let response = handler.dispatch(&make_request(&["SET", "k", "new", "XP", "nope"]));
        assert!(response.is_error());

        let response = handler.dispatch(&make_request(&["SET", "fresh", "v", "BOGUS"]));
        assert!(response.is_error());

        assert_eq!(
            storage.get(&Bytes::from("k")),
            Some(Bytes::from("original"))
        );
        assert_eq!(storage.get(&Bytes::from("fresh")), None);
        assert_eq!(storage.stats().set_ops, 1);
    }
}
