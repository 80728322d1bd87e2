//! Connection Handler
//!
//! Each client gets its own handler task that runs in a loop, decoding
//! requests and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, handler task spawned
//!        │
//!        ▼
//! 2. ┌──────────────────────────────────┐
//!    │  Decode every buffered request   │
//!    │  Dispatch, write and flush reply │◄──┐
//!    │  Read more bytes from the socket │───┘
//!    └──────────────────────────────────┘
//!        │
//!        ▼
//! 3. Client closes its side / I/O error
//!        │
//!        ▼
//! 4. Handler task ends, nothing else is affected
//! ```
//!
//! ## Error Containment
//!
//! A request that cannot be decoded gets `-ERR invalid request` and the
//! loop carries on with the next one. A request larger than the decoder's
//! size limit gets the same reply and then the connection is closed, since
//! the rest of its payload would otherwise have to be buffered or guessed
//! at. Socket errors and end-of-stream also end the loop, and they only end
//! this connection.

use crate::commands::CommandHandler;
use crate::protocol::{finish_stream, DecodeError, Reply, RequestParser};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Requests that could not be decoded
    pub decode_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The client closed the stream in the middle of a request, or sent
    /// one too large to buffer
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),
}

/// Handles a single client connection.
///
/// Generic over the stream so it can run on a `TcpStream` or any other
/// duplex byte stream.
pub struct ConnectionHandler<S> {
    /// The client stream, writes buffered until each reply is flushed
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// Request decoder
    parser: RequestParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RequestParser::new(),
            stats,
        }
    }

    /// Runs the connection until the client disconnects or an I/O error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main decode-dispatch-reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(next) = self.next_reply() {
                match next {
                    Ok(reply) => self.send_reply(&reply).await?,
                    Err(e) => {
                        self.send_reply(&Reply::invalid_request()).await?;
                        return Err(e.into());
                    }
                }
            }

            if self.read_more_data().await? == 0 {
                return self.finish().await;
            }
        }
    }

    /// Decodes and executes the next buffered request.
    ///
    /// Returns `None` once the buffer holds no complete request, and an
    /// error when the connection must be closed after replying.
    fn next_reply(&mut self) -> Option<Result<Reply, DecodeError>> {
        match self.parser.decode(&mut self.buffer) {
            Ok(Some(request)) => {
                self.stats.command_processed();
                trace!(
                    client = %self.addr,
                    command = %request.command(),
                    remaining = self.buffer.len(),
                    "Decoded request"
                );
                Some(Ok(self.command_handler.dispatch(&request)))
            }
            Ok(None) => None,
            Err(e) => {
                self.stats.decode_error();
                warn!(client = %self.addr, error = %e, "Invalid request");
                if e.is_fatal() {
                    Some(Err(e))
                } else {
                    Some(Ok(Reply::invalid_request()))
                }
            }
        }
    }

    /// Handles end of stream: leftover bytes are a truncated request.
    async fn finish(&mut self) -> Result<(), ConnectionError> {
        if let Err(e) = finish_stream(&self.buffer) {
            self.stats.decode_error();
            // The peer may only have closed its write half
            self.send_reply(&Reply::invalid_request()).await?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// Returns the number of bytes read, zero meaning end of stream.
    async fn read_more_data(&mut self) -> Result<usize, ConnectionError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(n)
    }

    /// Writes and flushes a reply.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent reply"
        );
        Ok(())
    }
}

/// Handles a client connection.
///
/// Runs a [`ConnectionHandler`] to completion. Failures are logged and end
/// only this connection.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}
