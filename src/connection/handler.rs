//! Connection Handler Module
//!
//! This module handles individual client connections. Each client gets its
//! own handler task that runs in a loop, reading commands and sending
//! responses.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!              bytes arrive
//!   ┌──────┐  complete frame   ┌─────────────┐
//!   │ Idle │ ────────────────> │ Dispatching │
//!   │      │ <──────────────── │             │
//!   └──┬───┘   reply written   └─────────────┘
//!      │
//!      │ EOF / I/O error / buffer limit
//!      ▼
//!   ┌────────┐
//!   │ Closed │
//!   └────────┘
//! ```
//!
//! A frame that fails to decode is answered with an error reply, the
//! buffered bytes are discarded, and the connection returns to `Idle`.
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. TCP is a stream
//! protocol: a read may deliver part of a frame, or several frames at once
//! (pipelining). Frames are decoded and answered strictly in arrival order.

use super::ClientInfo;
use crate::commands::CommandHandler;
use crate::protocol::{RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Default limit for the read buffer (512 MiB bulk plus framing)
const DEFAULT_MAX_BUFFER_SIZE: usize = 512 * 1024 * 1024 + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Sent in place of a reply that could not be encoded.
const ENCODE_FAILURE_REPLY: &[u8] = b"-ERR internal error encoding reply\r\n";

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Frames rejected by the decoder
    pub protocol_errors: AtomicU64,
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

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for (more of) the next frame
    Idle,
    /// A complete frame is being executed and answered
    Dispatching,
    /// The loop has ended; no further frames are processed
    Closed,
}

/// Handles a single client connection.
///
/// Generic over the stream so that tests can drive it through an in-memory
/// pipe instead of a socket.
pub struct ConnectionHandler<S> {
    /// The stream for this connection
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Largest amount of unconsumed input we are willing to hold
    max_buffer_size: usize,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// RESP parser
    parser: RespParser,

    /// Identity and metadata of this client
    client: ClientInfo,

    state: ConnectionState,

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
    /// * `stream` - The byte stream for this connection
    /// * `addr` - The client's socket address
    /// * `client` - Identity of this connection
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        client: ClientInfo,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            command_handler,
            parser: RespParser::new(),
            client,
            state: ConnectionState::Idle,
            stats,
        }
    }

    /// Overrides the read buffer limit.
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    /// Runs the main connection loop.
    ///
    /// Reads commands from the client, executes them, and sends back
    /// responses until the client disconnects or an error occurs. A clean
    /// disconnect between frames returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        self.stats.connection_opened();
        info!(client = %self.addr, conn_id = self.client.id(), "Client connected");

        let result = match self.main_loop().await {
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected");
                Ok(())
            }
            Err(ConnectionError::IoError(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "Connection reset by client");
                Err(ConnectionError::IoError(e))
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Connection error");
                Err(e)
            }
            Ok(()) => Ok(()),
        };

        self.state = ConnectionState::Closed;
        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            match self.parser.parse(&self.buffer) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.advance(consumed);
                    trace!(
                        client = %self.addr,
                        consumed = consumed,
                        remaining = self.buffer.len(),
                        "Parsed command"
                    );
                    self.dispatch(frame).await?;
                }
                Ok(None) => {
                    // Incomplete data - need to read more
                    self.read_more_data().await?;
                }
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Protocol error, discarding buffered input");
                    self.stats.protocol_error();
                    self.buffer.clear();
                    let reply =
                        RespValue::error_lossy(format!("ERR Protocol error: {}", e));
                    self.send_response(&reply).await?;
                }
            }
        }
    }

    /// Executes one frame and writes its reply.
    async fn dispatch(&mut self, frame: RespValue) -> Result<(), ConnectionError> {
        self.state = ConnectionState::Dispatching;

        let response = self.command_handler.execute(frame, &mut self.client);
        self.stats.command_processed();
        self.send_response(&response).await?;

        self.state = ConnectionState::Idle;
        Ok(())
    }

    /// Reads more data from the stream into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Check buffer size limit
        if self.buffer.len() >= self.max_buffer_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                limit = self.max_buffer_size,
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial command in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = match response.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(client = %self.addr, error = %e, "Failed to encode reply");
                ENCODE_FAILURE_REPLY.to_vec()
            }
        };

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}
