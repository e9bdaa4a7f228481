//! Connection Reader Module
//!
//! Each accepted client gets its own reader task. The reader owns the read
//! half of the socket; it never parses commands or writes replies itself.
//! It only cuts the incoming byte stream at frame boundaries and forwards
//! the pieces to the dispatcher.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, write half registered in the ConnectionTable
//!        │
//!        ▼
//! 2. ConnectionReader spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Split off whole frames  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Push Message to queue   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / read error
//!        │
//!        ▼
//! 5. Entry removed from the table, socket closed
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol: one read can hold half a command or several
//! commands. The reader accumulates bytes in a `BytesMut` and only forwards
//! the prefix made of whole frames, so the decoder never sees a frame cut in
//! two. Large values simply take several reads to complete.
//!
//! Two limits end a connection instead:
//!
//! - A bulk string that declares more than [`MAX_BULK_SIZE`] bytes. The
//!   frames before it and its header are forwarded, the dispatcher replies
//!   with one error and then closes the connection.
//! - A partial frame that fills `max_frame_size` bytes of buffer. The
//!   connection is dropped right away.
//!
//! [`MAX_BULK_SIZE`]: crate::protocol::MAX_BULK_SIZE

use crate::config::ServerConfig;
use crate::connection::ConnectionTable;
use crate::protocol::frame_boundary;
use crate::server::Message;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Server-wide connection and dispatch counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Messages pushed onto the dispatch queue
    pub messages_queued: AtomicU64,
    /// Commands executed by the dispatcher
    pub commands_processed: AtomicU64,
    /// Frames that failed to decode
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

    pub fn message_queued(&self) {
        self.messages_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn commands_processed(&self, executed: usize, errors: usize) {
        self.commands_processed
            .fetch_add(executed as u64, Ordering::Relaxed);
        self.decode_errors.fetch_add(errors as u64, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Reads one client's socket and feeds its frames to the dispatcher.
pub struct ConnectionReader<R, W> {
    /// Read half of the client socket
    reader: R,

    /// Client's address, also its key in the connection table
    addr: SocketAddr,

    /// Bytes read but not yet forwarded
    buffer: BytesMut,

    /// Producer side of the shared dispatch queue
    queue: mpsc::Sender<Message>,

    /// Table this connection is registered in
    table: ConnectionTable<W>,

    stats: Arc<ConnectionStats>,

    read_buffer_size: usize,
    max_frame_size: usize,
}

impl<R, W> ConnectionReader<R, W>
where
    R: AsyncRead + Unpin,
{
    /// Creates a reader for a connection whose write half is already in `table`.
    pub fn new(
        reader: R,
        addr: SocketAddr,
        queue: mpsc::Sender<Message>,
        table: ConnectionTable<W>,
        stats: Arc<ConnectionStats>,
        config: &ServerConfig,
    ) -> Self {
        stats.connection_opened();

        Self {
            reader,
            addr,
            buffer: BytesMut::with_capacity(config.read_buffer_size),
            queue,
            table,
            stats,
            read_buffer_size: config.read_buffer_size.max(1),
            max_frame_size: config.max_frame_size,
        }
    }

    /// Runs the read loop until the client goes away.
    ///
    /// Unless the loop stopped at an oversized frame, the connection's table
    /// entry is removed before returning, which closes the socket. For an
    /// oversized frame the dispatcher removes it once the error reply is out.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        if !matches!(result, Err(ConnectionError::FrameTooLarge)) {
            self.table.remove(&self.addr);
        }
        self.stats.connection_closed();
        result
    }

    /// The read-forward loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.read_more_data().await?;
            self.forward_frames().await?;
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Only a partial frame is ever left in the buffer here
        if self.buffer.len() >= self.max_frame_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < self.read_buffer_size / 4 {
            self.buffer.reserve(self.read_buffer_size);
        }

        let n = self.reader.read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Pushes every whole frame in the buffer onto the dispatch queue as
    /// a single message.
    async fn forward_frames(&mut self) -> Result<(), ConnectionError> {
        let boundary = frame_boundary(&self.buffer);

        if boundary.len == 0 {
            trace!(
                client = %self.addr,
                buffered = self.buffer.len(),
                "Incomplete frame, need more data"
            );
            return Ok(());
        }

        let payload = self.buffer.split_to(boundary.len).freeze();
        trace!(
            client = %self.addr,
            bytes = payload.len(),
            remaining = self.buffer.len(),
            "Queueing message"
        );

        self.queue
            .send(Message {
                from: self.addr,
                payload,
            })
            .await
            .map_err(|_| ConnectionError::QueueClosed)?;
        self.stats.message_queued();

        if boundary.oversized {
            return Err(ConnectionError::FrameTooLarge);
        }

        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial frame)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// No connection is registered under this key
    #[error("Connection {0} is not registered")]
    NotConnected(SocketAddr),

    /// The dispatcher stopped accepting messages
    #[error("Dispatch queue closed")]
    QueueClosed,

    /// A partial frame filled the buffer size limit
    #[error("Buffer size limit exceeded")]
    BufferFull,

    /// A frame declared a bulk string larger than the decoder accepts
    #[error("Frame too large")]
    FrameTooLarge,
}
