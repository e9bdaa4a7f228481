//! Dispatch Consumer
//!
//! The single task that executes commands. It pulls messages off the shared
//! queue in arrival order, decodes and executes them, and writes the
//! replies to the connection each message came from.
//!
//! Because this task owns the [`CommandHandler`] (and through it the
//! store), every store access happens here and the store needs no lock.
//! The price is head-of-line blocking: a slow write to one client delays
//! every other client's commands.

use crate::commands::CommandHandler;
use crate::connection::{ConnectionError, ConnectionStats, ConnectionTable};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Raw bytes read from one connection, on their way to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Key of the originating connection
    pub from: SocketAddr,
    /// One or more whole frames
    pub payload: Bytes,
}

/// Consumes the dispatch queue and executes every command in it.
pub struct Dispatcher<W = OwnedWriteHalf> {
    queue: mpsc::Receiver<Message>,
    table: ConnectionTable<W>,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl<W> Dispatcher<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(
        queue: mpsc::Receiver<Message>,
        table: ConnectionTable<W>,
        handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            queue,
            table,
            handler,
            stats,
        }
    }

    /// Processes messages until every producer has gone away.
    ///
    /// Returns the handler so its store can be inspected after shutdown.
    pub async fn run(mut self) -> CommandHandler {
        info!("Dispatcher started");

        while let Some(message) = self.queue.recv().await {
            self.dispatch(message).await;
        }

        info!("Dispatch queue closed, dispatcher stopping");
        self.handler
    }

    /// Executes one message and writes its replies back.
    async fn dispatch(&mut self, message: Message) {
        let Message { from, payload } = message;
        trace!(client = %from, bytes = payload.len(), "Received message");

        let mut out = BytesMut::new();
        let outcome = self.handler.execute_payload(payload, &mut out);
        self.stats
            .commands_processed(outcome.executed, outcome.errors);

        if outcome.errors > 0 {
            debug!(client = %from, errors = outcome.errors, "Frames failed to decode");
        }

        if !out.is_empty() {
            match self.table.send(&from, &out).await {
                Ok(()) => {
                    self.stats.bytes_written(out.len());
                    trace!(client = %from, bytes = out.len(), "Sent reply");
                }
                Err(ConnectionError::NotConnected(_)) => {
                    debug!(client = %from, "Connection gone before reply, dropping it")
                }
                Err(e) => warn!(client = %from, error = %e, "Failed to write reply"),
            }
        }

        // The reader stopped at this frame and left closing to us, so the
        // error reply goes out before the socket does.
        if outcome.close && self.table.remove(&from) {
            info!(client = %from, "Closed connection after unrecoverable frame");
        }
    }
}
