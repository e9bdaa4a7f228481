//! TCP Server
//!
//! Ties the pieces together: the listener, one reader task per connection,
//! the shared bounded queue and the single dispatcher.
//!
//! ```text
//!  socket ──> ConnectionReader ──┐
//!  socket ──> ConnectionReader ──┼──> mpsc (bounded) ──> Dispatcher ──> ConnectionTable ──> socket
//!  socket ──> ConnectionReader ──┘                          │
//!                                                    CommandHandler
//!                                                           │
//!                                                     StorageEngine
//! ```
//!
//! Logging goes through the `tracing::Dispatch` handed to [`Server::bind`].
//! Every task the server spawns runs under it, so no process-wide
//! subscriber has to be installed.

pub mod dispatch;

pub use dispatch::{Dispatcher, Message};

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{ConnectionReader, ConnectionStats, ConnectionTable};
use crate::storage::StorageEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, Dispatch};

/// Pause before accepting again after a failed accept, so a persistent
/// error such as running out of file descriptors does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on the listener
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bound, not yet running server.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    table: ConnectionTable,
    stats: Arc<ConnectionStats>,
    logger: Dispatch,
}

impl Server {
    /// Binds the listening socket described by `config`.
    ///
    /// `logger` receives every log event emitted by the server's tasks;
    /// pass `Dispatch::none()` to silence them.
    pub async fn bind(config: ServerConfig, logger: Dispatch) -> Result<Self, ServerError> {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            config,
            table: ConnectionTable::new(),
            stats: Arc::new(ConnectionStats::new()),
            logger,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle on the live connection table.
    pub fn connections(&self) -> ConnectionTable {
        self.table.clone()
    }

    /// Shared server statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Starts the dispatcher and accepts connections until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        let logger = self.logger.clone();
        self.serve().with_subscriber(logger).await
    }

    async fn serve(self) -> Result<(), ServerError> {
        let (queue, receiver) = mpsc::channel(self.config.queue_capacity.max(1));

        let dispatcher = Dispatcher::new(
            receiver,
            self.table.clone(),
            CommandHandler::new(StorageEngine::new()),
            Arc::clone(&self.stats),
        );
        tokio::spawn(dispatcher.run().with_subscriber(self.logger.clone()));

        let local_addr = self.local_addr()?;
        info!(
            addr = %local_addr,
            queue_capacity = self.config.queue_capacity,
            "Listening"
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => self.spawn_reader(stream, addr, queue.clone()),
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Registers the connection's write half and spawns its reader.
    fn spawn_reader(&self, stream: TcpStream, addr: SocketAddr, queue: mpsc::Sender<Message>) {
        let (read_half, write_half) = stream.into_split();
        self.table.register(addr, write_half);

        let reader = ConnectionReader::new(
            read_half,
            addr,
            queue,
            self.table.clone(),
            Arc::clone(&self.stats),
            &self.config,
        );

        tokio::spawn(
            async move {
                // The reader logs its own termination reason.
                let _ = reader.run().await;
            }
            .with_subscriber(self.logger.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::Ordering;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn create_test_server() -> (SocketAddr, ConnectionTable, Arc<ConnectionStats>) {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::bind(config, Dispatch::none()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let table = server.connections();
        let stats = server.stats();

        tokio::spawn(server.run());

        (addr, table, stats)
    }

    /// Reads exactly `len` bytes, failing after two seconds.
    async fn read_reply(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        buf
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();

        assert_eq!(read_reply(&mut client, 7).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, 5).await, b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, 9).await, b"$3\r\nbar\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, 5).await, b"$-1\r\n");
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk2\r\n")
            .await
            .unwrap();

        let expected = b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n";
        assert_eq!(read_reply(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn test_frame_split_across_writes() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.set_nodelay(true).unwrap();
        client.write_all(b"*2\r\n$4\r\nECHO\r\n$5\r\nhe").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.write_all(b"llo\r\n").await.unwrap();

        assert_eq!(read_reply(&mut client, 11).await, b"$5\r\nhello\r\n");
    }

    #[tokio::test]
    async fn test_malformed_length_keeps_connection_open() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"*1\r\n$x\r\nPING\r\n").await.unwrap();

        let expected = b"-ERR malformed length 'x'\r\n";
        assert_eq!(read_reply(&mut client, expected.len()).await, expected);

        client
            .write_all(b"*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, 9).await, b"$3\r\nhey\r\n");
    }

    #[tokio::test]
    async fn test_large_value_over_many_reads() {
        let (addr, _, _) = create_test_server().await;

        let value = Bytes::from(vec![b'x'; 100_000]);
        let set = crate::commands::Command::Set {
            key: Bytes::from_static(b"big"),
            value: value.clone(),
        };
        let get = crate::commands::Command::Get {
            key: Bytes::from_static(b"big"),
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&set.encode()).await.unwrap();
        assert_eq!(read_reply(&mut client, 5).await, b"+OK\r\n");

        client.write_all(&get.encode()).await.unwrap();
        let mut expected = b"$100000\r\n".to_vec();
        expected.extend_from_slice(&value);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(read_reply(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn test_short_array_then_valid_frame() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n*1\r\n$4\r\nPING\r\n")
            .await
            .unwrap();

        let expected = b"-ERR unexpected byte '*', expected '$'\r\n+PONG\r\n";
        assert_eq!(read_reply(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn test_oversized_bulk_closes_connection() {
        let (addr, table, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$600000000\r\n")
            .await
            .unwrap();

        let mut reply = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut reply))
            .await
            .expect("connection was not closed")
            .unwrap();
        assert_eq!(
            reply,
            b"-ERR message too large: 600000000 bytes (max: 536870912)\r\n"
        );
        wait_for(|| table.is_empty()).await;
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"*1\r\n$4\r\nINCR\r\n").await.unwrap();

        let expected = b"-ERR unknown command 'INCR'\r\n";
        assert_eq!(read_reply(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn test_concurrent_clients_see_own_writes() {
        let (addr, _, _) = create_test_server().await;

        let mut tasks = Vec::new();
        for i in 0..16 {
            tasks.push(tokio::spawn(async move {
                let mut client = TcpStream::connect(addr).await.unwrap();
                for round in 0..20 {
                    let key = format!("client:{}", i);
                    let value = format!("value:{}:{}", i, round);
                    let set = crate::commands::Command::Set {
                        key: Bytes::from(key.clone()),
                        value: Bytes::from(value.clone()),
                    };
                    let get = crate::commands::Command::Get {
                        key: Bytes::from(key),
                    };

                    client.write_all(&set.encode()).await.unwrap();
                    assert_eq!(read_reply(&mut client, 5).await, b"+OK\r\n");

                    client.write_all(&get.encode()).await.unwrap();
                    let expected = format!("${}\r\n{}\r\n", value.len(), value);
                    assert_eq!(
                        read_reply(&mut client, expected.len()).await,
                        expected.as_bytes()
                    );
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_disconnect_removes_connection() {
        let (addr, table, stats) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client, 7).await, b"+PONG\r\n");

        assert_eq!(table.len(), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        drop(client);

        wait_for(|| table.is_empty()).await;
        wait_for(|| stats.active_connections.load(Ordering::Relaxed) == 0).await;
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_bind_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = ServerConfig {
            port,
            ..ServerConfig::default()
        };
        let result = Server::bind(config, Dispatch::none()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }
}
