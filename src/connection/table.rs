//! Connection Table
//!
//! Maps each connected peer to the write half of its socket. Connection
//! readers insert and remove entries; the dispatcher looks entries up to
//! route replies back to the connection a message came from.
//!
//! The map sits behind a `std::sync::RwLock`. The guard is only held to
//! clone an entry out, never across an `.await`; each writer has its own
//! async mutex so a slow socket does not block lookups.

use crate::connection::ConnectionError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

/// Shared handle to one connection's write side.
pub type ConnectionWriter<W> = Arc<Mutex<W>>;

/// Connection key → socket write half, shared by readers and the dispatcher.
#[derive(Debug)]
pub struct ConnectionTable<W = OwnedWriteHalf> {
    inner: Arc<RwLock<HashMap<SocketAddr, ConnectionWriter<W>>>>,
}

impl<W> Clone for ConnectionTable<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> Default for ConnectionTable<W> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<W> ConnectionTable<W> {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SocketAddr, ConnectionWriter<W>>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SocketAddr, ConnectionWriter<W>>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection. A stale entry under the same key is replaced.
    pub fn register(&self, key: SocketAddr, writer: W) {
        self.write().insert(key, Arc::new(Mutex::new(writer)));
    }

    /// Removes a connection, dropping the table's handle on its socket.
    ///
    /// Returns `true` if the key was present.
    pub fn remove(&self, key: &SocketAddr) -> bool {
        self.write().remove(key).is_some()
    }

    /// Returns the writer registered under `key`.
    pub fn get(&self, key: &SocketAddr) -> Option<ConnectionWriter<W>> {
        self.read().get(key).cloned()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl<W: AsyncWrite + Unpin> ConnectionTable<W> {
    /// Writes `bytes` to the connection registered under `key`.
    pub async fn send(&self, key: &SocketAddr, bytes: &[u8]) -> Result<(), ConnectionError> {
        let writer = self.get(key).ok_or(ConnectionError::NotConnected(*key))?;
        let mut writer = writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_and_remove() {
        let table: ConnectionTable<Vec<u8>> = ConnectionTable::new();
        assert!(table.is_empty());

        table.register(addr(1000), Vec::new());
        table.register(addr(1001), Vec::new());
        assert_eq!(table.len(), 2);
        assert!(table.get(&addr(1000)).is_some());

        assert!(table.remove(&addr(1000)));
        assert!(!table.remove(&addr(1000)));
        assert!(table.get(&addr(1000)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let table: ConnectionTable<Vec<u8>> = ConnectionTable::new();
        let other = table.clone();

        table.register(addr(2000), Vec::new());
        assert!(other.get(&addr(2000)).is_some());
    }

    #[tokio::test]
    async fn test_send_routes_to_registered_writer() {
        let table: ConnectionTable<Vec<u8>> = ConnectionTable::new();
        table.register(addr(3000), Vec::new());
        table.register(addr(3001), Vec::new());

        table.send(&addr(3000), b"+PONG\r\n").await.unwrap();

        let first = table.get(&addr(3000)).unwrap();
        let second = table.get(&addr(3001)).unwrap();
        assert_eq!(first.lock().await.as_slice(), b"+PONG\r\n");
        assert!(second.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_to_unknown_connection() {
        let table: ConnectionTable<Vec<u8>> = ConnectionTable::new();
        let result = table.send(&addr(4000), b"+OK\r\n").await;
        assert!(matches!(result, Err(ConnectionError::NotConnected(a)) if a == addr(4000)));
    }

    #[tokio::test]
    async fn test_send_io_error() {
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer gone",
            ))
            .build();
        let table = ConnectionTable::new();
        table.register(addr(5000), writer);

        let result = table.send(&addr(5000), b"+OK\r\n").await;
        assert!(matches!(result, Err(ConnectionError::IoError(_))));
    }
}
