//! Server configuration.

use crate::protocol::MAX_BULK_SIZE;
use crate::{DEFAULT_HOST, DEFAULT_PORT};

/// Default capacity of the queue between connection readers and the dispatcher.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Initial capacity of each connection's read buffer (4 KB)
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Largest partial frame a reader buffers before dropping the connection:
/// one maximum-size bulk string plus 64 KB for the rest of its command
pub const DEFAULT_MAX_FRAME_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Settings for a [`Server`](crate::server::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,
    /// Bound of the shared message queue; readers wait when it is full
    pub queue_capacity: usize,
    /// Initial read buffer capacity per connection
    pub read_buffer_size: usize,
    /// Buffered bytes of a partial frame after which the connection is dropped
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
