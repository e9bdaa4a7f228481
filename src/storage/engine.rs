//! In-Memory Storage Engine
//!
//! A plain `HashMap` from key to value. There is exactly one engine per
//! server and it is owned by the dispatch consumer, so every access goes
//! through `&self`/`&mut self` on that single task and no lock is needed.
//!
//! ## Concurrency Model
//!
//! ```text
//!  reader ─┐
//!  reader ─┼──> queue ──> Dispatcher ──owns──> CommandHandler ──owns──> StorageEngine
//!  reader ─┘
//! ```
//!
//! Running commands from more than one task would need the engine behind a
//! `Mutex` or a sharded lock.

use bytes::Bytes;
use std::collections::HashMap;

/// The key-value store.
///
/// # Example
///
/// ```
/// use respkv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let mut engine = StorageEngine::new();
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
/// assert_eq!(engine.get(b"missing"), None);
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    data: HashMap<Bytes, Bytes>,
}

impl StorageEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key, overwriting any previous value.
    ///
    /// Returns `true` if a new key was created.
    pub fn set(&mut self, key: Bytes, value: Bytes) -> bool {
        self.data.insert(key, value).is_none()
    }

    /// Gets the value of a key.
    ///
    /// The returned `Bytes` shares memory with the stored value.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.data.get(key).cloned()
    }

    /// Number of keys stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
