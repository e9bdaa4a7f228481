//! Storage Module
//!
//! The in-memory key-value store. Values never expire and there is no
//! capacity bound; expiry or eviction would hook in here.

pub mod engine;

pub use engine::StorageEngine;
