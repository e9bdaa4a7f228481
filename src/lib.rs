//! # respkv - A Minimal RESP Key-Value Server
//!
//! respkv is an in-memory key-value server that speaks the RESP wire
//! protocol over TCP. It understands four commands (`PING`, `ECHO`, `SET`,
//! `GET`) and focuses on two things: decoding length-prefixed frames
//! exactly, and serving many connections through a single executor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              respkv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────┐                                │
//! │  │ TCP Server  │───>│ ConnectionReader │ (one task per client)          │
//! │  │ (Listener)  │    └────────┬─────────┘                                │
//! │  └──────┬──────┘             │ Message { from, payload }                │
//! │         │                    ▼                                          │
//! │         │           ┌──────────────────┐                                │
//! │         │           │  bounded queue   │                                │
//! │         │           └────────┬─────────┘                                │
//! │         │                    ▼                                          │
//! │         │           ┌──────────────────┐    ┌─────────────┐             │
//! │         │           │    Dispatcher    │───>│   Decoder   │             │
//! │         │           │  (single task)   │    └─────────────┘             │
//! │         │           │                  │    ┌─────────────┐             │
//! │         │           │                  │───>│CommandHandler──> Storage  │
//! │         │           └────────┬─────────┘    └─────────────┘             │
//! │         ▼                    ▼                                          │
//! │  ┌──────────────────────────────────┐                                   │
//! │  │ ConnectionTable (addr → writer)  │                                   │
//! │  └──────────────────────────────────┘                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use respkv::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let logger = tracing::Dispatch::new(tracing_subscriber::fmt().finish());
//!     let server = Server::bind(ServerConfig::default(), logger).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP decoder and reply encoding
//! - [`commands`]: Command model and executor
//! - [`storage`]: The in-memory store
//! - [`connection`]: Connection readers and the connection table
//! - [`server`]: Listener, dispatch queue and dispatcher
//! - [`config`]: Server settings
//!
//! ## Design Highlights
//!
//! ### Single Executor
//!
//! All commands run on one dispatcher task that owns the store. The store
//! is therefore a plain `HashMap` with no locking; per-connection ordering
//! follows from the FIFO queue.
//!
//! ### Frame-Level Error Recovery
//!
//! A malformed frame produces an `-ERR` reply and decoding continues with
//! the next frame. The connection stays open.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandHandler};
pub use config::ServerConfig;
pub use connection::{ConnectionError, ConnectionStats, ConnectionTable};
pub use protocol::{DecodeError, Decoder, Reply};
pub use server::{Server, ServerError};
pub use storage::StorageEngine;

/// The default port respkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host respkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of respkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
