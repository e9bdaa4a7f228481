//! Connection Management Module
//!
//! Every client connection is split in two. The read half goes to its own
//! `ConnectionReader` task; the write half goes into the shared
//! `ConnectionTable`, where the dispatcher finds it when a reply is ready.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server module)                          │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └──────┬──────────┬──────┘
//!        read half │          │ write half
//!                  ▼          ▼
//!   ┌──────────────────┐   ┌──────────────────┐
//!   │ ConnectionReader │   │ ConnectionTable  │◄──── Dispatcher
//!   │  (own task)      │   │  addr → writer   │      (lookup + write)
//!   └────────┬─────────┘   └──────────────────┘
//!            │ Message
//!            ▼
//!     bounded queue ──────────────────────────────────> Dispatcher
//! ```

pub mod handler;
pub mod table;

// Re-export commonly used types
pub use handler::{ConnectionError, ConnectionReader, ConnectionStats};
pub use table::{ConnectionTable, ConnectionWriter};
