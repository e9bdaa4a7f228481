//! RESP Protocol Implementation
//!
//! This module implements the subset of the Redis Serialization Protocol
//! (RESP) the server needs: requests arrive as arrays of bulk strings and
//! replies go out as simple strings, bulk strings, null bulk strings or
//! errors.
//!
//! ## Modules
//!
//! - `types`: Defines the `Reply` enum and its wire encoding
//! - `decoder`: Cursor-based decoder from raw bytes to commands
//!
//! ## Example
//!
//! ```
//! use respkv::protocol::{Decoder, Reply};
//! use bytes::Bytes;
//!
//! // Decoding incoming data
//! let payload = Bytes::from_static(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//! let command = Decoder::new(payload).next().unwrap().unwrap();
//! assert_eq!(command.name(), "GET");
//!
//! // Creating replies
//! let reply = Reply::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod decoder;
pub mod types;

// Re-export commonly used types for convenience
pub use decoder::{decode, frame_boundary, DecodeError, Decoder, FrameBoundary, MAX_BULK_SIZE};
pub use types::Reply;
