//! RESP (Redis Serialization Protocol) Reply Types
//!
//! This module defines the replies the server writes back to clients.
//! Only the shapes needed by PING, ECHO, SET and GET are modelled.
//!
//! ## Protocol Format
//!
//! Each RESP type starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `$` Bulk String
//! - `*` Array (requests only)
//!
//! All types are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command 'foo'\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Null Bulk String: `$-1\r\n`

use bytes::{BufMut, Bytes, BytesMut};

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply produced by executing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Non-binary-safe status line.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Binary-safe string.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Null bulk string, the reply for a missing key.
    /// Format: `$-1\r\n`
    Null,

    /// Error line. The message carries its own `ERR` prefix.
    /// Format: `-<error message>\r\n`
    Error(String),
}

impl Reply {
    /// Creates a new simple string reply.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::types::Reply;
    /// let ok = Reply::simple_string("OK");
    /// assert_eq!(ok.serialize(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        Reply::SimpleString(s.into())
    }

    /// Creates a new error reply.
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Creates a new bulk string reply.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::types::Reply;
    /// use bytes::Bytes;
    /// let bulk = Reply::bulk_string(Bytes::from("hello"));
    /// assert_eq!(bulk.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        Reply::BulkString(data.into())
    }

    /// Creates a null reply.
    pub fn null() -> Self {
        Reply::Null
    }

    /// Common reply for successful writes
    pub fn ok() -> Self {
        Reply::SimpleString("OK".to_string())
    }

    /// Common reply for PING without an argument
    pub fn pong() -> Self {
        Reply::SimpleString("PONG".to_string())
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.serialize_into(&mut buf);
        buf.to_vec()
    }

    /// Appends the wire form of the reply to `buf`.
    ///
    /// The dispatcher uses this to concatenate every reply for one message
    /// into a single write.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::SimpleString(s) => {
                buf.put_u8(prefix::SIMPLE_STRING);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.put_u8(prefix::ERROR);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::BulkString(data) => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Reply::Null => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(b"-1");
                buf.put_slice(CRLF);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_string_serialize() {
        assert_eq!(Reply::simple_string("OK").serialize(), b"+OK\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let reply = Reply::error("ERR unknown command 'foo'");
        assert_eq!(reply.serialize(), b"-ERR unknown command 'foo'\r\n");
    }

    #[test]
    fn test_bulk_string_serialize() {
        let reply = Reply::bulk_string(Bytes::from("hello"));
        assert_eq!(reply.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_empty_bulk_string_serialize() {
        let reply = Reply::bulk_string(Bytes::new());
        assert_eq!(reply.serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_null_serialize() {
        let reply = Reply::null();
        assert_eq!(reply, Reply::Null);
        assert_eq!(reply.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_serialize_into_concatenates() {
        let mut buf = BytesMut::new();
        Reply::ok().serialize_into(&mut buf);
        Reply::pong().serialize_into(&mut buf);
        Reply::null().serialize_into(&mut buf);
        assert_eq!(&buf[..], b"+OK\r\n+PONG\r\n$-1\r\n");
    }
}
