//! The closed set of commands the server understands.
//!
//! A decoded frame is a list of bulk strings. The first one names the
//! command (matched case-insensitively) and the rest bind positionally to
//! the variant's fields. Each variant takes a fixed number of arguments:
//!
//! | Command | Arguments |
//! |---------|-----------|
//! | `PING`  | 0 or 1    |
//! | `ECHO`  | 1         |
//! | `SET`   | 2         |
//! | `GET`   | 1         |

use crate::protocol::decoder::DecodeError;
use crate::protocol::types::{prefix, CRLF};
use bytes::{BufMut, Bytes, BytesMut};

/// A fully-resolved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PING [message]`
    Ping { argument: Option<Bytes> },
    /// `ECHO message`
    Echo { argument: Bytes },
    /// `SET key value`
    Set { key: Bytes, value: Bytes },
    /// `GET key`
    Get { key: Bytes },
}

impl Command {
    /// Resolves the elements of one frame into a command.
    ///
    /// `parts[0]` is the command name; the remaining elements are its
    /// arguments. An empty frame is an [`DecodeError::InvalidCommand`].
    pub fn from_parts(parts: Vec<Bytes>) -> Result<Self, DecodeError> {
        let mut args = parts.into_iter();
        let name = args.next().ok_or(DecodeError::InvalidCommand)?;

        let name_upper = name.to_ascii_uppercase();
        let arity_error = || DecodeError::WrongArity {
            command: String::from_utf8_lossy(&name).to_lowercase(),
        };

        let command = match name_upper.as_slice() {
            b"PING" => match (args.next(), args.next()) {
                (argument, None) => Command::Ping { argument },
                _ => return Err(arity_error()),
            },
            b"ECHO" => match (args.next(), args.next()) {
                (Some(argument), None) => Command::Echo { argument },
                _ => return Err(arity_error()),
            },
            b"SET" => match (args.next(), args.next(), args.next()) {
                (Some(key), Some(value), None) => Command::Set { key, value },
                _ => return Err(arity_error()),
            },
            b"GET" => match (args.next(), args.next()) {
                (Some(key), None) => Command::Get { key },
                _ => return Err(arity_error()),
            },
            _ => {
                return Err(DecodeError::UnknownCommand(
                    String::from_utf8_lossy(&name).into_owned(),
                ))
            }
        };

        Ok(command)
    }

    /// Canonical upper-case name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping { .. } => "PING",
            Command::Echo { .. } => "ECHO",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
        }
    }

    /// Encodes the command the way a client sends it: an array of bulk strings.
    pub fn encode(&self) -> Bytes {
        let name = Bytes::from_static(self.name().as_bytes());
        let parts: Vec<&Bytes> = match self {
            Command::Ping { argument: None } => vec![&name],
            Command::Ping {
                argument: Some(argument),
            } => vec![&name, argument],
            Command::Echo { argument } => vec![&name, argument],
            Command::Set { key, value } => vec![&name, key, value],
            Command::Get { key } => vec![&name, key],
        };

        let mut buf = BytesMut::new();
        buf.put_u8(prefix::ARRAY);
        buf.put_slice(parts.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        for part in parts {
            buf.put_u8(prefix::BULK_STRING);
            buf.put_slice(part.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(part);
            buf.put_slice(CRLF);
        }
        buf.freeze()
    }
}
