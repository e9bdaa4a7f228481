//! Command Executor
//!
//! Maps each decoded [`Command`] to a storage operation and a [`Reply`].
//! Only `SET` mutates the store; nothing fails at execution time, errors
//! only come out of the decoder.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌──────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  Decoder     │───>│  execute()  │───>│ serialize   │     │
//! │  └──────────────┘    └─────────────┘    └─────────────┘     │
//! │                             │                               │
//! │                             ▼                               │
//! │                      StorageEngine                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::Command;
use crate::protocol::{Decoder, Reply};
use crate::storage::StorageEngine;
use bytes::{Bytes, BytesMut};

/// Counts gathered while executing one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Commands decoded and executed
    pub executed: usize,
    /// Frames that failed to decode
    pub errors: usize,
    /// The payload ended in a frame that cannot be recovered from; the
    /// connection should be closed once the replies are written
    pub close: bool,
}

/// Executes commands against the storage engine it owns.
#[derive(Debug, Default)]
pub struct CommandHandler {
    storage: StorageEngine,
}

impl CommandHandler {
    /// Creates a handler around the given storage engine.
    pub fn new(storage: StorageEngine) -> Self {
        Self { storage }
    }

    /// Read access to the underlying store.
    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    /// Executes a single command and returns its reply.
    pub fn execute(&mut self, command: Command) -> Reply {
        match command {
            Command::Ping { argument: None } => Reply::pong(),
            Command::Ping {
                argument: Some(argument),
            } => Reply::bulk_string(argument),
            Command::Echo { argument } => Reply::bulk_string(argument),
            Command::Set { key, value } => {
                self.storage.set(key, value);
                Reply::ok()
            }
            Command::Get { key } => match self.storage.get(&key) {
                Some(value) => Reply::bulk_string(value),
                None => Reply::null(),
            },
        }
    }

    /// Decodes every frame of `payload`, executes it, and appends each reply
    /// to `out` in frame order. A frame that fails to decode contributes an
    /// error reply.
    pub fn execute_payload(&mut self, payload: Bytes, out: &mut BytesMut) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for result in Decoder::new(payload) {
            let reply = match result {
                Ok(command) => {
                    outcome.executed += 1;
                    self.execute(command)
                }
                Err(err) => {
                    outcome.errors += 1;
                    outcome.close |= err.is_fatal();
                    Reply::from(err)
                }
            };
            reply.serialize_into(out);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(StorageEngine::new())
    }

    fn run(handler: &mut CommandHandler, input: &'static [u8]) -> (Vec<u8>, BatchOutcome) {
        let mut out = BytesMut::new();
        let outcome = handler.execute_payload(Bytes::from_static(input), &mut out);
        (out.to_vec(), outcome)
    }

    #[test]
    fn test_ping() {
        let mut handler = create_handler();

        let reply = handler.execute(Command::Ping { argument: None });
        assert_eq!(reply, Reply::simple_string("PONG"));

        let reply = handler.execute(Command::Ping {
            argument: Some(Bytes::from("hello")),
        });
        assert_eq!(reply, Reply::bulk_string(Bytes::from("hello")));
    }

    #[test]
    fn test_echo() {
        let mut handler = create_handler();

        let reply = handler.execute(Command::Echo {
            argument: Bytes::from("hey"),
        });
        assert_eq!(reply, Reply::bulk_string(Bytes::from("hey")));
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_set_get() {
        let mut handler = create_handler();

        let reply = handler.execute(Command::Set {
            key: Bytes::from("key"),
            value: Bytes::from("value"),
        });
        assert_eq!(reply, Reply::ok());

        let reply = handler.execute(Command::Get {
            key: Bytes::from("key"),
        });
        assert_eq!(reply, Reply::bulk_string(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let mut handler = create_handler();

        let reply = handler.execute(Command::Get {
            key: Bytes::from("nonexistent"),
        });
        assert_eq!(reply, Reply::null());
    }

    #[test]
    fn test_set_repeated_converges() {
        let mut handler = create_handler();
        let set = Command::Set {
            key: Bytes::from("foo"),
            value: Bytes::from("bar"),
        };

        for _ in 0..5 {
            assert_eq!(handler.execute(set.clone()), Reply::ok());
        }
        assert_eq!(handler.storage().len(), 1);
        assert_eq!(handler.storage().get(b"foo"), Some(Bytes::from("bar")));
    }

    #[test]
    fn test_payload_scenarios() {
        let mut handler = create_handler();

        assert_eq!(run(&mut handler, b"*1\r\n$4\r\nPING\r\n").0, b"+PONG\r\n");
        assert_eq!(
            run(&mut handler, b"*2\r\n$4\r\nPING\r\n$5\r\nhello\r\n").0,
            b"$5\r\nhello\r\n"
        );
        assert_eq!(
            run(&mut handler, b"*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n").0,
            b"$3\r\nhey\r\n"
        );
        assert_eq!(
            run(&mut handler, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n").0,
            b"+OK\r\n"
        );
        assert_eq!(
            run(&mut handler, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n").0,
            b"$3\r\nbar\r\n"
        );
        assert_eq!(
            run(&mut handler, b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n").0,
            b"$-1\r\n"
        );
    }

    #[test]
    fn test_payload_replies_in_frame_order() {
        let mut handler = create_handler();

        let (out, outcome) = run(
            &mut handler,
            b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*1\r\n$4\r\nPING\r\n",
        );
        assert_eq!(out, b"+OK\r\n$2\r\nv1\r\n+PONG\r\n");
        assert_eq!(
            outcome,
            BatchOutcome {
                executed: 3,
                errors: 0,
                close: false
            }
        );
    }

    #[test]
    fn test_unknown_command() {
        let mut handler = create_handler();

        let (out, outcome) = run(&mut handler, b"*1\r\n$7\r\nUNKNOWN\r\n");
        assert_eq!(out, b"-ERR unknown command 'UNKNOWN'\r\n");
        assert_eq!(outcome.errors, 1);
    }

    #[test]
    fn test_malformed_frame_then_valid_frame() {
        let mut handler = create_handler();

        let (out, outcome) = run(
            &mut handler,
            b"*2\r\n$3\r\nGET\r\n$x\r\nfoo\r\n*1\r\n$4\r\nPING\r\n",
        );
        assert_eq!(out, b"-ERR malformed length 'x'\r\n+PONG\r\n");
        assert_eq!(
            outcome,
            BatchOutcome {
                executed: 1,
                errors: 1,
                close: false
            }
        );
    }

    #[test]
    fn test_wrong_arity() {
        let mut handler = create_handler();

        let (out, _) = run(&mut handler, b"*2\r\n$3\r\nSET\r\n$3\r\nfoo\r\n");
        assert_eq!(out, b"-ERR wrong number of arguments for 'set' command\r\n");
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_oversized_bulk_requests_close() {
        let mut handler = create_handler();

        let (out, outcome) = run(
            &mut handler,
            b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$999999999\r\n",
        );
        assert_eq!(
            out,
            b"$2\r\nhi\r\n-ERR message too large: 999999999 bytes (max: 536870912)\r\n"
        );
        assert_eq!(
            outcome,
            BatchOutcome {
                executed: 1,
                errors: 1,
                close: true
            }
        );
        assert!(handler.storage().is_empty());
    }
}
