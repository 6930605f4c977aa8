//! RESP Protocol Implementation
//!
//! The subset of the Redis Serialization Protocol that FlintKV speaks:
//! requests are arrays of bulk strings, replies are simple strings, errors,
//! bulk strings, null bulk strings and arrays.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` reply enum and its serialization
//! - `parser`: request decoding into a [`Command`]
//!
//! ## Example
//!
//! ```
//! use flintkv::protocol::{decode, RespValue};
//!
//! let command = decode(b"*2\r\n$3\r\nget\r\n$4\r\nname\r\n").unwrap();
//! assert_eq!(command.name, "GET");
//!
//! let reply = RespValue::bulk_string("alice");
//! assert_eq!(reply.serialize(), b"$5\r\nalice\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode, decode_frame, Command, ParseResult, ProtocolError};
pub use types::RespValue;
