//! Reply values and their RESP encoding.
//!
//! Only the reply shapes the dispatcher actually produces are modelled:
//!
//! | kind          | wire form                          |
//! |---------------|------------------------------------|
//! | status        | `+PONG\r\n`                        |
//! | error         | `-ERR unknown command 'FOO'\r\n`   |
//! | bulk          | `$3\r\nbar\r\n`                    |
//! | null bulk     | `$-1\r\n`                          |
//! | array         | `*2\r\n$3\r\ndir\r\n$2\r\n./\r\n`  |

use bytes::{BufMut, Bytes};
use std::fmt;

/// Line terminator for every RESP header and payload.
pub const CRLF: &[u8] = b"\r\n";

/// First byte of each RESP frame kind.
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply on its way back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+<text>`; the text must not contain CR or LF
    SimpleString(String),
    /// `-<message>`
    Error(String),
    /// `$<len>` followed by the payload
    BulkString(Bytes),
    /// `$-1`, the absent value
    Null,
    /// `*<count>` followed by the elements
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        Self::SimpleString(s.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Wraps a binary-safe payload.
    ///
    /// ```
    /// use flintkv::protocol::RespValue;
    /// assert_eq!(RespValue::bulk_string("bar").serialize(), b"$3\r\nbar\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        Self::BulkString(data.into())
    }

    pub fn null() -> Self {
        Self::Null
    }

    /// Builds an array of bulk strings, e.g. the `[name, value]` pair of
    /// `CONFIG GET` or the key list of `KEYS`.
    pub fn bulk_array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Self::Array(items.into_iter().map(Self::bulk_string).collect())
    }

    /// `+OK`
    pub fn ok() -> Self {
        Self::simple_string("OK")
    }

    /// `+PONG`
    pub fn pong() -> Self {
        Self::simple_string("PONG")
    }

    /// Encodes the reply into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len_hint());
        self.serialize_into(&mut out);
        out
    }

    /// Appends the encoded reply to `out`.
    pub fn serialize_into<B: BufMut>(&self, out: &mut B) {
        match self {
            Self::SimpleString(text) => put_line(out, prefix::SIMPLE_STRING, text.as_bytes()),
            Self::Error(message) => put_line(out, prefix::ERROR, message.as_bytes()),
            Self::BulkString(data) => {
                put_line(out, prefix::BULK_STRING, data.len().to_string().as_bytes());
                out.put_slice(data);
                out.put_slice(CRLF);
            }
            Self::Null => put_line(out, prefix::BULK_STRING, b"-1"),
            Self::Array(items) => {
                put_line(out, prefix::ARRAY, items.len().to_string().as_bytes());
                items.iter().for_each(|item| item.serialize_into(out));
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            Self::BulkString(data) => data.len() + 16,
            Self::Array(items) => 16 + items.iter().map(Self::encoded_len_hint).sum::<usize>(),
            _ => 32,
        }
    }
}

/// Writes `<prefix><body>\r\n`.
fn put_line<B: BufMut>(out: &mut B, prefix: u8, body: &[u8]) {
    out.put_u8(prefix);
    out.put_slice(body);
    out.put_slice(CRLF);
}

/// Human-readable form for logs, in the style of `redis-cli`.
impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SimpleString(text) => f.write_str(text),
            Self::Error(message) => write!(f, "(error) {}", message),
            Self::BulkString(data) => match std::str::from_utf8(data) {
                Ok(text) => write!(f, "{:?}", text),
                Err(_) => write!(f, "({} bytes)", data.len()),
            },
            Self::Null => f.write_str("(nil)"),
            Self::Array(items) => write!(f, "(array, {} elements)", items.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_replies() {
        assert_eq!(RespValue::ok().serialize(), b"+OK\r\n");
        assert_eq!(RespValue::pong().serialize(), b"+PONG\r\n");
    }

    #[test]
    fn test_error_reply() {
        let reply = RespValue::error("ERR unknown command 'FOO'");
        assert!(reply.is_error());
        assert_eq!(reply.serialize(), b"-ERR unknown command 'FOO'\r\n");
    }

    #[test]
    fn test_bulk_replies() {
        assert_eq!(RespValue::bulk_string("bar").serialize(), b"$3\r\nbar\r\n");
        assert_eq!(RespValue::bulk_string(Bytes::new()).serialize(), b"$0\r\n\r\n");
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_binary_payload_is_length_prefixed() {
        let reply = RespValue::bulk_string(Bytes::from_static(b"a\r\nb"));
        assert_eq!(reply.serialize(), b"$4\r\na\r\nb\r\n");
    }

    #[test]
    fn test_arrays() {
        let pair = RespValue::bulk_array(["dir", "./"]);
        assert_eq!(pair.serialize(), b"*2\r\n$3\r\ndir\r\n$2\r\n./\r\n");

        let empty = RespValue::bulk_array(Vec::<Bytes>::new());
        assert_eq!(empty.serialize(), b"*0\r\n");
    }

    #[test]
    fn test_serialize_into_appends() {
        let mut out = bytes::BytesMut::new();
        RespValue::ok().serialize_into(&mut out);
        RespValue::null().serialize_into(&mut out);
        assert_eq!(&out[..], b"+OK\r\n$-1\r\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(RespValue::null().to_string(), "(nil)");
        assert_eq!(RespValue::bulk_string("hi").to_string(), "\"hi\"");
        assert_eq!(RespValue::bulk_array(["a"]).to_string(), "(array, 1 elements)");
    }
}
