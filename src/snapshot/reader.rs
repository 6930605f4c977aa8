//! RDB Snapshot Reader
//!
//! Decodes the key section of a Redis dump file. Only what is needed to list
//! keys is supported: plain string records, database selectors, expiry
//! prefixes and the end marker. Auxiliary metadata and resize hints are
//! skipped. Values are never materialized.
//!
//! ## File Layout
//!
//! ```text
//! "REDIS" <4 version bytes>
//! [0xFA <aux key> <aux value>]*
//! 0xFE <db index>
//! [0xFB <hash size> <expires size>]
//! [0xFD <u32 LE seconds> | 0xFC <u64 LE millis>] <type> <key> <value>
//! ...
//! 0xFF [checksum]
//! ```
//!
//! ## Length Encoding
//!
//! The top two bits of the first byte select the form:
//!
//! | bits | meaning                                   |
//! |------|-------------------------------------------|
//! | `00` | length in the remaining 6 bits            |
//! | `01` | 6 bits + next byte (14-bit length)        |
//! | `10` | next 4 bytes, big-endian                  |
//! | `11` | special encoding: 0xC0/0xC1/0xC2 integers |

use bytes::Bytes;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, trace};

/// Magic bytes every dump file starts with
pub const MAGIC: &[u8; 5] = b"REDIS";

/// Magic plus the four version digits
pub const HEADER_LEN: u64 = 9;

/// Structural opcodes
pub mod opcode {
    pub const AUX: u8 = 0xFA;
    pub const RESIZEDB: u8 = 0xFB;
    pub const EXPIRETIME_MS: u8 = 0xFC;
    pub const EXPIRETIME: u8 = 0xFD;
    pub const SELECTDB: u8 = 0xFE;
    pub const EOF: u8 = 0xFF;
}

/// Value type tags
pub mod value_type {
    pub const STRING: u8 = 0;
}

/// Special string encodings (top bits `11`)
mod encoding {
    pub const INT8: u8 = 0xC0;
    pub const INT16: u8 = 0xC1;
    pub const INT32: u8 = 0xC2;
}

/// Errors raised while decoding a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Io(#[from] io::Error),

    #[error("invalid snapshot header: missing REDIS magic")]
    InvalidMagic,

    #[error("snapshot truncated")]
    Truncated,

    #[error("unsupported string encoding: {0:#04x}")]
    UnsupportedEncoding(u8),
}

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// A key found in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub key: Bytes,
    /// Absolute deadline carried by the record, if any
    pub expires_at: Option<SystemTime>,
}

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Reached the `0xFF` end marker
    EndMarker,
    /// Input ended at a record boundary without an end marker
    EndOfInput,
    /// Met a value type that cannot be decoded; nothing after it is trusted
    UnsupportedType(u8),
}

/// The live records of a snapshot and how the scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotScan {
    pub records: Vec<SnapshotRecord>,
    /// Records skipped because their deadline had already passed
    pub expired: usize,
    pub outcome: ScanOutcome,
}

impl SnapshotScan {
    /// Returns the keys of the live records.
    pub fn keys(&self) -> Vec<Bytes> {
        self.records.iter().map(|r| r.key.clone()).collect()
    }
}

/// Streaming decoder over a dump file.
#[derive(Debug)]
pub struct SnapshotReader<R> {
    reader: R,
}

impl SnapshotReader<BufReader<File>> {
    /// Opens `path` read-only and validates its header.
    pub fn open(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> SnapshotReader<R> {
    /// Wraps `reader` and validates the 9-byte header.
    ///
    /// The version digits are accepted unconditionally.
    pub fn new(mut reader: R) -> SnapshotResult<Self> {
        let mut header = [0u8; HEADER_LEN as usize];
        read_exact(&mut reader, &mut header)?;
        if &header[..MAGIC.len()] != MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        Ok(Self { reader })
    }

    fn read_u8(&mut self) -> SnapshotResult<u8> {
        Ok(self.read_bytes::<1>()?[0])
    }

    fn read_bytes<const N: usize>(&mut self) -> SnapshotResult<[u8; N]> {
        let mut buf = [0u8; N];
        read_exact(&mut self.reader, &mut buf)?;
        Ok(buf)
    }

    /// Reads the next opcode, or `None` at a clean end of input.
    fn read_opcode(&mut self) -> SnapshotResult<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Consumes `len` bytes; running out of input first is truncation.
    fn skip(&mut self, len: u64) -> SnapshotResult<()> {
        let skipped = io::copy(&mut (&mut self.reader).take(len), &mut io::sink())?;
        if skipped < len {
            return Err(SnapshotError::Truncated);
        }
        Ok(())
    }

    /// Reads a length-encoded integer.
    ///
    /// The integer string encodings (0xC0-0xC2) yield the embedded integer.
    pub fn read_length(&mut self) -> SnapshotResult<u64> {
        let first = self.read_u8()?;
        self.read_length_from(first)
    }

    fn read_length_from(&mut self, first: u8) -> SnapshotResult<u64> {
        match first >> 6 {
            0b00 => Ok(u64::from(first & 0x3F)),
            0b01 => {
                let next = self.read_u8()?;
                Ok((u64::from(first & 0x3F) << 8) | u64::from(next))
            }
            0b10 => Ok(u64::from(u32::from_be_bytes(self.read_bytes::<4>()?))),
            _ => self.read_encoded_int(first),
        }
    }

    fn read_encoded_int(&mut self, first: u8) -> SnapshotResult<u64> {
        match first {
            encoding::INT8 => Ok(u64::from(self.read_u8()?)),
            encoding::INT16 => Ok(u64::from(u16::from_le_bytes(self.read_bytes::<2>()?))),
            encoding::INT32 => Ok(u64::from(u32::from_le_bytes(self.read_bytes::<4>()?))),
            other => Err(SnapshotError::UnsupportedEncoding(other)),
        }
    }

    /// Reads a string. Integer-encoded strings come back in decimal.
    pub fn read_string(&mut self) -> SnapshotResult<Bytes> {
        let first = self.read_u8()?;
        if first >> 6 == 0b11 {
            let n = self.read_encoded_int(first)?;
            return Ok(Bytes::from(n.to_string()));
        }

        let len = self.read_length_from(first)?;
        let mut buf = Vec::new();
        let read = (&mut self.reader).take(len).read_to_end(&mut buf)?;
        if (read as u64) < len {
            return Err(SnapshotError::Truncated);
        }
        Ok(Bytes::from(buf))
    }

    /// Skips a string without materializing it.
    fn skip_string(&mut self) -> SnapshotResult<()> {
        let first = self.read_u8()?;
        let len = match first {
            encoding::INT8 => 1,
            encoding::INT16 => 2,
            encoding::INT32 => 4,
            _ => self.read_length_from(first)?,
        };
        self.skip(len)
    }

    /// Scans every record after the header.
    pub fn read_records(&mut self) -> SnapshotResult<SnapshotScan> {
        self.reader.seek(SeekFrom::Start(HEADER_LEN))?;

        let now = SystemTime::now();
        let mut records = Vec::new();
        let mut expired = 0;

        let outcome = loop {
            let Some(flag) = self.read_opcode()? else {
                break ScanOutcome::EndOfInput;
            };

            let (type_tag, expires_at) = match flag {
                opcode::EOF => break ScanOutcome::EndMarker,
                opcode::SELECTDB => {
                    let db = self.read_length()?;
                    trace!(db, "Selecting database");
                    continue;
                }
                opcode::AUX => {
                    let key = self.read_string()?;
                    self.skip_string()?;
                    trace!(aux = %String::from_utf8_lossy(&key), "Skipping aux field");
                    continue;
                }
                opcode::RESIZEDB => {
                    self.read_length()?;
                    self.read_length()?;
                    continue;
                }
                opcode::EXPIRETIME => {
                    let secs = u32::from_le_bytes(self.read_bytes::<4>()?);
                    let at = UNIX_EPOCH + Duration::from_secs(u64::from(secs));
                    (self.read_u8()?, Some(at))
                }
                opcode::EXPIRETIME_MS => {
                    let millis = u64::from_le_bytes(self.read_bytes::<8>()?);
                    let at = UNIX_EPOCH + Duration::from_millis(millis);
                    (self.read_u8()?, Some(at))
                }
                tag => (tag, None),
            };

            if type_tag != value_type::STRING {
                debug!(type_tag, "Unsupported record type, stopping scan");
                break ScanOutcome::UnsupportedType(type_tag);
            }

            let key = self.read_string()?;
            self.skip_string()?;

            if expires_at.is_some_and(|at| at < now) {
                expired += 1;
                continue;
            }
            records.push(SnapshotRecord { key, expires_at });
        };

        Ok(SnapshotScan {
            records,
            expired,
            outcome,
        })
    }

    /// Returns the live keys, tolerating an unsupported record type.
    pub fn read_keys(&mut self) -> SnapshotResult<Vec<Bytes>> {
        Ok(self.read_records()?.keys())
    }
}

/// Reads exactly `buf.len()` bytes, reporting a short read as truncation.
fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> SnapshotResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => SnapshotError::Truncated,
        _ => SnapshotError::Io(e),
    })
}

/// Opens `path` and scans it in one go.
pub fn load(path: impl AsRef<Path>) -> SnapshotResult<SnapshotScan> {
    SnapshotReader::open(path)?.read_records()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &[u8] = b"REDIS0011";

    fn snapshot(body: &[u8]) -> SnapshotReader<Cursor<Vec<u8>>> {
        let mut bytes = HEADER.to_vec();
        bytes.extend_from_slice(body);
        SnapshotReader::new(Cursor::new(bytes)).unwrap()
    }

    /// Encodes a short string with a 6-bit length prefix.
    fn string(s: &str) -> Vec<u8> {
        assert!(s.len() < 64);
        let mut out = vec![s.len() as u8];
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn string_record(key: &str, value: &str) -> Vec<u8> {
        let mut out = vec![value_type::STRING];
        out.extend(string(key));
        out.extend(string(value));
        out
    }

    fn unix_millis(at: SystemTime) -> u64 {
        at.duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
    }

    #[test]
    fn test_single_key_with_empty_value() {
        let mut body = vec![opcode::SELECTDB, 0x00];
        body.extend(string_record("foo", ""));
        body.push(opcode::EOF);

        let mut reader = snapshot(&body);
        assert_eq!(reader.read_keys().unwrap(), vec![Bytes::from("foo")]);
    }

    #[test]
    fn test_invalid_magic() {
        let err = SnapshotReader::new(Cursor::new(b"RADIS0011\xFF".to_vec())).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidMagic));
    }

    #[test]
    fn test_short_header() {
        let err = SnapshotReader::new(Cursor::new(b"REDIS".to_vec())).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated));
    }

    #[test]
    fn test_any_version_accepted() {
        let reader = SnapshotReader::new(Cursor::new(b"REDISxxxx\xFF".to_vec()));
        assert!(reader.is_ok());
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("flintkv-does-not-exist.rdb");
        let err = SnapshotReader::open(&path).unwrap_err();
        assert!(matches!(err, SnapshotError::Io(_)));
    }

    #[test]
    fn test_length_encodings() {
        let mut reader = snapshot(&[
            0x0A, // 6-bit: 10
            0x41, 0x02, // 14-bit: (1 << 8) | 2
            0x80, 0x00, 0x01, 0x00, 0x00, // 32-bit big-endian: 65536
            0xC0, 0x7B, // int8: 123
            0xC1, 0x39, 0x30, // int16 LE: 12345
            0xC2, 0x78, 0x56, 0x34, 0x12, // int32 LE
        ]);

        assert_eq!(reader.read_length().unwrap(), 10);
        assert_eq!(reader.read_length().unwrap(), 258);
        assert_eq!(reader.read_length().unwrap(), 65536);
        assert_eq!(reader.read_length().unwrap(), 123);
        assert_eq!(reader.read_length().unwrap(), 12345);
        assert_eq!(reader.read_length().unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_compressed_encoding_unsupported() {
        let mut reader = snapshot(&[0xC3, 0x01, 0x01]);
        assert!(matches!(
            reader.read_length(),
            Err(SnapshotError::UnsupportedEncoding(0xC3))
        ));
    }

    #[test]
    fn test_integer_strings() {
        let mut reader = snapshot(&[
            0xC0, 0x07, //
            0xC1, 0x39, 0x30, //
            0xC2, 0x78, 0x56, 0x34, 0x12, //
            0x03, b'a', b'b', b'c',
        ]);

        assert_eq!(reader.read_string().unwrap(), Bytes::from("7"));
        assert_eq!(reader.read_string().unwrap(), Bytes::from("12345"));
        assert_eq!(reader.read_string().unwrap(), Bytes::from("305419896"));
        assert_eq!(reader.read_string().unwrap(), Bytes::from("abc"));
    }

    #[test]
    fn test_integer_key_and_value() {
        let body = [
            opcode::SELECTDB,
            0x00,
            value_type::STRING,
            0xC0,
            0x2A, // key "42"
            0xC1,
            0x01,
            0x02, // int16 value, skipped
            value_type::STRING,
            0x01,
            b'k',
            0xC2,
            0x00,
            0x00,
            0x00,
            0x01, // int32 value, skipped
            opcode::EOF,
        ];

        let mut reader = snapshot(&body);
        assert_eq!(
            reader.read_keys().unwrap(),
            vec![Bytes::from("42"), Bytes::from("k")]
        );
    }

    #[test]
    fn test_multiple_keys_and_aux_fields() {
        let mut body = vec![opcode::AUX];
        body.extend(string("redis-ver"));
        body.extend(string("7.2.0"));
        body.push(opcode::AUX);
        body.extend(string("redis-bits"));
        body.extend([0xC0, 0x40]);
        body.extend([opcode::SELECTDB, 0x00, opcode::RESIZEDB, 0x02, 0x00]);
        body.extend(string_record("apple", "red"));
        body.extend(string_record("banana", "yellow"));
        body.push(opcode::EOF);
        body.extend([0u8; 8]); // checksum

        let scan = snapshot(&body).read_records().unwrap();
        assert_eq!(scan.outcome, ScanOutcome::EndMarker);
        assert_eq!(
            scan.keys(),
            vec![Bytes::from("apple"), Bytes::from("banana")]
        );
    }

    #[test]
    fn test_expiry_opcodes() {
        let future = SystemTime::now() + Duration::from_secs(3600);
        let past_ms = unix_millis(SystemTime::now()) - 60_000;
        let future_secs = (unix_millis(future) / 1000) as u32;

        let mut body = vec![opcode::SELECTDB, 0x00];
        body.push(opcode::EXPIRETIME_MS);
        body.extend(past_ms.to_le_bytes());
        body.extend(string_record("stale", "x"));
        body.push(opcode::EXPIRETIME_MS);
        body.extend(unix_millis(future).to_le_bytes());
        body.extend(string_record("fresh_ms", "x"));
        body.push(opcode::EXPIRETIME);
        body.extend(future_secs.to_le_bytes());
        body.extend(string_record("fresh_secs", "x"));
        body.push(opcode::EXPIRETIME);
        body.extend(1u32.to_le_bytes());
        body.extend(string_record("ancient", "x"));
        body.push(opcode::EOF);

        let scan = snapshot(&body).read_records().unwrap();
        assert_eq!(scan.expired, 2);
        assert_eq!(
            scan.keys(),
            vec![Bytes::from("fresh_ms"), Bytes::from("fresh_secs")]
        );
        assert_eq!(
            scan.records[0].expires_at,
            Some(UNIX_EPOCH + Duration::from_millis(unix_millis(future)))
        );
        assert_eq!(
            scan.records[1].expires_at,
            Some(UNIX_EPOCH + Duration::from_secs(u64::from(future_secs)))
        );
    }

    #[test]
    fn test_unsupported_type_stops_scan() {
        let mut body = vec![opcode::SELECTDB, 0x00];
        body.extend(string_record("first", "1"));
        body.extend([0x01, 0x04, b'l', b'i', b's', b't']); // list type
        body.extend(string_record("after", "2"));
        body.push(opcode::EOF);

        let scan = snapshot(&body).read_records().unwrap();
        assert_eq!(scan.outcome, ScanOutcome::UnsupportedType(0x01));
        assert_eq!(scan.keys(), vec![Bytes::from("first")]);
    }

    #[test]
    fn test_end_of_input_without_marker() {
        let mut body = vec![opcode::SELECTDB, 0x00];
        body.extend(string_record("only", "v"));

        let scan = snapshot(&body).read_records().unwrap();
        assert_eq!(scan.outcome, ScanOutcome::EndOfInput);
        assert_eq!(scan.keys(), vec![Bytes::from("only")]);
    }

    #[test]
    fn test_truncated_key() {
        let body = [opcode::SELECTDB, 0x00, value_type::STRING, 0x05, b'a', b'b'];
        let err = snapshot(&body).read_records().unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated));
    }

    #[test]
    fn test_truncated_value() {
        let body = [
            opcode::SELECTDB,
            0x00,
            value_type::STRING,
            0x03,
            b'f',
            b'o',
            b'o',
            0x3F,
            b'x',
        ];
        let err = snapshot(&body).read_records().unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated));
    }

    #[test]
    fn test_truncated_integer_value() {
        let body = [opcode::SELECTDB, 0x00, value_type::STRING, 0x01, b'k', 0xC2, 0x01];
        let err = snapshot(&body).read_records().unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated));
    }

    #[test]
    fn test_rescan_starts_after_header() {
        let mut body = vec![opcode::SELECTDB, 0x00];
        body.extend(string_record("foo", "bar"));
        body.push(opcode::EOF);

        let mut reader = snapshot(&body);
        assert_eq!(reader.read_keys().unwrap().len(), 1);
        assert_eq!(reader.read_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("flintkv-reader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dump.rdb");

        let mut bytes = HEADER.to_vec();
        bytes.extend([opcode::SELECTDB, 0x00]);
        bytes.extend(string_record("disk", "value"));
        bytes.push(opcode::EOF);
        std::fs::write(&path, bytes).unwrap();

        let scan = load(&path).unwrap();
        assert_eq!(scan.keys(), vec![Bytes::from("disk")]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
