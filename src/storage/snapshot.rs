//! Cold-start snapshot hydration.
//!
//! The on-disk format is a simplified RDB-like byte stream: a metadata
//! section (skipped wholesale), a single database section delimited by
//! sentinel opcodes, and a trailing checksum that is read but never
//! verified. This reader only ever loads a snapshot into a fresh `Store`;
//! writing one back out is out of scope.

use super::store::Store;
use super::value::Entry;
use crate::error::{Result, ServerError, StorageError};
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const OP_AUX: u8 = 0xFA;
const OP_SELECT_DB: u8 = 0xFE;
const OP_HASH_TABLE_SIZE: u8 = 0xFB;
const OP_EXPIRE_SECONDS: u8 = 0xFD;
const OP_EXPIRE_MILLISECONDS: u8 = 0xFC;
const OP_STRING: u8 = 0x00;
const OP_EOF: u8 = 0xFF;

/// Loads a snapshot file into a fresh `Store`.
///
/// A missing file is not an error: the server simply starts empty. A
/// present-but-malformed file is an error; the caller falls back to an
/// empty store and logs the problem.
pub fn load(path: &Path) -> Result<Store> {
    if !path.exists() {
        return Ok(Store::new());
    }

    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;

    let mut reader = SnapshotReader::new(&bytes);
    reader.read_into_store()
}

struct SnapshotReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        SnapshotReader { data, pos: 0 }
    }

    fn read_byte(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| corrupt("unexpected end of snapshot"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(corrupt("unexpected end of snapshot"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.read_exact(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Skips bytes until `opcode` is seen (and consumed), or the buffer ends.
    /// Used to discard the metadata section wholesale: individual aux
    /// fields are not meaningful to this server.
    fn skip_until(&mut self, opcode: u8) -> Result<()> {
        loop {
            if self.read_byte()? == opcode {
                return Ok(());
            }
        }
    }

    fn read_string_record(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        let key_len = self.read_byte()? as usize;
        let key = self.read_exact(key_len)?.to_vec();
        let value_len = self.read_byte()? as usize;
        let value = self.read_exact(value_len)?.to_vec();
        Ok((key, value))
    }

    fn read_into_store(&mut self) -> Result<Store> {
        let mut store = Store::new();

        self.skip_until(OP_AUX)?;
        self.skip_until(OP_SELECT_DB)?;
        let _db_index = self.read_byte()?;

        loop {
            let opcode = self.read_byte()?;
            if opcode == OP_EOF {
                // 8-byte checksum, currently ignored.
                let _ = self.read_exact(8)?;
                break;
            }

            if opcode == OP_HASH_TABLE_SIZE {
                let key_count = self.read_byte()? as usize;
                let _expiry_count = self.read_byte()?;
                for _ in 0..key_count {
                    self.read_entry(&mut store)?;
                }
                continue;
            }

            return Err(corrupt(&format!("unexpected opcode 0x{:02x}", opcode)));
        }

        Ok(store)
    }

    fn read_entry(&mut self, store: &mut Store) -> Result<()> {
        let marker = self.read_byte()?;

        let expiry_instant = match marker {
            OP_EXPIRE_MILLISECONDS => Some(unix_millis_to_instant(self.read_u64_le()?)),
            OP_EXPIRE_SECONDS => Some(unix_millis_to_instant(self.read_u64_le()? * 1000)),
            OP_STRING => None,
            other => return Err(corrupt(&format!("unexpected entry marker 0x{:02x}", other))),
        };

        if marker != OP_STRING {
            let value_type = self.read_byte()?;
            if value_type != OP_STRING {
                return Err(corrupt("only string values are supported in snapshots"));
            }
        }

        let (key, value) = self.read_string_record()?;
        let entry = match expiry_instant {
            Some(at) => Entry::with_expiry(super::value::StorageValue::String(value), at),
            None => Entry::new(super::value::StorageValue::String(value)),
        };
        store.insert_entry(key, entry);
        Ok(())
    }
}

/// Converts a Unix epoch millisecond timestamp (as stored in the snapshot)
/// into an `Instant` deadline relative to now. A deadline already in the
/// past collapses to "now" so the key is purged on first read rather than
/// rejected at load time.
fn unix_millis_to_instant(unix_millis: u64) -> Instant {
    let now_system = SystemTime::now();
    let target = UNIX_EPOCH + Duration::from_millis(unix_millis);
    match target.duration_since(now_system) {
        Ok(remaining) => Instant::now() + remaining,
        Err(_) => Instant::now(),
    }
}

fn corrupt(msg: &str) -> ServerError {
    ServerError::Storage(StorageError::CorruptSnapshot(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::Lookup;
    use crate::storage::value::StorageValue;
    use std::io::Write;

    fn build_snapshot(entries: &[(&[u8], &[u8], Option<u64>)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(OP_AUX);
        buf.push(OP_SELECT_DB);
        buf.push(0); // db index

        buf.push(OP_HASH_TABLE_SIZE);
        buf.push(entries.len() as u8);
        buf.push(0); // expiry count, unused by the reader

        for (key, value, expiry_ms) in entries {
            if let Some(ms) = expiry_ms {
                buf.push(OP_EXPIRE_MILLISECONDS);
                buf.extend_from_slice(&ms.to_le_bytes());
            }
            buf.push(OP_STRING);
            buf.push(key.len() as u8);
            buf.extend_from_slice(key);
            buf.push(value.len() as u8);
            buf.extend_from_slice(value);
        }

        buf.push(OP_EOF);
        buf.extend_from_slice(&[0u8; 8]);
        buf
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let store = load(Path::new("/nonexistent/path/to/snapshot.rdb")).unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_load_string_without_expiry() {
        let bytes = build_snapshot(&[(b"foo", b"bar", None)]);
        let mut reader = SnapshotReader::new(&bytes);
        let mut store = reader.read_into_store().unwrap();
        match store.get(b"foo") {
            Lookup::Found(StorageValue::String(v)) => assert_eq!(v, b"bar"),
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn test_load_string_with_future_expiry_survives() {
        let future_ms = (SystemTime::now() + Duration::from_secs(3600))
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let bytes = build_snapshot(&[(b"foo", b"bar", Some(future_ms))]);
        let mut reader = SnapshotReader::new(&bytes);
        let mut store = reader.read_into_store().unwrap();
        assert!(matches!(store.get(b"foo"), Lookup::Found(_)));
    }

    #[test]
    fn test_load_string_already_expired_is_purged_on_read() {
        let past_ms = UNIX_EPOCH.elapsed().unwrap().as_millis() as u64 - 1000;
        let bytes = build_snapshot(&[(b"foo", b"bar", Some(past_ms))]);
        let mut reader = SnapshotReader::new(&bytes);
        let mut store = reader.read_into_store().unwrap();
        assert!(matches!(store.get(b"foo"), Lookup::NotFound));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.rdb");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not a real snapshot").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn test_multiple_entries_round_trip() {
        let bytes = build_snapshot(&[(b"a", b"1", None), (b"b", b"2", None)]);
        let mut reader = SnapshotReader::new(&bytes);
        let mut store = reader.read_into_store().unwrap();
        assert_eq!(store.len(), 2);
        match store.get(b"a") {
            Lookup::Found(StorageValue::String(v)) => assert_eq!(v, b"1"),
            _ => panic!("expected string"),
        }
    }
}
