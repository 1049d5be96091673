//! The key-value store itself.
//!
//! Owned exclusively by the event-loop thread: no locking, no sharding, no
//! background expiration sweep. Expiry is enforced lazily, on read: a key
//! past its deadline is removed the moment something looks at it, and
//! otherwise sits inertly in the map.

use super::value::{Entry, StorageValue};
use std::collections::HashMap;
use std::time::Instant;

/// What `GET`-like lookups found.
pub enum Lookup<'a> {
    /// The key is present and live; here is its value.
    Found(&'a StorageValue),
    /// The key is absent (including keys purged because they had expired).
    NotFound,
}

pub struct Store {
    data: HashMap<Vec<u8>, Entry>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            data: HashMap::new(),
        }
    }

    /// Purges `key` if it is present but past its expiry deadline. Every
    /// read path runs through this first so expired keys never surface.
    fn purge_if_expired(&mut self, key: &[u8]) {
        if matches!(self.data.get(key), Some(e) if e.is_expired()) {
            self.data.remove(key);
        }
    }

    /// Unconditional overwrite: there is no compare-and-swap here, a second
    /// `SET` on the same key always wins regardless of what was there.
    pub fn set_string(&mut self, key: Vec<u8>, value: Vec<u8>, expires_at: Option<Instant>) {
        let entry = match expires_at {
            Some(at) => Entry::with_expiry(StorageValue::String(value), at),
            None => Entry::new(StorageValue::String(value)),
        };
        self.data.insert(key, entry);
    }

    /// Inserts a fully-formed entry as read from a snapshot, bypassing the
    /// "expires_at is always computed at write time relative to now" framing
    /// above: a snapshot's TTLs are already absolute instants computed at
    /// load time from the file's stored deadlines.
    pub fn insert_entry(&mut self, key: Vec<u8>, entry: Entry) {
        self.data.insert(key, entry);
    }

    pub fn get(&mut self, key: &[u8]) -> Lookup<'_> {
        self.purge_if_expired(key);
        match self.data.get(key) {
            Some(entry) => Lookup::Found(&entry.value),
            None => Lookup::NotFound,
        }
    }

    /// Appends a field/value pair to a stream at `key`, creating the stream
    /// if it does not already exist. Errors if `key` holds a string.
    pub fn xadd(
        &mut self,
        key: &[u8],
        field: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<(), crate::error::CommandError> {
        self.purge_if_expired(key);
        match self.data.get_mut(key) {
            Some(entry) => match &mut entry.value {
                StorageValue::Stream(pairs) => {
                    pairs.push((field, value));
                    Ok(())
                }
                StorageValue::String(_) => Err(crate::error::CommandError::WrongType),
            },
            None => {
                self.data.insert(
                    key.to_vec(),
                    Entry::new(StorageValue::Stream(vec![(field, value)])),
                );
                Ok(())
            }
        }
    }

    /// `TYPE`: "none" on a missing or expired key, else the value's kind.
    pub fn type_of(&mut self, key: &[u8]) -> &'static str {
        self.purge_if_expired(key);
        self.data
            .get(key)
            .map(|e| e.value.type_name())
            .unwrap_or("none")
    }

    /// `KEYS`: a prefix match against `pattern` (a trailing `*` is stripped
    /// before matching; any other pattern characters are matched literally).
    /// Purges every expired key encountered along the way.
    pub fn keys_matching(&mut self, pattern: &[u8]) -> Vec<Vec<u8>> {
        let prefix: &[u8] = pattern.strip_suffix(b"*").unwrap_or(pattern);

        let expired: Vec<Vec<u8>> = self
            .data
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.data.remove(&key);
        }

        self.data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_then_get() {
        let mut store = Store::new();
        store.set_string(b"k".to_vec(), b"v".to_vec(), None);
        match store.get(b"k") {
            Lookup::Found(StorageValue::String(v)) => assert_eq!(v, b"v"),
            _ => panic!("expected found string"),
        }
    }

    #[test]
    fn test_overwrite_is_unconditional() {
        let mut store = Store::new();
        store.set_string(b"k".to_vec(), b"v1".to_vec(), None);
        store.set_string(b"k".to_vec(), b"v2".to_vec(), None);
        match store.get(b"k") {
            Lookup::Found(StorageValue::String(v)) => assert_eq!(v, b"v2"),
            _ => panic!("expected found string"),
        }
    }

    #[test]
    fn test_expiry_purges_on_read() {
        let mut store = Store::new();
        store.set_string(
            b"k".to_vec(),
            b"v".to_vec(),
            Some(Instant::now() + Duration::from_millis(1)),
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(store.get(b"k"), Lookup::NotFound));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_xadd_and_type() {
        let mut store = Store::new();
        store.xadd(b"s", b"field".to_vec(), b"value".to_vec()).unwrap();
        assert_eq!(store.type_of(b"s"), "stream");
        assert_eq!(store.type_of(b"missing"), "none");
    }

    #[test]
    fn test_xadd_against_string_is_wrong_type() {
        let mut store = Store::new();
        store.set_string(b"k".to_vec(), b"v".to_vec(), None);
        assert!(store.xadd(b"k", b"f".to_vec(), b"v".to_vec()).is_err());
    }

    #[test]
    fn test_keys_prefix_match() {
        let mut store = Store::new();
        store.set_string(b"foo1".to_vec(), b"a".to_vec(), None);
        store.set_string(b"foo2".to_vec(), b"b".to_vec(), None);
        store.set_string(b"bar".to_vec(), b"c".to_vec(), None);

        let mut matched = store.keys_matching(b"foo*");
        matched.sort();
        assert_eq!(matched, vec![b"foo1".to_vec(), b"foo2".to_vec()]);
    }
}
