//! Key-value raw store: a single ordered map simulating an embedded KV
//! engine backend, storing two entries per logical key — `<prefix>:raw:<key>`
//! for the bytes and `<prefix>:size:<key>` for a 4-byte little-endian length
//! — so a size lookup never has to materialize the value.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::{RawStore, RawStoreError, ReadWindow};

const DEFAULT_PREFIX: &str = "git";

fn raw_key(prefix: &str, key: &str) -> String {
    format!("{prefix}:raw:{key}")
}

fn size_key(prefix: &str, key: &str) -> String {
    format!("{prefix}:size:{key}")
}

/// A key-value raw store over a single ordered map, modeling the layout an
/// embedded KV engine (sled, RocksDB, ...) would use: two entries per
/// logical key, plus compare-and-swap on the raw entry.
pub struct KvStore {
    prefix: String,
    map: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl Default for KvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            map: Mutex::new(BTreeMap::new()),
        }
    }

    /// Atomically replace the value stored under `key` with `new_bytes`,
    /// but only if the current value equals `expected` (`None` meaning "key
    /// must not currently exist"). Returns whether the swap took effect.
    pub fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new_bytes: &[u8],
    ) -> Result<bool, RawStoreError> {
        let mut map = self.map.lock().unwrap();
        let current = map.get(&raw_key(&self.prefix, key)).map(|v| v.as_slice());
        if current != expected {
            return Ok(false);
        }
        map.insert(raw_key(&self.prefix, key), new_bytes.to_vec());
        map.insert(
            size_key(&self.prefix, key),
            (new_bytes.len() as u32).to_le_bytes().to_vec(),
        );
        Ok(true)
    }

    /// Apply a batch of stores as a single atomic transaction: either every
    /// pair lands or none does.
    pub fn store_batch(&self, items: &[(&str, &[u8])]) -> Result<(), RawStoreError> {
        let mut map = self.map.lock().unwrap();
        for (key, bytes) in items {
            map.insert(raw_key(&self.prefix, key), bytes.to_vec());
            map.insert(
                size_key(&self.prefix, key),
                (bytes.len() as u32).to_le_bytes().to_vec(),
            );
        }
        Ok(())
    }
}

impl RawStore for KvStore {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<usize, RawStoreError> {
        let mut map = self.map.lock().unwrap();
        map.insert(raw_key(&self.prefix, key), bytes.to_vec());
        map.insert(
            size_key(&self.prefix, key),
            (bytes.len() as u32).to_le_bytes().to_vec(),
        );
        Ok(bytes.len())
    }

    fn load(
        &self,
        key: &str,
        window: ReadWindow,
    ) -> Result<Option<Vec<u8>>, RawStoreError> {
        let map = self.map.lock().unwrap();
        Ok(map.get(&raw_key(&self.prefix, key)).map(|bytes| {
            let (start, end) = window.clamp(bytes.len() as u64);
            bytes[start as usize..end as usize].to_vec()
        }))
    }

    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        Ok(self
            .map
            .lock()
            .unwrap()
            .contains_key(&size_key(&self.prefix, key)))
    }

    fn size(&self, key: &str) -> Result<i64, RawStoreError> {
        let map = self.map.lock().unwrap();
        match map.get(&size_key(&self.prefix, key)) {
            Some(bytes) => {
                let arr: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    RawStoreError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt size entry",
                    ))
                })?;
                Ok(u32::from_le_bytes(arr) as i64)
            }
            None => Ok(-1),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, RawStoreError> {
        let mut map = self.map.lock().unwrap();
        let had_raw = map.remove(&raw_key(&self.prefix, key)).is_some();
        let had_size = map.remove(&size_key(&self.prefix, key)).is_some();
        Ok(had_raw || had_size)
    }

    fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, RawStoreError> {
        let map = self.map.lock().unwrap();
        let raw_prefix = format!("{}:raw:", self.prefix);
        let mut out = Vec::new();
        for full_key in map.keys() {
            if let Some(key) = full_key.strip_prefix(&raw_prefix) {
                if prefix.map_or(true, |p| key.starts_with(p)) {
                    out.push(key.to_string());
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[test]
    fn conformance_suite() {
        conformance::run(&KvStore::new());
    }

    #[test]
    fn layout_uses_raw_and_size_entries() {
        let store = KvStore::with_prefix("git");
        store.store("abc123", b"hello").unwrap();
        let map = store.map.lock().unwrap();
        assert_eq!(map.get("git:raw:abc123").map(|v| v.as_slice()), Some(&b"hello"[..]));
        assert_eq!(
            map.get("git:size:abc123").map(|v| v.as_slice()),
            Some(&5u32.to_le_bytes()[..])
        );
    }

    #[test]
    fn compare_and_swap_rejects_mismatch() {
        let store = KvStore::new();
        store.store("k", b"v1").unwrap();
        assert!(!store
            .compare_and_swap("k", Some(b"wrong"), b"v2")
            .unwrap());
        assert_eq!(store.load_all("k").unwrap(), Some(b"v1".to_vec()));

        assert!(store.compare_and_swap("k", Some(b"v1"), b"v2").unwrap());
        assert_eq!(store.load_all("k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn compare_and_swap_requires_absence_for_none() {
        let store = KvStore::new();
        assert!(store.compare_and_swap("fresh", None, b"v1").unwrap());
        assert!(!store.compare_and_swap("fresh", None, b"v2").unwrap());
    }

    #[test]
    fn store_batch_applies_all_pairs() {
        let store = KvStore::new();
        store
            .store_batch(&[("a", b"1".as_slice()), ("b", b"2".as_slice())])
            .unwrap();
        assert_eq!(store.load_all("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.load_all("b").unwrap(), Some(b"2".to_vec()));
    }
}
