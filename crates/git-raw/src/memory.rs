//! In-memory raw store: a `Mutex`-guarded map, fully isolated per instance.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::{RawStore, RawStoreError, ReadWindow};

/// An in-memory [`RawStore`]. Each instance owns its own map; dropping or
/// clearing one never affects another.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty this instance's map without affecting any sibling instance.
    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
    }
}

impl RawStore for InMemoryStore {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<usize, RawStoreError> {
        let mut data = self.data.lock().unwrap();
        data.insert(key.to_string(), bytes.to_vec());
        Ok(bytes.len())
    }

    fn load(
        &self,
        key: &str,
        window: ReadWindow,
    ) -> Result<Option<Vec<u8>>, RawStoreError> {
        let data = self.data.lock().unwrap();
        Ok(data.get(key).map(|bytes| {
            let (start, end) = window.clamp(bytes.len() as u64);
            bytes[start as usize..end as usize].to_vec()
        }))
    }

    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        Ok(self.data.lock().unwrap().contains_key(key))
    }

    fn size(&self, key: &str) -> Result<i64, RawStoreError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(key)
            .map(|v| v.len() as i64)
            .unwrap_or(-1))
    }

    fn delete(&self, key: &str) -> Result<bool, RawStoreError> {
        Ok(self.data.lock().unwrap().remove(key).is_some())
    }

    fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, RawStoreError> {
        let data = self.data.lock().unwrap();
        Ok(match prefix {
            Some(p) => data.keys().filter(|k| k.starts_with(p)).cloned().collect(),
            None => data.keys().cloned().collect(),
        })
    }
}
