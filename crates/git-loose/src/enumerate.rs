use git_hash::ObjectId;
use git_raw::RawStore;

use crate::{LooseError, LooseObjectStore};

/// Iterator over loose object OIDs.
///
/// Backed by the raw store's key enumeration (which already knows the
/// fan-out layout); keys that aren't full-length hex OIDs — stray temp
/// files, anything left over from an interrupted write — are skipped
/// rather than surfaced as errors.
pub struct LooseObjectIter {
    keys: std::vec::IntoIter<String>,
}

impl LooseObjectIter {
    fn new(store: &LooseObjectStore) -> Result<Self, LooseError> {
        let mut keys = store.raw.keys(None)?;
        keys.sort();
        Ok(Self {
            keys: keys.into_iter(),
        })
    }
}

impl Iterator for LooseObjectIter {
    type Item = Result<ObjectId, LooseError>;

    fn next(&mut self) -> Option<Self::Item> {
        for key in self.keys.by_ref() {
            if !key.chars().all(|c| c.is_ascii_hexdigit()) {
                continue;
            }
            match ObjectId::from_hex(&key) {
                Ok(oid) => return Some(Ok(oid)),
                Err(_) => continue,
            }
        }
        None
    }
}

impl LooseObjectStore {
    /// Iterate over all loose object OIDs.
    pub fn iter(&self) -> Result<LooseObjectIter, LooseError> {
        LooseObjectIter::new(self)
    }
}
