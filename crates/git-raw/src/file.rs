//! File-per-key raw store: `{root}/{first two hex chars}/{remaining}`.
//!
//! Writes are atomic: content lands in a temp file under `root` (same
//! filesystem, so `rename` is atomic) and is renamed into place only once
//! fully written.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{RawStore, RawStoreError, ReadWindow};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A file-per-key raw store with fan-out directories.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The on-disk path for `key`: the first two characters become a
    /// fan-out directory, the remainder the filename. Keys shorter than
    /// two characters are stored flat under `root`.
    pub fn key_path(&self, key: &str) -> PathBuf {
        if key.len() < 2 {
            return self.root.join(key);
        }
        let (prefix, rest) = key.split_at(2);
        self.root.join(prefix).join(rest)
    }

    fn temp_path(&self) -> PathBuf {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(
            "tmp_raw_{}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos(),
            counter
        ))
    }
}

impl RawStore for FileStore {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<usize, RawStoreError> {
        let final_path = self.key_path(key);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.temp_path();
        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }

        match fs::rename(&tmp_path, &final_path) {
            Ok(()) => {}
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(RawStoreError::Io(e));
            }
        }

        Ok(bytes.len())
    }

    fn load(
        &self,
        key: &str,
        window: ReadWindow,
    ) -> Result<Option<Vec<u8>>, RawStoreError> {
        let path = self.key_path(key);
        match fs::read(&path) {
            Ok(bytes) => {
                let (start, end) = window.clamp(bytes.len() as u64);
                Ok(Some(bytes[start as usize..end as usize].to_vec()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RawStoreError::Io(e)),
        }
    }

    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        Ok(self.key_path(key).is_file())
    }

    fn size(&self, key: &str) -> Result<i64, RawStoreError> {
        match fs::metadata(self.key_path(key)) {
            Ok(meta) => Ok(meta.len() as i64),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(-1),
            Err(e) => Err(RawStoreError::Io(e)),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, RawStoreError> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RawStoreError::Io(e)),
        }
    }

    fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, RawStoreError> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let name = entry.file_name().to_string_lossy().to_string();
            if file_type.is_dir() && name.len() == 2 {
                for inner in fs::read_dir(entry.path())? {
                    let inner = inner?;
                    let key = format!("{name}{}", inner.file_name().to_string_lossy());
                    if prefix.map_or(true, |p| key.starts_with(p)) {
                        out.push(key);
                    }
                }
            } else if file_type.is_file() && !name.starts_with("tmp_raw_") {
                if prefix.map_or(true, |p| name.starts_with(p)) {
                    out.push(name);
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
        let dir = tempfile::tempdir().unwrap();
        conformance::run(&FileStore::new(dir.path()));
    }

    #[test]
    fn key_path_fans_out() {
        let store = FileStore::new("/tmp/raw");
        assert_eq!(
            store.key_path("ab1234"),
            PathBuf::from("/tmp/raw/ab/1234")
        );
    }

    #[test]
    fn short_key_is_flat() {
        let store = FileStore::new("/tmp/raw");
        assert_eq!(store.key_path("a"), PathBuf::from("/tmp/raw/a"));
    }

    #[test]
    fn atomic_publish_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.store("ab1234", b"hello").unwrap();
        assert_eq!(store.load_all("ab1234").unwrap(), Some(b"hello".to_vec()));
        // No stray temp files left behind.
        for entry in fs::read_dir(dir.path()).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with("tmp_raw_"));
        }
    }
}
