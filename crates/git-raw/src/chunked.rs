//! Chunked-file raw store: each key maps to a directory of fixed-size
//! chunk files, so large values can be written and read without holding
//! the whole value in memory at once.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{RawStore, RawStoreError, ReadWindow};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// A chunked-file raw store. Each key is a subdirectory under `root`
/// holding `000000`, `000001`, … chunk files plus a `.size` sidecar
/// recording the exact byte length (the last chunk may be short).
pub struct ChunkedFileStore {
    root: PathBuf,
    chunk_size: usize,
}

impl ChunkedFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_chunk_size(root, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(root: impl AsRef<Path>, chunk_size: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            chunk_size: chunk_size.max(1),
        }
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn chunk_path(&self, key_dir: &Path, index: usize) -> PathBuf {
        key_dir.join(format!("{index:06}"))
    }

    fn size_path(&self, key_dir: &Path) -> PathBuf {
        key_dir.join(".size")
    }
}

impl RawStore for ChunkedFileStore {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<usize, RawStoreError> {
        let key_dir = self.key_dir(key);

        // Stage in a temp directory, then rename into place so readers never
        // see a partially written set of chunks.
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_dir = self.root.join(format!(
            "tmp_chunked_{}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos(),
            counter
        ));
        fs::create_dir_all(&tmp_dir)?;

        for (index, chunk) in bytes.chunks(self.chunk_size).enumerate() {
            let mut f = fs::File::create(self.chunk_path(&tmp_dir, index))?;
            f.write_all(chunk)?;
        }
        if bytes.is_empty() {
            // Ensure at least the directory exists for a zero-length value.
            fs::File::create(self.chunk_path(&tmp_dir, 0))?.write_all(&[])?;
            fs::remove_file(self.chunk_path(&tmp_dir, 0))?;
        }
        fs::write(self.size_path(&tmp_dir), (bytes.len() as u64).to_le_bytes())?;

        if key_dir.exists() {
            fs::remove_dir_all(&key_dir)?;
        }
        fs::rename(&tmp_dir, &key_dir)?;

        Ok(bytes.len())
    }

    fn load(
        &self,
        key: &str,
        window: ReadWindow,
    ) -> Result<Option<Vec<u8>>, RawStoreError> {
        let key_dir = self.key_dir(key);
        let total_len = match fs::read(self.size_path(&key_dir)) {
            Ok(bytes) => u64::from_le_bytes(bytes.try_into().map_err(|_| {
                RawStoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "corrupt chunk size sidecar",
                ))
            })?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RawStoreError::Io(e)),
        };

        let (start, end) = window.clamp(total_len);
        let mut out = Vec::with_capacity((end - start) as usize);
        if start == end {
            return Ok(Some(out));
        }

        let chunk_size = self.chunk_size as u64;
        let mut pos = start;
        while pos < end {
            let chunk_index = (pos / chunk_size) as usize;
            let chunk_start = (pos % chunk_size) as usize;
            let chunk_bytes = fs::read(self.chunk_path(&key_dir, chunk_index))?;
            let chunk_end = chunk_bytes
                .len()
                .min(chunk_start + (end - pos) as usize);
            out.extend_from_slice(&chunk_bytes[chunk_start..chunk_end]);
            pos += (chunk_end - chunk_start) as u64;
        }

        Ok(Some(out))
    }

    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        Ok(self.size_path(&self.key_dir(key)).is_file())
    }

    fn size(&self, key: &str) -> Result<i64, RawStoreError> {
        match fs::read(self.size_path(&self.key_dir(key))) {
            Ok(bytes) => {
                let len: [u8; 8] = bytes.try_into().map_err(|_| {
                    RawStoreError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt chunk size sidecar",
                    ))
                })?;
                Ok(u64::from_le_bytes(len) as i64)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(-1),
            Err(e) => Err(RawStoreError::Io(e)),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, RawStoreError> {
        let key_dir = self.key_dir(key);
        if !key_dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&key_dir)?;
        Ok(true)
    }

    fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, RawStoreError> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("tmp_chunked_") {
                continue;
            }
            if prefix.map_or(true, |p| name.starts_with(p)) {
                out.push(name);
            }
        }
        Ok(out)
    }
}
