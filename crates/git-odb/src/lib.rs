//! Unified object database for git.
//!
//! Provides a single interface to read and write objects across loose storage
//! and packfiles. This is the primary abstraction the ref store and GC use to
//! access objects without caring where they physically live.

pub mod backend;
mod search;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use git_hash::{HashAlgorithm, ObjectId};
use git_loose::LooseObjectStore;
use git_object::cache::ObjectCache;
use git_object::{Object, ObjectType, Tree};
use git_pack::pack::PackFile;
use git_pack::tree_delta::TreeDeltaStore;

pub use backend::OdbBackend;
pub use error::OdbError;

mod error {
    use git_hash::ObjectId;

    #[derive(Debug, thiserror::Error)]
    pub enum OdbError {
        #[error("object not found: {0}")]
        NotFound(ObjectId),

        #[error("ambiguous object name: {prefix} matches {count} objects")]
        Ambiguous { prefix: String, count: usize },

        #[error("corrupt object {oid}: {reason}")]
        Corrupt { oid: ObjectId, reason: String },

        #[error(transparent)]
        Loose(#[from] git_loose::LooseError),

        #[error(transparent)]
        Pack(#[from] git_pack::PackError),

        #[error(transparent)]
        Io(#[from] std::io::Error),
    }
}

/// Lightweight object info (header only, no content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub obj_type: ObjectType,
    pub size: usize,
}

/// Unified object database providing access across loose and packed storage.
pub struct ObjectDatabase {
    /// Loose object store.
    loose: LooseObjectStore,
    /// Pack files (protected by RwLock for refresh).
    packs: RwLock<Vec<PackFile>>,
    /// Object cache.
    cache: Mutex<ObjectCache>,
    /// Structural tree-delta store, consulted only when no loose/pack object
    /// satisfies a tree lookup directly (§4.6 precedence: binary pack-delta
    /// authoritative, tree-delta a same-key alternate path).
    tree_deltas: Mutex<TreeDeltaStore>,
    /// Path to the objects directory.
    objects_dir: PathBuf,
    /// Hash algorithm in use.
    hash_algo: HashAlgorithm,
    /// Delta-chain depth ceiling applied to both pack and tree deltas.
    delta_chain_depth_max: usize,
}

impl ObjectDatabase {
    /// Open the object database at the given objects directory.
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        Self::open_with_algo(objects_dir, HashAlgorithm::Sha1)
    }

    /// Open the object database with a specific hash algorithm.
    pub fn open_with_algo(
        objects_dir: impl AsRef<Path>,
        hash_algo: HashAlgorithm,
    ) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let loose = LooseObjectStore::open(&objects_dir, hash_algo);
        let packs = Self::discover_packs(&objects_dir)?;

        Ok(Self {
            loose,
            packs: RwLock::new(packs),
            cache: Mutex::new(ObjectCache::new(1024)),
            tree_deltas: Mutex::new(TreeDeltaStore::new()),
            objects_dir,
            hash_algo,
            delta_chain_depth_max: 50,
        })
    }

    /// Override the delta-chain depth ceiling (default 50, per SPEC_FULL §9).
    pub fn set_delta_chain_depth_max(&mut self, depth: usize) {
        self.delta_chain_depth_max = depth;
    }

    /// Read an object by OID (searches loose, then packs).
    pub fn read(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        search::find_object(self, oid)
    }

    /// Read an object with caching.
    pub fn read_cached(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        // Check cache first
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(obj) = cache.get(oid) {
                return Ok(Some(obj.clone()));
            }
        }

        // Read from storage
        let obj = self.read(oid)?;

        // Insert into cache
        if let Some(ref obj) = obj {
            let mut cache = self.cache.lock().unwrap();
            cache.insert(*oid, obj.clone());
        }

        Ok(obj)
    }

    /// Read just the header (type + size) without full content.
    pub fn read_header(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        search::find_header(self, oid)
    }

    /// Check if an object exists (fast, no decompression for packed objects).
    pub fn contains(&self, oid: &ObjectId) -> bool {
        search::object_exists(self, oid)
    }

    /// Resolve a tree, falling back to the structural tree-delta store if no
    /// loose or packed object directly satisfies the lookup.
    pub fn read_tree(&self, oid: &ObjectId) -> Result<Option<Tree>, OdbError> {
        if let Some(obj) = self.read(oid)? {
            return match obj {
                Object::Tree(t) => Ok(Some(t)),
                other => Err(OdbError::Corrupt {
                    oid: *oid,
                    reason: format!("expected tree, found {}", other.object_type()),
                }),
            };
        }

        let deltas = self.tree_deltas.lock().unwrap();
        if !deltas.is_tree_delta(oid) {
            return Ok(None);
        }
        let chain = deltas
            .get_tree_delta_chain(oid, self.delta_chain_depth_max)
            .map_err(|e| OdbError::Corrupt {
                oid: *oid,
                reason: e.to_string(),
            })?;
        let Some(last) = chain.last() else {
            return Ok(None);
        };
        let root_id = last.base_tree;
        let root = match self.read(&root_id)? {
            Some(Object::Tree(t)) => t,
            Some(_) | None => {
                return Err(OdbError::Corrupt {
                    oid: root_id,
                    reason: "tree-delta root is not a tree".into(),
                })
            }
        };
        let resolved = deltas
            .load_tree_entries(oid, &root, self.delta_chain_depth_max)
            .map_err(|e| OdbError::Corrupt {
                oid: *oid,
                reason: e.to_string(),
            })?;
        Ok(Some(resolved))
    }

    /// Record `target` as a structural delta against `base` rather than
    /// writing it out as a full object.
    pub fn deltify_tree(&self, target_id: ObjectId, base_id: ObjectId, base: &Tree, target: &Tree) {
        self.tree_deltas
            .lock()
            .unwrap()
            .deltify_tree(target_id, base_id, base, target);
    }

    /// Write a new object (always to loose store).
    pub fn write(&self, obj: &Object) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write(obj)?)
    }

    /// Write raw content with type (always to loose store).
    pub fn write_raw(
        &self,
        obj_type: ObjectType,
        content: &[u8],
    ) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write_raw(obj_type, content)?)
    }

    /// Refresh the list of pack files (call after gc/repack).
    pub fn refresh(&self) -> Result<(), OdbError> {
        let new_packs = Self::discover_packs(&self.objects_dir)?;
        let mut packs = self.packs.write().unwrap();
        *packs = new_packs;
        Ok(())
    }

    /// Iterate over all known object OIDs (for fsck/gc).
    pub fn iter_all_oids(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectId, OdbError>> + '_>, OdbError> {
        let loose_iter = self.loose.iter()?.map(|r| r.map_err(OdbError::from));

        let packs = self.packs.read().unwrap();
        let mut pack_oids: Vec<Result<ObjectId, OdbError>> = Vec::new();
        for pack in packs.iter() {
            for (oid, _offset) in pack.index().iter() {
                pack_oids.push(Ok(oid));
            }
        }

        Ok(Box::new(loose_iter.chain(pack_oids)))
    }

    /// Get the path to the objects directory.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Get the hash algorithm in use.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    /// Discover pack files in the objects/pack directory.
    fn discover_packs(objects_dir: &Path) -> Result<Vec<PackFile>, OdbError> {
        let pack_dir = objects_dir.join("pack");
        if !pack_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut packs = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(&pack_dir)?
            .filter_map(|e| e.ok())
            .collect();

        // Sort by modification time (newest first) to match C git behavior
        entries.sort_by(|a, b| {
            let a_time = a.metadata().and_then(|m| m.modified()).ok();
            let b_time = b.metadata().and_then(|m| m.modified()).ok();
            b_time.cmp(&a_time)
        });

        for entry in entries {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pack") {
                match PackFile::open(&path) {
                    Ok(pack) => packs.push(pack),
                    Err(_) => {
                        // Skip corrupt packs (fall back to other sources)
                        continue;
                    }
                }
            }
        }

        Ok(packs)
    }
}
