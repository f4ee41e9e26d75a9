//! Consolidate reachable loose objects into a single new pack.

use std::path::Path;

use git_hash::ObjectId;
use git_object::Object;
use git_odb::ObjectDatabase;
use git_pack::write::create_pack;
use git_pack::PackError;

/// Write every object in `oids` that currently lives loose into a single
/// new pack under `pack_dir`. Objects already stored in an existing pack
/// are left alone — consolidating them is the job of a full repack, which
/// this routine does not attempt.
///
/// Returns `None` if there was nothing to pack, otherwise the pack's
/// checksum and the OIDs actually written into it — a loose copy of each
/// is now redundant and safe for the caller to prune.
pub fn consolidate(
    odb: &ObjectDatabase,
    pack_dir: &Path,
    oids: &[ObjectId],
    pack_name: &str,
) -> Result<Option<(ObjectId, Vec<ObjectId>)>, PackError> {
    let mut objects = Vec::new();
    let mut written = Vec::new();

    for oid in oids {
        let loose_path = loose_object_path(odb, oid);
        if !loose_path.is_file() {
            // Already packed, or missing — nothing to consolidate for it.
            continue;
        }
        if let Some(obj) = odb.read(oid).map_err(|e| PackError::Io(to_io_error(e)))? {
            objects.push((obj.object_type(), serialize_for_pack(&obj)));
            written.push(*oid);
        }
    }

    if objects.is_empty() {
        return Ok(None);
    }

    std::fs::create_dir_all(pack_dir).map_err(PackError::Io)?;
    let (_pack_path, _idx_path, checksum) = create_pack(pack_dir, pack_name, &objects)?;
    Ok(Some((checksum, written)))
}

fn serialize_for_pack(obj: &Object) -> Vec<u8> {
    obj.serialize_content()
}

fn loose_object_path(odb: &ObjectDatabase, oid: &ObjectId) -> std::path::PathBuf {
    let loose = git_loose::LooseObjectStore::open(odb.objects_dir(), odb.hash_algo());
    loose.object_path(oid)
}

fn to_io_error(e: git_odb::OdbError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_hash::HashAlgorithm;
    use git_object::Blob;

    #[test]
    fn consolidates_loose_objects_into_one_pack() {
        let dir = tempfile::tempdir().unwrap();
        let db = ObjectDatabase::open_with_algo(dir.path(), HashAlgorithm::Sha1).unwrap();

        let a = db.write(&Object::Blob(Blob::new(b"alpha".to_vec()))).unwrap();
        let b = db.write(&Object::Blob(Blob::new(b"beta".to_vec()))).unwrap();

        let pack_dir = dir.path().join("pack");
        let result = consolidate(&db, &pack_dir, &[a, b], "gc-test").unwrap();
        let (checksum, written) = result.unwrap();

        let pack_path = pack_dir.join(format!("pack-{}.pack", checksum.to_hex()));
        let pack = git_pack::pack::PackFile::open(&pack_path).unwrap();
        assert_eq!(pack.num_objects(), 2);
        assert_eq!(written.len(), 2);
        assert!(written.contains(&a));
        assert!(written.contains(&b));
    }

    #[test]
    fn nothing_to_pack_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let db = ObjectDatabase::open_with_algo(dir.path(), HashAlgorithm::Sha1).unwrap();
        let pack_dir = dir.path().join("pack");
        assert!(consolidate(&db, &pack_dir, &[], "empty").unwrap().is_none());
    }
}
