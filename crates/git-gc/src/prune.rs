//! Prune loose objects that are both unreachable and older than the grace
//! period, and quarantine loose objects that fail to parse instead of
//! silently deleting them.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use git_hash::ObjectId;
use git_loose::LooseObjectStore;

/// Outcome of a single prune pass.
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Loose objects removed because they were unreachable and old enough.
    pub pruned: Vec<ObjectId>,
    /// Loose objects moved aside because they failed to parse.
    pub quarantined: Vec<ObjectId>,
}

/// Delete loose objects in `candidates` that are not in `reachable` and
/// whose file is at least `min_age` old. `candidates` should be every OID
/// currently present in the loose store.
pub fn prune_unreachable(
    loose: &LooseObjectStore,
    candidates: &[ObjectId],
    reachable: &HashSet<ObjectId>,
    min_age: Duration,
) -> std::io::Result<PruneReport> {
    let mut report = PruneReport::default();
    let now = SystemTime::now();

    for oid in candidates {
        if reachable.contains(oid) {
            continue;
        }
        let path = loose.object_path(oid);
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .unwrap_or(Duration::MAX);
        if age < min_age {
            continue;
        }
        fs::remove_file(&path)?;
        report.pruned.push(*oid);
    }

    Ok(report)
}

/// Delete loose objects in `packed` unconditionally: each one has just
/// been written into a new pack, so the loose copy is a live duplicate,
/// not unreachable garbage, and doesn't need to wait out `min_age`.
pub fn prune_packed_duplicates(
    loose: &LooseObjectStore,
    packed: &[ObjectId],
) -> std::io::Result<Vec<ObjectId>> {
    let mut pruned = Vec::new();
    for oid in packed {
        let path = loose.object_path(oid);
        match fs::remove_file(&path) {
            Ok(()) => pruned.push(*oid),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(pruned)
}

/// Move a corrupt loose object aside into `quarantine_dir` rather than
/// deleting it, so an operator can inspect what went wrong.
pub fn quarantine(
    loose: &LooseObjectStore,
    oid: &ObjectId,
    quarantine_dir: &std::path::Path,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(quarantine_dir)?;
    let src = loose.object_path(oid);
    let dst = quarantine_dir.join(oid.to_hex());
    fs::rename(&src, &dst)?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_hash::HashAlgorithm;
    use git_object::{Blob, Object};

    #[test]
    fn prunes_only_unreachable_and_old_objects() {
        let dir = tempfile::tempdir().unwrap();
        let loose = LooseObjectStore::open(dir.path(), HashAlgorithm::Sha1);

        let keep = loose.write(&Object::Blob(Blob::new(b"keep".to_vec()))).unwrap();
        let drop_old = loose.write(&Object::Blob(Blob::new(b"drop".to_vec()))).unwrap();

        let mut reachable = HashSet::new();
        reachable.insert(keep);

        let report = prune_unreachable(
            &loose,
            &[keep, drop_old],
            &reachable,
            Duration::from_secs(0),
        )
        .unwrap();

        assert_eq!(report.pruned, vec![drop_old]);
        assert!(loose.object_path(&keep).is_file());
        assert!(!loose.object_path(&drop_old).is_file());
    }

    #[test]
    fn recently_written_unreachable_object_survives_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let loose = LooseObjectStore::open(dir.path(), HashAlgorithm::Sha1);
        let oid = loose.write(&Object::Blob(Blob::new(b"fresh".to_vec()))).unwrap();

        let report = prune_unreachable(
            &loose,
            &[oid],
            &HashSet::new(),
            Duration::from_secs(3600),
        )
        .unwrap();

        assert!(report.pruned.is_empty());
        assert!(loose.object_path(&oid).is_file());
    }

    #[test]
    fn prune_packed_duplicates_removes_named_objects_only() {
        let dir = tempfile::tempdir().unwrap();
        let loose = LooseObjectStore::open(dir.path(), HashAlgorithm::Sha1);

        let packed = loose.write(&Object::Blob(Blob::new(b"now-packed".to_vec()))).unwrap();
        let other = loose.write(&Object::Blob(Blob::new(b"still-loose".to_vec()))).unwrap();

        let pruned = prune_packed_duplicates(&loose, &[packed]).unwrap();

        assert_eq!(pruned, vec![packed]);
        assert!(!loose.object_path(&packed).is_file());
        assert!(loose.object_path(&other).is_file());
    }

    #[test]
    fn quarantine_moves_file_out_of_the_fanout_dir() {
        let dir = tempfile::tempdir().unwrap();
        let loose = LooseObjectStore::open(dir.path(), HashAlgorithm::Sha1);
        let oid = loose.write(&Object::Blob(Blob::new(b"bad".to_vec()))).unwrap();

        let quarantine_dir = dir.path().join("corrupt");
        let dst = quarantine(&loose, &oid, &quarantine_dir).unwrap();

        assert!(!loose.object_path(&oid).is_file());
        assert!(dst.is_file());
    }
}
