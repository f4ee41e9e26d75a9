//! Reachability trace: walk every object reachable from the ref set.
//!
//! Mirrors the stack-based visited-set walk used elsewhere to enumerate
//! objects reachable from a set of starting points — commits pull in their
//! tree and parents, trees pull in their entries, tags pull in their
//! target. A read that comes back corrupt is recorded rather than
//! propagated, so a single damaged object does not abort the whole trace.

use std::collections::HashSet;

use git_hash::ObjectId;
use git_object::Object;
use git_odb::ObjectDatabase;

/// Result of a reachability trace.
#[derive(Debug, Default)]
pub struct ReachabilityReport {
    /// Every object reachable from the starting set.
    pub reachable: HashSet<ObjectId>,
    /// Objects that were referenced but could not be read at all.
    pub missing: Vec<ObjectId>,
    /// Objects that exist but failed to parse.
    pub corrupt: Vec<ObjectId>,
}

/// Trace reachability from `roots`, reading through `odb`.
pub fn trace(odb: &ObjectDatabase, roots: &[ObjectId]) -> ReachabilityReport {
    let mut report = ReachabilityReport::default();
    let mut stack: Vec<ObjectId> = roots.to_vec();

    while let Some(oid) = stack.pop() {
        if !report.reachable.insert(oid) {
            continue;
        }

        let obj = match odb.read(&oid) {
            Ok(Some(obj)) => obj,
            Ok(None) => {
                report.missing.push(oid);
                report.reachable.remove(&oid);
                continue;
            }
            Err(_) => {
                report.corrupt.push(oid);
                report.reachable.remove(&oid);
                continue;
            }
        };

        match obj {
            Object::Commit(commit) => {
                stack.push(commit.tree);
                stack.extend(commit.parents.iter().copied());
            }
            Object::Tree(tree) => {
                stack.extend(tree.entries.iter().map(|entry| entry.oid));
            }
            Object::Tag(tag) => {
                stack.push(tag.target);
            }
            Object::Blob(_) => {}
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_hash::HashAlgorithm;
    use git_object::{Blob, Commit, FileMode, Tree, TreeEntry};
    use git_utils::date::{GitDate, Signature};

    fn odb(dir: &std::path::Path) -> ObjectDatabase {
        ObjectDatabase::open_with_algo(dir, HashAlgorithm::Sha1).unwrap()
    }

    fn sig() -> Signature {
        Signature {
            name: "tester".into(),
            email: "tester@example.com".into(),
            date: GitDate::new(0, 0),
        }
    }

    fn commit(tree: ObjectId, parents: Vec<ObjectId>, message: &str) -> Commit {
        Commit {
            tree,
            parents,
            author: sig(),
            committer: sig(),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    #[test]
    fn walks_commit_tree_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let db = odb(dir.path());

        let blob_oid = db.write(&Object::Blob(Blob::new(b"hello".to_vec()))).unwrap();
        let tree = Tree {
            entries: vec![TreeEntry {
                mode: FileMode::Regular,
                name: "hello.txt".into(),
                oid: blob_oid,
            }],
        };
        let tree_oid = db.write(&Object::Tree(tree)).unwrap();

        let root_oid = db
            .write(&Object::Commit(commit(tree_oid, vec![], "root")))
            .unwrap();
        let child_oid = db
            .write(&Object::Commit(commit(tree_oid, vec![root_oid], "child")))
            .unwrap();

        let report = trace(&db, &[child_oid]);
        assert!(report.reachable.contains(&child_oid));
        assert!(report.reachable.contains(&root_oid));
        assert!(report.reachable.contains(&tree_oid));
        assert!(report.reachable.contains(&blob_oid));
        assert!(report.missing.is_empty());
        assert!(report.corrupt.is_empty());
    }

    #[test]
    fn missing_object_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let db = odb(dir.path());
        let bogus = ObjectId::from_hex("0000000000000000000000000000000000000a").unwrap();
        let report = trace(&db, &[bogus]);
        assert!(report.reachable.is_empty());
        assert_eq!(report.missing, vec![bogus]);
    }
}
