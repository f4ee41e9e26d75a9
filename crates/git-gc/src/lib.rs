//! Garbage collection: reachability trace, pack consolidation, ref
//! packing, and loose object pruning, driven by a single explicit state
//! machine so a crash mid-run leaves an inspectable trail rather than a
//! half-applied collection.
//!
//! A full run moves through five phases in order:
//!
//! 1. **Scanning** — trace every object reachable from the current ref set.
//! 2. **WritingPack** — consolidate reachable loose objects into one new pack.
//! 3. **UpdatingRefs** — pack loose refs into `packed-refs`.
//! 4. **Pruning** — delete loose objects that are unreachable and old enough;
//!    quarantine ones that fail to parse instead of deleting them.
//! 5. **Idle** — bookkeeping: refresh the object database's pack list.
//!
//! Only one collector runs against a given repository at a time; callers
//! are expected to hold an external lock (e.g. a [`git_utils::lockfile`])
//! for the duration of [`GarbageCollector::run`].

mod pack;
mod prune;
mod reachability;

pub use reachability::ReachabilityReport;

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

use git_hash::ObjectId;
use git_loose::LooseObjectStore;
use git_odb::ObjectDatabase;
use git_ref::files::FilesRefStore;
use git_ref::RefStore;
use git_utils::EngineConfig;

/// The collector's current phase. A failed run rolls back to `Idle` rather
/// than getting stuck mid-collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Idle,
    Scanning,
    WritingPack,
    UpdatingRefs,
    Pruning,
}

/// Errors produced by a collection run.
#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Loose(#[from] git_loose::LooseError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Pack(#[from] git_pack::PackError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Summary of what a collection run did.
#[derive(Debug, Default)]
pub struct GcReport {
    pub objects_scanned: usize,
    pub objects_missing: usize,
    pub objects_quarantined: usize,
    pub new_pack: Option<ObjectId>,
    pub refs_packed: usize,
    pub loose_objects_pruned: usize,
}

/// Drives a single repository's garbage collection.
pub struct GarbageCollector {
    odb: ObjectDatabase,
    refs: FilesRefStore,
    config: EngineConfig,
    phase: Mutex<GcPhase>,
    last_run: Mutex<Option<Instant>>,
}

impl GarbageCollector {
    pub fn new(odb: ObjectDatabase, refs: FilesRefStore, config: EngineConfig) -> Self {
        Self {
            odb,
            refs,
            config,
            phase: Mutex::new(GcPhase::Idle),
            last_run: Mutex::new(None),
        }
    }

    /// The phase the collector is currently in (or was last in, if idle).
    pub fn phase(&self) -> GcPhase {
        *self.phase.lock().unwrap()
    }

    fn set_phase(&self, phase: GcPhase) {
        *self.phase.lock().unwrap() = phase;
    }

    /// Whether an automatic full collection should run, based on loose
    /// object count and the minimum interval between runs.
    pub fn should_auto_gc(&self) -> Result<bool, GcError> {
        if let Some(last) = *self.last_run.lock().unwrap() {
            if last.elapsed() < self.config.gc_min_interval {
                return Ok(false);
            }
        }
        let loose_count = self.loose_oids()?.len();
        Ok(loose_count >= self.config.gc_loose_object_threshold)
    }

    /// Whether the bounded quick-pack path should run instead of a full GC.
    pub fn should_quick_pack(&self) -> Result<bool, GcError> {
        Ok(self.loose_oids()?.len() >= self.config.gc_quick_pack_threshold)
    }

    fn loose_oids(&self) -> Result<Vec<ObjectId>, GcError> {
        let loose = LooseObjectStore::open(self.odb.objects_dir(), self.odb.hash_algo());
        let mut oids = Vec::new();
        for oid in loose.iter()? {
            oids.push(oid?);
        }
        Ok(oids)
    }

    /// Collect every OID a ref currently points to (peeling symbolic refs),
    /// used as the trace's starting set.
    fn ref_roots(&self) -> Result<Vec<ObjectId>, GcError> {
        let mut roots = Vec::new();
        for entry in self.refs.iter(None)? {
            let reference = entry?;
            if let Ok(oid) = reference.peel_to_oid(&self.refs) {
                roots.push(oid);
            }
        }
        Ok(roots)
    }

    /// Run the full five-phase collection. On any error the phase is
    /// rolled back to `Idle` rather than left stuck mid-run.
    pub fn run(&self) -> Result<GcReport, GcError> {
        match self.run_inner() {
            Ok(report) => {
                self.set_phase(GcPhase::Idle);
                *self.last_run.lock().unwrap() = Some(Instant::now());
                Ok(report)
            }
            Err(e) => {
                self.set_phase(GcPhase::Idle);
                Err(e)
            }
        }
    }

    fn run_inner(&self) -> Result<GcReport, GcError> {
        let mut report = GcReport::default();

        // Phase 1: reachability trace.
        self.set_phase(GcPhase::Scanning);
        let roots = self.ref_roots()?;
        let trace = reachability::trace(&self.odb, &roots);
        report.objects_scanned = trace.reachable.len();
        report.objects_missing = trace.missing.len();

        let quarantine_dir = self.odb.objects_dir().join("corrupt");
        let loose = LooseObjectStore::open(self.odb.objects_dir(), self.odb.hash_algo());
        for oid in &trace.corrupt {
            if prune::quarantine(&loose, oid, &quarantine_dir).is_ok() {
                report.objects_quarantined += 1;
            }
        }

        // Phase 2: consolidate reachable loose objects into one new pack.
        self.set_phase(GcPhase::WritingPack);
        let reachable: Vec<ObjectId> = trace.reachable.iter().copied().collect();
        let pack_dir = self.odb.objects_dir().join("pack");
        let pack_name = format!("pack-gc-{}", pack_name_suffix(&reachable));
        let consolidated = pack::consolidate(&self.odb, &pack_dir, &reachable, &pack_name)?;
        let newly_packed: Vec<ObjectId> = consolidated
            .as_ref()
            .map(|(_, written)| written.clone())
            .unwrap_or_default();
        report.new_pack = consolidated.map(|(checksum, _)| checksum);

        // Phase 3: pack loose refs.
        self.set_phase(GcPhase::UpdatingRefs);
        report.refs_packed = self.pack_loose_refs()?;

        // Phase 4: prune loose objects. (a) objects now duplicated in the
        // new pack are deleted unconditionally; (b) objects that are
        // unreachable and old enough are deleted subject to the grace
        // period.
        self.set_phase(GcPhase::Pruning);
        let packed_pruned = prune::prune_packed_duplicates(&loose, &newly_packed)?;
        let loose_oids = self.loose_oids()?;
        let prune_report = prune::prune_unreachable(
            &loose,
            &loose_oids,
            &trace.reachable,
            self.config.gc_prune_age,
        )?;
        report.loose_objects_pruned = packed_pruned.len() + prune_report.pruned.len();

        // Phase 5: bookkeeping.
        self.odb.refresh()?;

        Ok(report)
    }

    /// A bounded alternative to [`Self::run`]: pack loose objects without
    /// a reachability trace or pruning pass. Used when the loose object
    /// count crosses [`EngineConfig::gc_quick_pack_threshold`] but is still
    /// below the full-GC threshold, so routine operation stays cheap.
    pub fn run_quick_pack(&self) -> Result<GcReport, GcError> {
        let result = (|| -> Result<GcReport, GcError> {
            self.set_phase(GcPhase::WritingPack);
            let mut report = GcReport::default();
            let oids = self.loose_oids()?;
            report.objects_scanned = oids.len();
            let pack_dir = self.odb.objects_dir().join("pack");
            let pack_name = format!("pack-quick-{}", pack_name_suffix(&oids));
            report.new_pack = pack::consolidate(&self.odb, &pack_dir, &oids, &pack_name)?
                .map(|(checksum, _)| checksum);
            self.odb.refresh()?;
            Ok(report)
        })();

        self.set_phase(GcPhase::Idle);
        result
    }

    fn pack_loose_refs(&self) -> Result<usize, GcError> {
        let mut names = Vec::new();
        for entry in self.refs.iter(None)? {
            let reference = entry?;
            if reference.is_direct() {
                names.push(reference.name().clone());
            }
        }
        let mut packed = 0;
        for name in names {
            self.refs.pack_ref(&name)?;
            packed += 1;
        }
        Ok(packed)
    }
}

/// A short, deterministic-enough suffix for a pack file name derived from
/// its membership, so repeated GC runs over the same object set are
/// idempotent about naming.
fn pack_name_suffix(oids: &[ObjectId]) -> String {
    let mut combined = HashSet::new();
    for oid in oids {
        combined.insert(*oid);
    }
    let mut sorted: Vec<_> = combined.into_iter().collect();
    sorted.sort();
    let mut hasher = git_hash::hasher::Hasher::new(git_hash::HashAlgorithm::Sha1);
    for oid in &sorted {
        hasher.update(oid.as_bytes());
    }
    hasher
        .finalize()
        .map(|oid| oid.to_hex()[..12].to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
