//! Ambient engine configuration: thresholds and defaults shared by the
//! pack, ref, and GC layers.
//!
//! Unlike C git these are not read from a `.git/config` INI file — the
//! storage engine has no concept of a working tree or config file format —
//! but the same tunables exist and get the same defaults.

use std::time::Duration;

/// Configuration knobs for the storage engine. Construct with
/// [`EngineConfig::default`] and override individual fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum delta chain depth when building a pack (spec default: 50).
    pub delta_chain_depth_max: usize,
    /// Number of candidate objects considered as a delta base (spec default: 10).
    pub delta_window_size: usize,
    /// Number of loose objects accumulated before an automatic pack flush.
    pub pack_flush_threshold: usize,
    /// Loose object count at which auto-gc's full pack phase triggers.
    pub gc_loose_object_threshold: usize,
    /// Loose object count at which auto-gc's bounded quick-pack triggers.
    pub gc_quick_pack_threshold: usize,
    /// Minimum time between automatic GC runs.
    pub gc_min_interval: Duration,
    /// Minimum age of a loose object before it is eligible for pruning.
    pub gc_prune_age: Duration,
    /// Soft cap on bytes held by the in-process object cache.
    pub object_cache_bytes: usize,
    /// Name used for the first branch of a new repository.
    pub default_branch: String,
    /// Maximum number of symbolic-ref hops followed before giving up.
    pub ref_resolve_depth_max: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delta_chain_depth_max: 50,
            delta_window_size: 10,
            pack_flush_threshold: 6700,
            gc_loose_object_threshold: 100,
            gc_quick_pack_threshold: 5,
            gc_min_interval: Duration::from_secs(60),
            gc_prune_age: Duration::from_secs(14 * 24 * 60 * 60),
            object_cache_bytes: 32 * 1024 * 1024,
            default_branch: "main".to_string(),
            ref_resolve_depth_max: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.delta_chain_depth_max, 50);
        assert_eq!(cfg.delta_window_size, 10);
        assert_eq!(cfg.gc_loose_object_threshold, 100);
        assert_eq!(cfg.gc_quick_pack_threshold, 5);
        assert_eq!(cfg.gc_min_interval, Duration::from_secs(60));
        assert_eq!(cfg.default_branch, "main");
        assert_eq!(cfg.ref_resolve_depth_max, 5);
    }

    #[test]
    fn overriding_one_field_keeps_other_defaults() {
        let cfg = EngineConfig {
            delta_chain_depth_max: 12,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.delta_chain_depth_max, 12);
        assert_eq!(cfg.delta_window_size, 10);
    }
}
