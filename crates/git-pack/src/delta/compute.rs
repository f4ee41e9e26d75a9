//! Compute deltas between objects.
//!
//! Implements a simplified version of git's diff-delta algorithm. The
//! algorithm indexes every overlapping `BLOCK_SIZE`-byte window of the
//! source under a rolling hash, computed incrementally rather than
//! rehashed from scratch as the window slides forward, then scans the
//! target for hash hits, verifies them bytewise, and extends each verified
//! hit into the longest copy it can. Matching regions become copy
//! instructions; non-matching regions become insert instructions.

use std::collections::HashMap;

use super::{encode_copy, encode_insert, write_varint};

/// Window size for the rolling hash (matches the teacher's block size).
const BLOCK_SIZE: usize = 16;

/// Multiplicative base for the rolling hash.
const HASH_BASE: u64 = 1_000_003;

/// Per-bucket cap on candidate offsets, so a source full of repeated
/// blocks (e.g. long runs of zeros) can't degrade matching into a linear
/// scan of every prior occurrence.
const MAX_BUCKET: usize = 64;

/// Compute a delta that transforms `source` into `target`.
///
/// Returns the raw delta byte stream that can be applied with `apply_delta`.
pub fn compute_delta(source: &[u8], target: &[u8]) -> Vec<u8> {
    let mut delta = Vec::new();

    // Write source and target sizes
    delta.extend_from_slice(&write_varint(source.len()));
    delta.extend_from_slice(&write_varint(target.len()));

    if target.is_empty() {
        return delta;
    }

    // Build index of source windows
    let index = build_block_index(source);
    let roller = RollingHash::new();

    let mut tpos = 0;
    let mut pending_insert: Vec<u8> = Vec::new();

    while tpos < target.len() {
        let remaining = target.len() - tpos;

        // Try to find a matching window in the source
        if remaining >= BLOCK_SIZE {
            let hash = roller.hash_at(target, tpos);
            if let Some(best) = best_match(&index, source, target, tpos, hash) {
                let (src_offset, match_len) = best;

                // Flush pending insert
                flush_insert(&mut delta, &mut pending_insert);

                // Emit copy instruction
                emit_copy(&mut delta, src_offset, match_len);
                tpos += match_len;
                continue;
            }
        }

        // No match, accumulate as insert
        pending_insert.push(target[tpos]);
        tpos += 1;

        // Flush inserts in chunks of 127 (max insert size)
        if pending_insert.len() == 127 {
            flush_insert(&mut delta, &mut pending_insert);
        }
    }

    // Flush remaining insert
    flush_insert(&mut delta, &mut pending_insert);

    delta
}

/// A hash hit only means the bucket is plausible; among the (possibly
/// several) candidate offsets it holds, verify the window bytewise and
/// keep whichever extends into the longest copy.
fn best_match(
    index: &HashMap<u64, Vec<usize>>,
    source: &[u8],
    target: &[u8],
    tpos: usize,
    hash: u64,
) -> Option<(usize, usize)> {
    let candidates = index.get(&hash)?;
    let mut best: Option<(usize, usize)> = None;
    for &src_offset in candidates {
        if source[src_offset..src_offset + BLOCK_SIZE] != target[tpos..tpos + BLOCK_SIZE] {
            continue; // hash collision, not an actual match
        }
        let match_len = extend_match(source, src_offset, target, tpos);
        if best.map_or(true, |(_, best_len)| match_len > best_len) {
            best = Some((src_offset, match_len));
        }
    }
    best
}

/// Rolling hash over a fixed-size window (Rabin–Karp style): updates in
/// O(1) as the window slides one byte forward instead of rehashing from
/// scratch.
struct RollingHash {
    /// `HASH_BASE^(BLOCK_SIZE - 1)`, the weight of the byte leaving the
    /// window on each roll.
    leading_weight: u64,
}

impl RollingHash {
    fn new() -> Self {
        let mut leading_weight = 1u64;
        for _ in 0..BLOCK_SIZE - 1 {
            leading_weight = leading_weight.wrapping_mul(HASH_BASE);
        }
        Self { leading_weight }
    }

    /// Hash of `data[offset..offset + BLOCK_SIZE]`, computed from scratch.
    fn hash_at(&self, data: &[u8], offset: usize) -> u64 {
        let mut h = 0u64;
        for &b in &data[offset..offset + BLOCK_SIZE] {
            h = h.wrapping_mul(HASH_BASE).wrapping_add(b as u64);
        }
        h
    }

    /// Slide the window forward by one byte: drop `old_byte`, append `new_byte`.
    fn roll(&self, prev_hash: u64, old_byte: u8, new_byte: u8) -> u64 {
        let h = prev_hash.wrapping_sub((old_byte as u64).wrapping_mul(self.leading_weight));
        h.wrapping_mul(HASH_BASE).wrapping_add(new_byte as u64)
    }
}

/// Build a rolling-hash index over every overlapping `BLOCK_SIZE`-byte
/// offset of `source` (§4.5: "every W-byte offset", not merely
/// non-overlapping aligned blocks), capping each bucket's candidate list.
fn build_block_index(source: &[u8]) -> HashMap<u64, Vec<usize>> {
    let mut index: HashMap<u64, Vec<usize>> = HashMap::new();
    if source.len() < BLOCK_SIZE {
        return index;
    }
    let roller = RollingHash::new();
    let mut hash = roller.hash_at(source, 0);
    insert_candidate(&mut index, hash, 0);
    for offset in 1..=source.len() - BLOCK_SIZE {
        hash = roller.roll(hash, source[offset - 1], source[offset + BLOCK_SIZE - 1]);
        insert_candidate(&mut index, hash, offset);
    }
    index
}

fn insert_candidate(index: &mut HashMap<u64, Vec<usize>>, hash: u64, offset: usize) {
    let bucket = index.entry(hash).or_default();
    if bucket.len() < MAX_BUCKET {
        bucket.push(offset);
    }
}

/// Extend a match between source[src_off..] and target[tgt_off..] as far as possible.
fn extend_match(source: &[u8], src_off: usize, target: &[u8], tgt_off: usize) -> usize {
    let max_len = std::cmp::min(source.len() - src_off, target.len() - tgt_off);
    let mut len = BLOCK_SIZE;
    while len < max_len && source[src_off + len] == target[tgt_off + len] {
        len += 1;
    }
    len
}

/// Flush pending insert bytes as one or more insert instructions.
fn flush_insert(delta: &mut Vec<u8>, pending: &mut Vec<u8>) {
    while !pending.is_empty() {
        let chunk_len = std::cmp::min(pending.len(), 127);
        let chunk: Vec<u8> = pending.drain(..chunk_len).collect();
        delta.extend_from_slice(&encode_insert(&chunk));
    }
}

/// Emit a copy instruction, splitting into multiple if needed (max copy size = 0xffffff).
fn emit_copy(delta: &mut Vec<u8>, offset: usize, mut size: usize) {
    let mut off = offset;
    while size > 0 {
        let chunk = std::cmp::min(size, 0x00ff_ffff); // max 24-bit size
        delta.extend_from_slice(&encode_copy(off as u64, chunk));
        off += chunk;
        size -= chunk;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::apply::apply_delta;

    #[test]
    fn identical_objects() {
        let data = b"Hello, World! This is a test of delta compression.";
        let delta = compute_delta(data, data);
        let result = apply_delta(data, &delta).unwrap();
        assert_eq!(result, data);
    }

    #[test]
    fn completely_different() {
        let source = b"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        let target = b"BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";
        let delta = compute_delta(source, target);
        let result = apply_delta(source, &delta).unwrap();
        assert_eq!(result, target);
    }

    #[test]
    fn empty_target() {
        let source = b"something";
        let target = b"";
        let delta = compute_delta(source, target);
        let result = apply_delta(source, &delta).unwrap();
        assert_eq!(result, target.as_slice());
    }

    #[test]
    fn empty_source() {
        let source = b"";
        let target = b"new content here";
        let delta = compute_delta(source, target);
        let result = apply_delta(source, &delta).unwrap();
        assert_eq!(result, target);
    }

    #[test]
    fn prepend_data() {
        // Source has a block that's reused in target, just with a prefix
        let source = b"0123456789abcdef0123456789abcdef"; // 32 bytes
        let mut target = b"PREPENDED_".to_vec();
        target.extend_from_slice(source);
        let delta = compute_delta(source, &target);
        let result = apply_delta(source, &delta).unwrap();
        assert_eq!(result, target);
    }

    #[test]
    fn append_data() {
        let source = b"0123456789abcdef0123456789abcdef"; // 32 bytes
        let mut target = source.to_vec();
        target.extend_from_slice(b"_APPENDED");
        let delta = compute_delta(source, &target);
        let result = apply_delta(source, &delta).unwrap();
        assert_eq!(result, target);
    }

    #[test]
    fn unaligned_overlapping_match_is_found() {
        // The reusable run starts at a source offset that isn't a multiple
        // of BLOCK_SIZE, so a non-overlapping aligned-block index would
        // never hash this exact window and would fall back to byte inserts.
        let mut source = vec![0u8; 5];
        source.extend_from_slice(b"this thirty-two byte run repeats");
        source.extend_from_slice(&[0u8; 5]);

        let mut target = b"PREFIX-".to_vec();
        target.extend_from_slice(b"this thirty-two byte run repeats");

        let delta = compute_delta(&source, &target);
        let result = apply_delta(&source, &delta).unwrap();
        assert_eq!(result, target);

        // A copy instruction (high bit set) must appear, otherwise the
        // reusable run was re-inserted byte by byte despite being present
        // in the source.
        assert!(delta.iter().any(|&b| b & 0x80 != 0));
    }

    #[test]
    fn large_similar_objects() {
        // Simulate two versions of a file with minor changes
        let source: Vec<u8> = (0..4096).map(|i| (i % 256) as u8).collect();
        let mut target = source.clone();
        // Change a few bytes in the middle
        target[2048] = 0xFF;
        target[2049] = 0xFE;
        target[2050] = 0xFD;

        let delta = compute_delta(&source, &target);
        let result = apply_delta(&source, &delta).unwrap();
        assert_eq!(result, target);

        // Delta should be smaller than the full target
        assert!(delta.len() < target.len());
    }
}
