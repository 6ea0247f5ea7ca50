//! Optimized hash-partitioned Bloom filter (OHBF)
//!
//! A single bit-vector is split into k equal partitions and the k bit
//! positions of an element are sliced out of ONE digest instead of running k
//! digests. Slice i addresses only partition i, so the positions can never
//! collide into the same region.

use bitvec::prelude::*;

use crate::domain::hashing::HashGenerator;
use crate::domain::sizing::FilterSizing;

/// Partitioned Bloom filter over 64-bit words
///
/// `clear()` keeps the allocation, so one instance can be reused as a
/// per-worker scratch filter across millions of rows.
#[derive(Clone, Debug)]
pub struct PartitionedBloomFilter {
    sizing: FilterSizing,
    hasher: HashGenerator,
    bits: BitVec<u64, Lsb0>,
    bits_set: u64,
}

impl PartitionedBloomFilter {
    pub fn new(sizing: FilterSizing, hasher: HashGenerator) -> Self {
        let len = sizing.effective_bits() as usize;
        Self {
            sizing,
            hasher,
            bits: bitvec![u64, Lsb0; 0; len],
            bits_set: 0,
        }
    }

    pub fn sizing(&self) -> &FilterSizing {
        &self.sizing
    }

    /// The k absolute bit positions of an element, one per partition.
    pub fn positions(&self, parts: &[&[u8]]) -> Vec<usize> {
        derive_positions(&self.sizing, &self.hasher, parts)
    }

    /// Set the element's k bits. Returns true iff at least one bit
    /// transitioned from 0 to 1.
    pub fn put(&mut self, parts: &[&[u8]]) -> bool {
        let mut changed = false;
        for pos in self.positions(parts) {
            if !self.bits[pos] {
                self.bits.set(pos, true);
                self.bits_set += 1;
                changed = true;
            }
        }
        changed
    }

    /// Membership test: true only if ALL k bits are set.
    ///
    /// Never a false negative; false positives bounded by the configured ε
    /// at the configured fill level.
    pub fn might_contain(&self, parts: &[&[u8]]) -> bool {
        self.positions(parts).into_iter().all(|pos| self.bits[pos])
    }

    /// Reset to empty without releasing the allocation.
    pub fn clear(&mut self) {
        self.bits.fill(false);
        self.bits_set = 0;
    }

    /// Number of bits currently set.
    pub fn bits_in_use(&self) -> u64 {
        self.bits_set
    }

    /// Invert the fill-ratio formula to estimate how many distinct elements
    /// were put. Returns -1 when the vector is saturated (no solution).
    pub fn estimated_cardinality(&self) -> i64 {
        let m = self.sizing.effective_bits();
        if self.bits_set >= m {
            return -1;
        }
        let fill = self.bits_set as f64 / m as f64;
        let estimate = -(m as f64 / self.sizing.k() as f64) * (1.0 - fill).ln();
        estimate.round() as i64
    }

    /// Raw vector export: the backing 64-bit words.
    pub fn as_words(&self) -> &[u64] {
        self.bits.as_raw_slice()
    }
}

/// Derive the k partition-disjoint bit positions for an element.
///
/// One digest of `k * ceil(log2(partition_size))` bits is sliced into k equal
/// MSB-first bit groups; group i modulo `partition_size` addresses partition i.
pub fn derive_positions(
    sizing: &FilterSizing,
    hasher: &HashGenerator,
    parts: &[&[u8]],
) -> Vec<usize> {
    let partition_size = sizing.partition_size();
    let k = sizing.k();
    let slice_bits = slice_bits(partition_size);
    let digest = hasher.digest(parts, k * slice_bits);

    (0..k)
        .map(|i| {
            let slice = read_bits(&digest, (i * slice_bits) as usize, slice_bits);
            (i as u64 * partition_size + slice % partition_size) as usize
        })
        .collect()
}

/// Test an element's precomputed positions against a raw record vector.
///
/// This is exactly the `might_contain` bit test, exposed for callers that
/// resolved positions once and scan many vectors.
pub fn test_bits(words: &[u64], positions: &[usize]) -> bool {
    positions
        .iter()
        .all(|&pos| words[pos / 64] & (1u64 << (pos % 64)) != 0)
}

/// Bits needed to cover values in [0, partition_size): ceil(log2(size)).
fn slice_bits(partition_size: u64) -> u32 {
    if partition_size <= 2 {
        1
    } else {
        64 - (partition_size - 1).leading_zeros()
    }
}

/// Read `nbits` (<= 64) starting at `offset` from an MSB-first bit stream.
fn read_bits(bytes: &[u8], offset: usize, nbits: u32) -> u64 {
    let mut acc = 0u64;
    for i in 0..nbits as usize {
        let index = offset + i;
        let bit = (bytes[index / 8] >> (7 - index % 8)) & 1;
        acc = (acc << 1) | bit as u64;
    }
    acc
}
