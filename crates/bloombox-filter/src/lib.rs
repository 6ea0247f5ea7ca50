//! # bloombox-filter
//!
//! Optimized hash-partitioned Bloom filter (OHBF) and its supporting pieces.
//!
//! This crate is the innermost layer of the bloombox engine:
//!
//! - **Domain Layer** (`domain/`): Pure logic, no I/O
//!   - `FilterSizing`: Analytical derivation of (m, n, k, ε) from any two
//!   - `HashGenerator`: Arbitrary-width digests chained from SHA-1/256/512
//!   - `PartitionedBloomFilter`: One bit-vector split into k disjoint
//!     partitions, k bit positions sliced from a single digest
//!
//! ## Invariants
//!
//! - No false negatives: once `put` returns, `might_contain` holds forever.
//! - The k positions of any single call fall into k disjoint partitions of
//!   width `partition_size`.
//! - `effective_bits = partition_size * k >= m`; the excess is bounded waste.
//!
//! ## Usage Example
//!
//! ```ignore
//! use bloombox_filter::{FilterSizing, HashGenerator, PartitionedBloomFilter};
//!
//! let sizing = FilterSizing::from_elements_and_fpr(10_000, 0.01)?;
//! let mut filter = PartitionedBloomFilter::new(sizing, HashGenerator::new());
//! filter.put(&[b"color", b"red"]);
//! assert!(filter.might_contain(&[b"color", b"red"]));
//! ```

pub mod domain;
pub mod error;

// Re-exports for convenience
pub use domain::hashing::{DataPoint, HashGenerator};
pub use domain::partitioned::{derive_positions, test_bits, PartitionedBloomFilter};
pub use domain::sizing::FilterSizing;
pub use error::FilterError;
