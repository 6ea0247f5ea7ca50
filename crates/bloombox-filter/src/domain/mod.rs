//! Domain layer: pure filter logic, no I/O

pub mod hashing;
pub mod partitioned;
pub mod sizing;

pub use hashing::{DataPoint, HashGenerator};
pub use partitioned::PartitionedBloomFilter;
pub use sizing::FilterSizing;
