//! # bloombox-store
//!
//! Record stores for the bloombox engine: fixed-capacity arrays of
//! fixed-width Bloom-filter vectors, fed once and scanned many times.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): BBX header structs and the fixed-point /
//!   Deflate probability codec
//! - **Ports Layer** (`ports/`): `RecordStore`, `RowDelegate` and
//!   `ProbabilityProvider` traits
//! - **Adapters Layer** (`adapters/`): in-memory, file-backed and
//!   probabilistic store realizations plus the closed restore registry
//! - **Service Layer** (`service/`): the `Feeder`, which turns (column,
//!   value) pairs into one filter vector per record under the feed lock
//!
//! ## BBX persisted format
//!
//! Four newline-delimited sections: one-line JSON bundle header, store-kind
//! tag, one-line JSON store header, then raw big-endian 64-bit row words
//! followed by kind-specific trailing sections. Truncated files are never
//! silently tolerated.

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

// Re-exports for convenience
pub use adapters::file::FileStore;
pub use adapters::memory::MemoryStore;
pub use adapters::probabilistic::ProbabilityStore;
pub use adapters::registry::{persist, restore};
pub use domain::header::{BundleHeader, StoreHeader, FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR};
pub use domain::probability::ProbabilityBlock;
pub use error::StoreError;
pub use ports::store::{ProbabilityProvider, RecordStore, RowDelegate, ScoredRecordStore};
pub use service::feeder::Feeder;
