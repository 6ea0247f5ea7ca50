//! Ports layer: trait seams between stores, feeders and the query engine

pub mod store;

pub use store::{ProbabilityProvider, RecordStore, RowDelegate, ScoredRecordStore};
