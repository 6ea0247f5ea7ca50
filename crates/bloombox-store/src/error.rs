//! Error types for the store layer

use thiserror::Error;

/// Errors that can occur while feeding, scanning or persisting a store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store is sealed or full ({rows} rows)")]
    Sealed { rows: u64 },

    #[error("store is still open for feeding")]
    FeedingInProgress,

    #[error("row index {row} out of range ({rows} rows available)")]
    RowOutOfRange { row: u64, rows: u64 },

    #[error("vector width mismatch: got {got} words, expected {expected}")]
    VectorWidthMismatch { got: usize, expected: usize },

    #[error("merge is not supported by store kind {kind}")]
    MergeUnsupported { kind: &'static str },

    #[error("truncated store data: expected {expected} bytes, got {got}")]
    Truncated { expected: u64, got: u64 },

    #[error("malformed header: {reason}")]
    MalformedHeader { reason: String },

    #[error("unsupported format version {major}.{minor} (reader supports major {supported})")]
    UnsupportedVersion { major: u32, minor: u32, supported: u32 },

    #[error("unknown store kind: {kind}")]
    UnknownStoreKind { kind: String },

    #[error("invalid probability block: {reason}")]
    InvalidProbabilityBlock { reason: String },

    #[error("probability {probability} for id {id} outside [0, 1]")]
    ProbabilityOutOfRange { id: u32, probability: f64 },
}
