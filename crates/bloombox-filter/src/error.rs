//! Error types for the filter layer

use thiserror::Error;

/// Errors that can occur while sizing or operating a filter
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid false positive rate: {epsilon} (must be strictly between 0 and 1)")]
    InvalidFpr { epsilon: f64 },

    #[error("element count must be positive")]
    InvalidElementCount,

    #[error("bit count must be positive")]
    InvalidBitCount,
}
