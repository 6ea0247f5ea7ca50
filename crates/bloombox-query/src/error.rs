//! Error types for query preparation, execution and upscaling

use bloombox_store::StoreError;
use thiserror::Error;

/// Errors raised by the query and upscaling layer
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("duplicate query name: {name}")]
    DuplicateName { name: String },

    #[error("empty {combinator} expression")]
    EmptyCombinator { combinator: &'static str },

    #[error("bit position {position} outside record vector of {bits} bits")]
    PositionOutOfRange { position: usize, bits: usize },

    #[error("record vector width mismatch: store has {store_words} words, queries prepared for {prepared_words}")]
    GeometryMismatch {
        store_words: usize,
        prepared_words: usize,
    },

    #[error("scan already executed")]
    AlreadyExecuted,

    #[error("probabilistic evaluation requested but the store carries no probabilities")]
    NoProbabilities,

    #[error("preparation stats were not collected for this scan")]
    StatsNotCollected,

    #[error("missing preparation stats for expression {id:#018x}")]
    MissingStats { id: u64 },

    #[error("scale factor {factor} must be positive")]
    InvalidScaleFactor { factor: f64 },

    #[error("base scale factor {factor} must be at least 1.0")]
    BaseFactorTooSmall { factor: f64 },

    #[error("target population {target} smaller than sample size {sample}")]
    TargetTooSmall { target: u64, sample: u64 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
