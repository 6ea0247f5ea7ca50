//! # bloombox-query
//!
//! Boolean counting queries over record stores, plus probabilistic
//! upscaling of the counted results to an external target population.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): expression trees with stable
//!   content-derived identities, preparation (leaf bit positions resolved
//!   once per distinct data point), leverage arithmetic, preparation stats
//! - **Service Layer** (`service/`): the `QueryExecutionEngine` driving a
//!   store scan through the dispatch port, and the `UpscalingEngine`
//!   propagating scale factors bottom-up through expression trees
//!
//! ## Query model
//!
//! A query owns one base expression and any number of labeled sub-clauses,
//! each implicitly ANDed with the base. Leaves test the same k bit positions
//! `might_contain` would test, so a match decision only ever reads the
//! record's filter vector, never the original attribute values.

pub mod domain;
pub mod error;
pub mod service;

// Re-exports for convenience
pub use domain::expression::{Expression, PreparationContext, PreparedExpression};
pub use domain::leverage::Leverage;
pub use domain::stats::PreparationStats;
pub use error::QueryError;
pub use service::engine::{
    BundleResult, EngineOptions, Query, QueryExecutionEngine, QueryResult,
};
pub use service::upscaler::{AttributeScale, ScaleOutcome, UpscaleConfig, UpscalingEngine};
