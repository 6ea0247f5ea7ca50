//! Domain layer: expression trees, leverage arithmetic, preparation stats

pub mod expression;
pub mod leverage;
pub mod stats;
