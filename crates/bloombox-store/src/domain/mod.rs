//! Domain layer: persisted header structs and the probability codec

pub mod header;
pub mod probability;
